//! Rectangular sample windows exchanged between the reconstruction stages.
//!
//! A block addresses its samples through `offset` and `scanw` so that a stage can hand out a
//! window into a larger backing buffer. Blocks returned by the "copy" operations are dense
//! (`offset == 0`, `scanw == w`) and owned by the caller; blocks returned by the "intern"
//! operations are borrowed from the stage and are only valid until the next call.

/// Numeric representation of the samples in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Two's-complement (or sign-magnitude, before dequantization) 32-bit integers.
    Int,
    /// 32-bit floating point.
    Float,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBlock<T> {
    /// Horizontal position of the upper-left sample, relative to the owner's origin.
    pub ulx: usize,
    /// Vertical position of the upper-left sample.
    pub uly: usize,
    /// Width of the window.
    pub w: usize,
    /// Height of the window.
    pub h: usize,
    /// Index of the upper-left sample in `data`.
    pub offset: usize,
    /// Distance in `data` between two vertically adjacent samples.
    pub scanw: usize,
    /// More refinement may arrive later for this exact block.
    pub progressive: bool,
    pub data: Vec<T>,
}

impl<T: Copy + Default> DataBlock<T> {
    /// Creates a dense, zero-filled block.
    pub fn new(ulx: usize, uly: usize, w: usize, h: usize) -> Self {
        Self {
            ulx,
            uly,
            w,
            h,
            offset: 0,
            scanw: w,
            progressive: false,
            data: vec![T::default(); w * h],
        }
    }

    /// Creates a dense block over existing row-major samples.
    pub fn from_vec(ulx: usize, uly: usize, w: usize, h: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != w * h {
            return None;
        }
        Some(Self {
            ulx,
            uly,
            w,
            h,
            offset: 0,
            scanw: w,
            progressive: false,
            data,
        })
    }

    /// Turns a (possibly reused) block into a dense zero-filled `w` x `h` window.
    ///
    /// The backing vector is resized in place, so its allocation survives between calls.
    pub fn reshape(&mut self, ulx: usize, uly: usize, w: usize, h: usize) {
        self.ulx = ulx;
        self.uly = uly;
        self.w = w;
        self.h = h;
        self.offset = 0;
        self.scanw = w;
        self.progressive = false;
        self.data.clear();
        self.data.resize(w * h, T::default());
    }

    /// Same as [`DataBlock::reshape`] on a caller-supplied block, or a fresh one.
    pub fn reuse_or_new(reuse: Option<Self>, ulx: usize, uly: usize, w: usize, h: usize) -> Self {
        match reuse {
            Some(mut blk) => {
                blk.reshape(ulx, uly, w, h);
                blk
            }
            None => Self::new(ulx, uly, w, h),
        }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        self.offset + y * self.scanw + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Row `y` of the window.
    pub fn row(&self, y: usize) -> &[T] {
        let start = self.index(0, y);
        &self.data[start..start + self.w]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = self.index(0, y);
        let w = self.w;
        &mut self.data[start..start + w]
    }

    /// Copies the window into `dest` as a dense block, reusing `dest`'s allocation.
    pub fn copy_dense_into(&self, dest: &mut Self) {
        dest.reshape(self.ulx, self.uly, self.w, self.h);
        dest.progressive = self.progressive;
        for y in 0..self.h {
            let w = self.w;
            dest.data[y * w..(y + 1) * w].copy_from_slice(self.row(y));
        }
    }

    /// Caller-owned dense copy of the window.
    pub fn to_dense(&self) -> Self {
        let mut out = Self::default();
        self.copy_dense_into(&mut out);
        out
    }

    /// Iterates the window samples in raster order.
    pub fn samples(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.h).flat_map(move |y| self.row(y).iter().copied())
    }
}

/// A block in either numeric representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBlock {
    Int(DataBlock<i32>),
    Float(DataBlock<f32>),
}

impl Default for SampleBlock {
    fn default() -> Self {
        SampleBlock::Int(DataBlock::default())
    }
}

impl SampleBlock {
    pub fn kind(&self) -> DataKind {
        match self {
            SampleBlock::Int(_) => DataKind::Int,
            SampleBlock::Float(_) => DataKind::Float,
        }
    }

    /// Dense zero-filled block of the given kind, reusing `reuse` when it has that kind.
    pub fn reuse_or_new(
        kind: DataKind,
        reuse: Option<SampleBlock>,
        ulx: usize,
        uly: usize,
        w: usize,
        h: usize,
    ) -> Self {
        match (kind, reuse) {
            (DataKind::Int, Some(SampleBlock::Int(blk))) => {
                SampleBlock::Int(DataBlock::reuse_or_new(Some(blk), ulx, uly, w, h))
            }
            (DataKind::Float, Some(SampleBlock::Float(blk))) => {
                SampleBlock::Float(DataBlock::reuse_or_new(Some(blk), ulx, uly, w, h))
            }
            (DataKind::Int, _) => SampleBlock::Int(DataBlock::new(ulx, uly, w, h)),
            (DataKind::Float, _) => SampleBlock::Float(DataBlock::new(ulx, uly, w, h)),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            SampleBlock::Int(b) => b.w,
            SampleBlock::Float(b) => b.w,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            SampleBlock::Int(b) => b.h,
            SampleBlock::Float(b) => b.h,
        }
    }

    pub fn progressive(&self) -> bool {
        match self {
            SampleBlock::Int(b) => b.progressive,
            SampleBlock::Float(b) => b.progressive,
        }
    }

    pub fn as_int(&self) -> Option<&DataBlock<i32>> {
        match self {
            SampleBlock::Int(b) => Some(b),
            SampleBlock::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<&DataBlock<f32>> {
        match self {
            SampleBlock::Float(b) => Some(b),
            SampleBlock::Int(_) => None,
        }
    }

    pub fn into_int(self) -> Option<DataBlock<i32>> {
        match self {
            SampleBlock::Int(b) => Some(b),
            SampleBlock::Float(_) => None,
        }
    }

    pub fn into_float(self) -> Option<DataBlock<f32>> {
        match self {
            SampleBlock::Float(b) => Some(b),
            SampleBlock::Int(_) => None,
        }
    }

    /// Caller-owned dense copy, reusing `reuse`'s allocation when the kinds agree.
    pub fn copy_dense(&self, reuse: Option<SampleBlock>) -> SampleBlock {
        match (self, reuse) {
            (SampleBlock::Int(src), Some(SampleBlock::Int(mut dst))) => {
                src.copy_dense_into(&mut dst);
                SampleBlock::Int(dst)
            }
            (SampleBlock::Float(src), Some(SampleBlock::Float(mut dst))) => {
                src.copy_dense_into(&mut dst);
                SampleBlock::Float(dst)
            }
            (SampleBlock::Int(src), _) => SampleBlock::Int(src.to_dense()),
            (SampleBlock::Float(src), _) => SampleBlock::Float(src.to_dense()),
        }
    }
}

/// Rounds to the nearest integer, halves going up.
#[inline]
pub fn round_to_int(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

/// Converts a block to `kind`, rounding floats half up.
pub fn convert_block(block: &SampleBlock, kind: DataKind) -> SampleBlock {
    match (block, kind) {
        (SampleBlock::Int(b), DataKind::Float) => {
            let data = b.samples().map(|v| v as f32).collect();
            let mut out = DataBlock::from_vec(b.ulx, b.uly, b.w, b.h, data).unwrap_or_default();
            out.progressive = b.progressive;
            SampleBlock::Float(out)
        }
        (SampleBlock::Float(b), DataKind::Int) => {
            let data = b.samples().map(round_to_int).collect();
            let mut out = DataBlock::from_vec(b.ulx, b.uly, b.w, b.h, data).unwrap_or_default();
            out.progressive = b.progressive;
            SampleBlock::Int(out)
        }
        (other, _) => other.copy_dense(None),
    }
}
