//! Colour space mapping applied after the component transforms.
//!
//! sYCC chroma planes coded at half the luma resolution are brought to the luma grid by sample
//! replication before the matrix is applied.

use log::debug;

use crate::constants::{SYCC_MATRIX, TRANSFORM_COMPONENT_COUNT};
use crate::error::ReconError;
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock, convert_block};
use crate::jpeg2000::source::{ImageSource, TiledSource};
use crate::jpeg2000::specs::DecoderSpecs;
use crate::jpeg2000::tiling::{ImageGeometry, Rect, TileContext};

/// Mapping selected by the colour specification of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMapping {
    #[default]
    None,
    /// sYCC to sRGB with the fixed matrix.
    SYcc,
}

#[inline]
fn sycc_to_rgb(y: f32, cb: f32, cr: f32) -> [f32; 3] {
    SYCC_MATRIX.map(|row| row[0] * y + row[1] * cb + row[2] * cr)
}

fn map_int(planes: [SampleBlock; 3]) -> Result<[SampleBlock; 3], ReconError> {
    let [y, cb, cr] = planes.map(SampleBlock::into_int);
    let (Some(y), Some(cb), Some(cr)) = (y, cb, cr) else {
        return Err(ReconError::DataKindMismatch {
            requested: DataKind::Int,
            actual: DataKind::Float,
        });
    };
    check_sizes(y.w, y.h, [(cb.w, cb.h), (cr.w, cr.h)])?;
    let mut out: [DataBlock<i32>; 3] = std::array::from_fn(|_| DataBlock::new(y.ulx, y.uly, y.w, y.h));
    for row in 0..y.h {
        for (x, ((&l, &b), &r)) in y.row(row).iter().zip(cb.row(row)).zip(cr.row(row)).enumerate() {
            let rgb = sycc_to_rgb(l as f32, b as f32, r as f32);
            for (plane, v) in out.iter_mut().zip(rgb) {
                plane.set(x, row, v as i32);
            }
        }
    }
    let progressive = y.progressive || cb.progressive || cr.progressive;
    Ok(out.map(|mut blk| {
        blk.progressive = progressive;
        SampleBlock::Int(blk)
    }))
}

fn map_float(planes: [SampleBlock; 3]) -> Result<[SampleBlock; 3], ReconError> {
    let [y, cb, cr] = planes.map(SampleBlock::into_float);
    let (Some(y), Some(cb), Some(cr)) = (y, cb, cr) else {
        return Err(ReconError::DataKindMismatch {
            requested: DataKind::Float,
            actual: DataKind::Int,
        });
    };
    check_sizes(y.w, y.h, [(cb.w, cb.h), (cr.w, cr.h)])?;
    let mut out: [DataBlock<f32>; 3] = std::array::from_fn(|_| DataBlock::new(y.ulx, y.uly, y.w, y.h));
    for row in 0..y.h {
        for (x, ((&l, &b), &r)) in y.row(row).iter().zip(cb.row(row)).zip(cr.row(row)).enumerate() {
            let rgb = sycc_to_rgb(l, b, r);
            for (plane, v) in out.iter_mut().zip(rgb) {
                plane.set(x, row, v);
            }
        }
    }
    let progressive = y.progressive || cb.progressive || cr.progressive;
    Ok(out.map(|mut blk| {
        blk.progressive = progressive;
        SampleBlock::Float(blk)
    }))
}

/// Replicates the samples of `src`, laid out over `from`, onto `to`, a grid `fx` x `fy` times
/// denser. Positions of `to` outside the projection of `from` take the nearest edge sample.
fn upsample<T: Copy + Default>(src: &DataBlock<T>, from: Rect, to: Rect, fx: u32, fy: u32) -> DataBlock<T> {
    let mut out = DataBlock::new(
        to.x0 as usize,
        to.y0 as usize,
        to.width() as usize,
        to.height() as usize,
    );
    out.progressive = src.progressive;
    if from.is_empty() || src.w == 0 || src.h == 0 {
        return out;
    }
    for (row, y) in (to.y0..to.y1).enumerate() {
        let sy = ((y / fy).clamp(from.y0, from.y1 - 1) - from.y0) as usize;
        let line = src.row(sy.min(src.h - 1));
        for (col, x) in (to.x0..to.x1).enumerate() {
            let sx = ((x / fx).clamp(from.x0, from.x1 - 1) - from.x0) as usize;
            out.set(col, row, line[sx.min(src.w - 1)]);
        }
    }
    out
}

fn upsample_block(blk: &SampleBlock, from: Rect, to: Rect, (fx, fy): (u8, u8)) -> SampleBlock {
    let (fx, fy) = (u32::from(fx), u32::from(fy));
    match blk {
        SampleBlock::Int(b) => SampleBlock::Int(upsample(b, from, to, fx, fy)),
        SampleBlock::Float(b) => SampleBlock::Float(upsample(b, from, to, fx, fy)),
    }
}

/// Upsampling factors bringing components 1 and 2 onto the grid of component 0.
fn resampling_factors(geometry: &ImageGeometry) -> Result<[(u8, u8); 3], ReconError> {
    let luma = geometry.components[0];
    let mut factors = [(1, 1); 3];
    for (c, factor) in factors.iter_mut().enumerate() {
        let comp = geometry.components[c];
        let ratio = |sub: u8, base: u8| (sub % base == 0).then(|| sub / base).filter(|f| *f <= 2);
        match (ratio(comp.dx, luma.dx), ratio(comp.dy, luma.dy)) {
            (Some(fx), Some(fy)) => *factor = (fx, fy),
            _ => {
                return Err(ReconError::UnsupportedResampling {
                    component: c,
                    dx: comp.dx,
                    dy: comp.dy,
                });
            }
        }
    }
    Ok(factors)
}

fn check_sizes(w: usize, h: usize, others: [(usize, usize); 2]) -> Result<(), ReconError> {
    if others.iter().any(|&size| size != (w, h)) {
        return Err(ReconError::ComponentSizeMismatch);
    }
    Ok(())
}

struct MappedPlanes {
    rl: u8,
    kind: DataKind,
    planes: [SampleBlock; 3],
}

pub struct ColorSpaceMapper<S> {
    src: S,
    mapping: ColorMapping,
    /// Upsampling of each mapped component onto the luma grid.
    factors: [(u8, u8); 3],
    cache: Option<MappedPlanes>,
}

impl<S: ImageSource> ColorSpaceMapper<S> {
    /// Wraps `src`. sYCC mapping needs an image of one component (passed through) or three,
    /// the chroma subsampled at most 2:1 relative to the luma.
    pub fn new(src: S, mapping: ColorMapping) -> Result<Self, ReconError> {
        let nc = src.num_components();
        let mut factors = [(1, 1); 3];
        if mapping == ColorMapping::SYcc {
            match nc {
                1 => {}
                TRANSFORM_COMPONENT_COUNT => factors = resampling_factors(src.geometry())?,
                _ => return Err(ReconError::UnsupportedComponentCount(nc)),
            }
        }
        debug!(
            "colour space mapping {:?} on {} components, upsampling {:?}",
            mapping, nc, factors
        );
        Ok(Self {
            src,
            mapping,
            factors,
            cache: None,
        })
    }

    pub fn mapping(&self) -> ColorMapping {
        self.mapping
    }

    pub fn source(&self) -> &S {
        &self.src
    }

    fn is_mapped(&self, c: usize) -> bool {
        self.mapping == ColorMapping::SYcc
            && self.src.num_components() == TRANSFORM_COMPONENT_COUNT
            && c < TRANSFORM_COMPONENT_COUNT
    }

    fn fill_cache(&mut self, rl: u8, kind: DataKind) -> Result<(), ReconError> {
        if self
            .cache
            .as_ref()
            .is_some_and(|cache| cache.rl == rl && cache.kind == kind)
        {
            return Ok(());
        }
        let mut planes: [SampleBlock; 3] = Default::default();
        for (c, plane) in planes.iter_mut().enumerate() {
            let natural = self.src.data_kind(c)?;
            let mut blk = self.src.get_comp_data(c, rl, natural, None)?;
            if natural != kind {
                blk = convert_block(&blk, kind);
            }
            if self.factors[c] != (1, 1) {
                let from = self.src.tile_comp_rect(c, rl)?;
                let to = self.tile_comp_rect(c, rl)?;
                blk = upsample_block(&blk, from, to, self.factors[c]);
            }
            *plane = blk;
        }
        let planes = match kind {
            DataKind::Int => map_int(planes)?,
            DataKind::Float => map_float(planes)?,
        };
        self.cache = Some(MappedPlanes { rl, kind, planes });
        Ok(())
    }
}

impl<S: ImageSource> TiledSource for ColorSpaceMapper<S> {
    fn geometry(&self) -> &ImageGeometry {
        self.src.geometry()
    }

    fn specs(&self) -> &DecoderSpecs {
        self.src.specs()
    }

    fn tile(&self) -> TileContext {
        self.src.tile()
    }

    fn set_tile(&mut self, x: u32, y: u32) -> Result<TileContext, ReconError> {
        self.cache = None;
        self.src.set_tile(x, y)
    }

    fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        self.cache = None;
        self.src.next_tile()
    }
}

impl<S: ImageSource> ImageSource for ColorSpaceMapper<S> {
    fn max_resolution_level(&self, c: usize) -> Result<u8, ReconError> {
        self.src.max_resolution_level(c)
    }

    fn data_kind(&self, c: usize) -> Result<DataKind, ReconError> {
        if !self.is_mapped(c) {
            return self.src.data_kind(c);
        }
        for mapped in 0..TRANSFORM_COMPONENT_COUNT {
            if self.src.data_kind(mapped)? == DataKind::Float {
                return Ok(DataKind::Float);
            }
        }
        Ok(DataKind::Int)
    }

    fn comp_subsampling(&self, c: usize) -> Result<(u8, u8), ReconError> {
        if self.is_mapped(c) {
            self.src.comp_subsampling(0)
        } else {
            self.src.comp_subsampling(c)
        }
    }

    fn get_intern_comp_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError> {
        if !self.is_mapped(c) {
            return self.src.get_intern_comp_data(c, rl, kind);
        }
        self.fill_cache(rl, kind)?;
        match &self.cache {
            Some(cache) => Ok(&cache.planes[c]),
            None => Err(ReconError::ComponentOutOfRange(c)),
        }
    }
}
