//! Synthesis subband tree of a tile-component (ISO/IEC 15444-1, Annex B.5 and F.3).
//!
//! The root is the whole tile-component at full resolution. Each LL node splits into LL, HL, LH
//! and HH children; the leaves hold the code-blocks. Positions inside the tile buffer follow the
//! Mallat layout: LL top-left, HL to its right, LH below it, HH diagonal.

use log::trace;

use crate::constants::MAXIMUM_MAGNITUDE_BITS;
use crate::error::ReconError;
use crate::jpeg2000::image::SubbandOrientation;
use crate::jpeg2000::specs::{DecoderSpecs, QuantizationType};
use crate::jpeg2000::tiling::{ImageGeometry, Rect, TileContext};

/// Scalar description of one subband.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubbandInfo {
    pub orientation: SubbandOrientation,
    /// Number of decompositions that produced this subband (0 for the root).
    pub level: u8,
    /// Resolution level the subband belongs to.
    pub res_level: u8,
    /// Index among the subbands of its resolution level (0 for LL, 1..=3 for HL, LH, HH).
    pub subband_idx: u32,
    /// Base 2 exponent of the analysis gain.
    pub gain_exponent: u8,
    /// Upper-left corner on the subband's own canvas grid.
    pub ulcx: u32,
    pub ulcy: u32,
    /// Upper-left corner inside the tile-component buffer.
    pub ulx: u32,
    pub uly: u32,
    pub w: u32,
    pub h: u32,
    /// Number of magnitude bit-planes (leaves only).
    pub magbits: u8,
    /// Nominal code-block width and height.
    pub cb_width: u32,
    pub cb_height: u32,
    /// Code-blocks per row and per column.
    pub num_cb_x: u32,
    pub num_cb_y: u32,
}

impl SubbandInfo {
    fn code_block_count(origin: u32, len: u32, nominal: u32) -> u32 {
        if len == 0 {
            return 0;
        }
        (origin + len).div_ceil(nominal) - origin / nominal
    }

    /// Rectangle of code-block `(m, n)` (row, column), relative to the subband.
    pub fn code_block_rect(&self, m: u32, n: u32) -> Result<Rect, ReconError> {
        if m >= self.num_cb_y || n >= self.num_cb_x {
            return Err(ReconError::CodeBlockOutOfRange {
                m: m as usize,
                n: n as usize,
            });
        }
        let span = |origin: u32, len: u32, nominal: u32, idx: u32| {
            let start = (origin / nominal + idx) * nominal;
            let c0 = start.max(origin);
            let c1 = (start + nominal).min(origin + len);
            (c0 - origin, c1 - origin)
        };
        let (x0, x1) = span(self.ulcx, self.w, self.cb_width, n);
        let (y0, y1) = span(self.ulcy, self.h, self.cb_height, m);
        Ok(Rect::new(x0, y0, x1, y1))
    }

    pub fn code_block_count_total(&self) -> usize {
        self.num_cb_x as usize * self.num_cb_y as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subband {
    pub info: SubbandInfo,
    children: Option<Box<[Subband; 4]>>,
}

impl Subband {
    /// Builds the geometric tree for a tile-component rectangle and `levels` decompositions.
    pub fn new(rect: Rect, levels: u8) -> Self {
        let info = SubbandInfo {
            orientation: SubbandOrientation::LL,
            level: 0,
            res_level: levels,
            subband_idx: 0,
            gain_exponent: 0,
            ulcx: rect.x0,
            ulcy: rect.y0,
            ulx: 0,
            uly: 0,
            w: rect.width(),
            h: rect.height(),
            ..Default::default()
        };
        let mut root = Subband {
            info,
            children: None,
        };
        root.decompose(levels);
        root
    }

    fn decompose(&mut self, levels: u8) {
        if levels == 0 {
            return;
        }
        self.split();
        if let Some(children) = self.children.as_mut() {
            children[0].decompose(levels - 1);
        }
    }

    fn split(&mut self) {
        let p = self.info;
        let mut ll = SubbandInfo {
            orientation: SubbandOrientation::LL,
            level: p.level + 1,
            res_level: p.res_level - 1,
            subband_idx: p.subband_idx << 2,
            gain_exponent: p.gain_exponent + SubbandOrientation::LL.gain_exponent(),
            ulcx: (p.ulcx + 1) >> 1,
            ulcy: (p.ulcy + 1) >> 1,
            ulx: p.ulx,
            uly: p.uly,
            ..Default::default()
        };
        ll.w = ((p.ulcx + p.w + 1) >> 1) - ll.ulcx;
        ll.h = ((p.ulcy + p.h + 1) >> 1) - ll.ulcy;

        let mut hl = SubbandInfo {
            orientation: SubbandOrientation::HL,
            level: p.level + 1,
            res_level: p.res_level,
            subband_idx: (p.subband_idx << 2) + 1,
            gain_exponent: p.gain_exponent + SubbandOrientation::HL.gain_exponent(),
            ulcx: p.ulcx >> 1,
            ulcy: ll.ulcy,
            ulx: p.ulx + ll.w,
            uly: p.uly,
            h: ll.h,
            ..Default::default()
        };
        hl.w = ((p.ulcx + p.w) >> 1) - hl.ulcx;

        let mut lh = SubbandInfo {
            orientation: SubbandOrientation::LH,
            level: p.level + 1,
            res_level: p.res_level,
            subband_idx: (p.subband_idx << 2) + 2,
            gain_exponent: p.gain_exponent + SubbandOrientation::LH.gain_exponent(),
            ulcx: ll.ulcx,
            ulcy: p.ulcy >> 1,
            ulx: p.ulx,
            uly: p.uly + ll.h,
            w: ll.w,
            ..Default::default()
        };
        lh.h = ((p.ulcy + p.h) >> 1) - lh.ulcy;

        let hh = SubbandInfo {
            orientation: SubbandOrientation::HH,
            level: p.level + 1,
            res_level: p.res_level,
            subband_idx: (p.subband_idx << 2) + 3,
            gain_exponent: p.gain_exponent + SubbandOrientation::HH.gain_exponent(),
            ulcx: hl.ulcx,
            ulcy: lh.ulcy,
            ulx: hl.ulx,
            uly: lh.uly,
            w: hl.w,
            h: lh.h,
            ..Default::default()
        };

        self.children = Some(Box::new([ll, hl, lh, hh].map(|info| Subband {
            info,
            children: None,
        })));
    }

    pub fn children(&self) -> Option<&[Subband; 4]> {
        self.children.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Leaves in synthesis order: the lowest LL, then HL, LH, HH of each resolution level.
    pub fn leaves(&self) -> Vec<&SubbandInfo> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a SubbandInfo>) {
        match self.children() {
            Some(children) => children.iter().for_each(|c| c.collect_leaves(out)),
            None => out.push(&self.info),
        }
    }

    fn leaves_mut(&mut self) -> Vec<&mut SubbandInfo> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(sb) = stack.pop() {
            match sb.children.as_deref_mut() {
                Some(children) => stack.extend(children.iter_mut().rev()),
                None => out.push(&mut sb.info),
            }
        }
        out
    }

    /// The LL node (or leaf) at resolution level `rl`.
    pub fn resolution(&self, rl: u8) -> Option<&Subband> {
        let mut sb = self;
        while sb.info.res_level > rl {
            sb = &sb.children()?[0];
        }
        (sb.info.res_level == rl).then_some(sb)
    }

    /// Subband `sbi` of resolution level `rl`: 0 is the level's LL, 1..=3 its HL, LH, HH.
    pub fn subband_by_idx(&self, rl: u8, sbi: u32) -> Option<&Subband> {
        let node = self.resolution(rl)?;
        match sbi {
            0 => Some(node),
            1..=3 => node.children().map(|c| &c[sbi as usize]),
            _ => None,
        }
    }
}

/// Builds the synthesis tree of tile-component `(tile, c)` with the magnitude bits and
/// code-block partition filled in from the coding parameters.
pub fn synthesis_tree(
    geometry: &ImageGeometry,
    specs: &DecoderSpecs,
    tile: TileContext,
    c: usize,
) -> Result<Subband, ReconError> {
    specs.validate_tile_component(tile.index, c)?;
    let rect = geometry.tile_comp_rect(tile, c)?;
    let levels = *specs.decomposition_levels.get(tile.index, c);
    let qt = *specs.quant_type.get(tile.index, c);
    let params = specs.quant_params.get(tile.index, c);
    let guard = i32::from(*specs.guard_bits.get(tile.index, c));
    let (xcb, ycb) = *specs.code_block_size.get(tile.index, c);

    let mut tree = Subband::new(rect, levels);
    for info in tree.leaves_mut() {
        let exponent = match qt {
            QuantizationType::Derived => {
                i32::from(params.exponent(0, 0)?) - (i32::from(levels) - i32::from(info.level))
            }
            _ => i32::from(params.exponent(info.res_level, info.subband_idx)?),
        };
        let magbits = guard + exponent - 1;
        if !(0..=i32::from(MAXIMUM_MAGNITUDE_BITS)).contains(&magbits) {
            return Err(ReconError::InvalidMagnitudeBits(magbits));
        }
        info.magbits = magbits as u8;
        info.cb_width = 1 << xcb;
        info.cb_height = 1 << ycb;
        info.num_cb_x = SubbandInfo::code_block_count(info.ulcx, info.w, info.cb_width);
        info.num_cb_y = SubbandInfo::code_block_count(info.ulcy, info.h, info.cb_height);
    }
    trace!(
        "subband tree tile {} comp {}: {}x{} at ({}, {}), {} levels",
        tile.index,
        c,
        rect.width(),
        rect.height(),
        rect.x0,
        rect.y0,
        levels
    );
    Ok(tree)
}
