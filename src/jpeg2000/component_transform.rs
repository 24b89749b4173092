//! Multiple component transformations (ISO/IEC 15444-1, Annex G).
//!
//! The reversible transform (RCT) is an integer lifting of RGB into YCbCr and is only valid when
//! the first three components use the 5-3 filter. The irreversible transform (ICT) is the usual
//! YCbCr matrix and needs the 9-7 filter on all three. Components from index 3 up pass through.

use log::debug;

use crate::constants::{
    ICT_CB_TO_B, ICT_CB_TO_G, ICT_CR_TO_G, ICT_CR_TO_R, ICT_FORWARD, TRANSFORM_COMPONENT_COUNT,
};
use crate::error::ReconError;
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock, convert_block};
use crate::jpeg2000::source::{ImageSource, TiledSource};
use crate::jpeg2000::specs::DecoderSpecs;
use crate::jpeg2000::tiling::{ImageGeometry, TileContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentTransform {
    None,
    /// Reversible component transform, integer.
    Rct,
    /// Irreversible component transform, floating point.
    Ict,
}

impl ComponentTransform {
    /// Transform coded for `tile`, from its MCT flag and the filters of the first three
    /// components.
    pub fn for_tile(
        specs: &DecoderSpecs,
        tile: TileContext,
        num_components: usize,
    ) -> Result<Self, ReconError> {
        if !*specs.component_transform.get_tile(tile.index) {
            return Ok(ComponentTransform::None);
        }
        if num_components < TRANSFORM_COMPONENT_COUNT {
            return Err(ReconError::ComponentTransformNeedsThreeComponents(num_components));
        }
        let reversible = (0..TRANSFORM_COMPONENT_COUNT)
            .filter(|&c| specs.filter.get(tile.index, c).is_reversible())
            .count();
        match reversible {
            TRANSFORM_COMPONENT_COUNT => Ok(ComponentTransform::Rct),
            0 => Ok(ComponentTransform::Ict),
            _ => Err(ReconError::IncoherentComponentTransform { tile: tile.index }),
        }
    }

    /// Sample representation the transform produces.
    pub fn data_kind(self) -> Option<DataKind> {
        match self {
            ComponentTransform::None => None,
            ComponentTransform::Rct => Some(DataKind::Int),
            ComponentTransform::Ict => Some(DataKind::Float),
        }
    }
}

fn floor_log2(v: u64) -> u32 {
    63 - v.max(1).leading_zeros()
}

/// Nominal range bits of the transformed components, given the range bits `utrb` of the
/// components the decoder outputs.
pub fn calc_mixed_bit_depths(utrb: &[u8], transform: ComponentTransform) -> Vec<u8> {
    let mut out = utrb.to_vec();
    if transform == ComponentTransform::None || utrb.len() < TRANSFORM_COMPONENT_COUNT {
        return out;
    }
    let p = |c: usize| 1u64 << utrb[c];
    match transform {
        ComponentTransform::Rct => {
            out[0] = (floor_log2(p(0) + 2 * p(1) + p(2) - 1) - 2 + 1) as u8;
            out[1] = (floor_log2(p(2) + p(1) - 1) + 1) as u8;
            out[2] = (floor_log2(p(0) + p(1) - 1) + 1) as u8;
        }
        ComponentTransform::Ict => {
            let f = |c: usize| p(c) as f64;
            let depth = |v: f64| (floor_log2((v.floor() as u64).saturating_sub(1)) + 1) as u8;
            out[0] = depth(f(0) * 0.299072 + f(1) * 0.586914 + f(2) * 0.114014);
            out[1] = depth(f(0) * 0.168701 + f(1) * 0.331299 + f(2) * 0.5);
            out[2] = depth(f(0) * 0.5 + f(1) * 0.418701 + f(2) * 0.081299);
        }
        ComponentTransform::None => {}
    }
    out
}

/// Forward RCT of one (R, G, B) sample.
pub fn forward_rct(r: i32, g: i32, b: i32) -> (i32, i32, i32) {
    ((r + 2 * g + b) >> 2, b - g, r - g)
}

/// Inverse RCT of one (Y, Cb, Cr) sample.
pub fn inverse_rct(y: i32, cb: i32, cr: i32) -> (i32, i32, i32) {
    let g = y - ((cb + cr) >> 2);
    (cr + g, g, cb + g)
}

/// Forward ICT of one (R, G, B) sample.
pub fn forward_ict(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let m = ICT_FORWARD;
    (
        m[0][0] * r + m[0][1] * g + m[0][2] * b,
        m[1][0] * r + m[1][1] * g + m[1][2] * b,
        m[2][0] * r + m[2][1] * g + m[2][2] * b,
    )
}

/// Inverse ICT of one (Y, Cb, Cr) sample.
pub fn inverse_ict(y: f32, cb: f32, cr: f32) -> (f32, f32, f32) {
    (
        y + ICT_CR_TO_R * cr,
        y + ICT_CB_TO_G * cb + ICT_CR_TO_G * cr,
        y + ICT_CB_TO_B * cb,
    )
}

fn same_size<T>(blocks: &[DataBlock<T>; 3]) -> Result<(), ReconError> {
    let (w, h) = (blocks[0].w, blocks[0].h);
    if blocks.iter().any(|b| b.w != w || b.h != h) {
        return Err(ReconError::ComponentSizeMismatch);
    }
    Ok(())
}

fn apply_rct(inputs: [DataBlock<i32>; 3]) -> Result<[DataBlock<i32>; 3], ReconError> {
    same_size(&inputs)?;
    let [mut y, mut cb, mut cr] = inputs;
    let progressive = y.progressive || cb.progressive || cr.progressive;
    for row in 0..y.h {
        let rows = y.row_mut(row).iter_mut().zip(cb.row_mut(row)).zip(cr.row_mut(row));
        for ((y, cb), cr) in rows {
            let (r, g, b) = inverse_rct(*y, *cb, *cr);
            (*y, *cb, *cr) = (r, g, b);
        }
    }
    for blk in [&mut y, &mut cb, &mut cr] {
        blk.progressive = progressive;
    }
    Ok([y, cb, cr])
}

fn apply_ict(inputs: [DataBlock<f32>; 3]) -> Result<[DataBlock<f32>; 3], ReconError> {
    same_size(&inputs)?;
    let [mut y, mut cb, mut cr] = inputs;
    let progressive = y.progressive || cb.progressive || cr.progressive;
    for row in 0..y.h {
        let rows = y.row_mut(row).iter_mut().zip(cb.row_mut(row)).zip(cr.row_mut(row));
        for ((y, cb), cr) in rows {
            let (r, g, b) = inverse_ict(*y, *cb, *cr);
            (*y, *cb, *cr) = (r, g, b);
        }
    }
    for blk in [&mut y, &mut cb, &mut cr] {
        blk.progressive = progressive;
    }
    Ok([y, cb, cr])
}

/// Output of the three transformed components for one resolution level and kind.
struct TransformCache {
    rl: u8,
    kind: DataKind,
    planes: [SampleBlock; 3],
}

pub struct InverseComponentTransform<S> {
    src: S,
    enabled: bool,
    transform: ComponentTransform,
    /// Set when the current tile's component transform could not be resolved.
    tile_error: Option<ReconError>,
    cache: Option<TransformCache>,
}

impl<S: ImageSource> InverseComponentTransform<S> {
    /// Wraps `src`. With `enabled` false the transformed planes are passed through as decoded.
    pub fn new(src: S, enabled: bool) -> Result<Self, ReconError> {
        let mut stage = Self {
            src,
            enabled,
            transform: ComponentTransform::None,
            tile_error: None,
            cache: None,
        };
        stage.tile_changed()?;
        Ok(stage)
    }

    fn tile_changed(&mut self) -> Result<(), ReconError> {
        let tile = self.src.tile();
        self.cache = None;
        let coded = match ComponentTransform::for_tile(self.src.specs(), tile, self.src.num_components()) {
            Ok(coded) => coded,
            Err(e) => {
                self.transform = ComponentTransform::None;
                self.tile_error = Some(e.clone());
                return Err(e);
            }
        };
        self.transform = if self.enabled { coded } else { ComponentTransform::None };
        self.tile_error = None;
        debug!(
            "inverse component transform at tile {}: {:?} (coded {:?})",
            tile.index, self.transform, coded
        );
        Ok(())
    }

    pub fn transform(&self) -> ComponentTransform {
        self.transform
    }

    fn check_tile(&self) -> Result<(), ReconError> {
        match &self.tile_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn fill_cache(&mut self, rl: u8, kind: DataKind) -> Result<(), ReconError> {
        if self
            .cache
            .as_ref()
            .is_some_and(|cache| cache.rl == rl && cache.kind == kind)
        {
            return Ok(());
        }
        let planes = match self.transform {
            ComponentTransform::Rct => {
                if kind != DataKind::Int {
                    return Err(ReconError::DataKindMismatch {
                        requested: kind,
                        actual: DataKind::Int,
                    });
                }
                let mut inputs: [DataBlock<i32>; 3] = Default::default();
                for (c, input) in inputs.iter_mut().enumerate() {
                    let blk = self.src.get_comp_data(c, rl, DataKind::Int, None)?;
                    *input = blk.into_int().ok_or(ReconError::DataKindMismatch {
                        requested: DataKind::Int,
                        actual: DataKind::Float,
                    })?;
                }
                apply_rct(inputs)?.map(SampleBlock::Int)
            }
            ComponentTransform::Ict => {
                let mut inputs: [DataBlock<f32>; 3] = Default::default();
                for (c, input) in inputs.iter_mut().enumerate() {
                    let blk = self.src.get_comp_data(c, rl, DataKind::Float, None)?;
                    *input = blk.into_float().ok_or(ReconError::DataKindMismatch {
                        requested: DataKind::Float,
                        actual: DataKind::Int,
                    })?;
                }
                let out = apply_ict(inputs)?.map(SampleBlock::Float);
                if kind == DataKind::Int {
                    out.map(|blk| convert_block(&blk, DataKind::Int))
                } else {
                    out
                }
            }
            ComponentTransform::None => return Ok(()),
        };
        self.cache = Some(TransformCache { rl, kind, planes });
        Ok(())
    }
}

impl<S: ImageSource> TiledSource for InverseComponentTransform<S> {
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
        let moved = self.src.set_tile(x, y);
        let changed = self.tile_changed();
        let tile = moved?;
        changed?;
        Ok(tile)
    }

    fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        let moved = self.src.next_tile();
        let changed = self.tile_changed();
        let tile = moved?;
        changed?;
        Ok(tile)
    }
}

impl<S: ImageSource> ImageSource for InverseComponentTransform<S> {
    fn max_resolution_level(&self, c: usize) -> Result<u8, ReconError> {
        self.src.max_resolution_level(c)
    }

    fn data_kind(&self, c: usize) -> Result<DataKind, ReconError> {
        self.check_tile()?;
        match self.transform.data_kind() {
            Some(kind) if c < TRANSFORM_COMPONENT_COUNT => Ok(kind),
            _ => self.src.data_kind(c),
        }
    }

    fn get_intern_comp_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError> {
        self.check_tile()?;
        if self.transform == ComponentTransform::None || c >= TRANSFORM_COMPONENT_COUNT {
            return self.src.get_intern_comp_data(c, rl, kind);
        }
        self.fill_cache(rl, kind)?;
        match &self.cache {
            Some(cache) => Ok(&cache.planes[c]),
            None => Err(ReconError::ComponentOutOfRange(c)),
        }
    }
}
