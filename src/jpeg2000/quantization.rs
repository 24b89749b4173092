//! Inverse quantization (ISO/IEC 15444-1, Annex E).
//!
//! Code-block samples arrive in sign-magnitude form with the most significant magnitude bit at
//! bit 30. Reversible coding only undoes that alignment. Scalar quantization multiplies the
//! magnitude by the subband step, scaled by the nominal range of the subband and by the
//! alignment shift.

use log::debug;

use crate::constants::{MAGNITUDE_MASK, MAXIMUM_MAGNITUDE_BITS, SIGN_BIT};
use crate::error::ReconError;
use crate::jpeg2000::component_transform::{ComponentTransform, calc_mixed_bit_depths};
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock};
use crate::jpeg2000::source::{CoefficientSource, QuantizedSource, SubbandSource, TiledSource};
use crate::jpeg2000::specs::{DecoderSpecs, QuantizationType};
use crate::jpeg2000::subband::{Subband, SubbandInfo};
use crate::jpeg2000::tiling::{ImageGeometry, TileContext};

/// Builds the sign-magnitude form of `value` for a subband with `magbits` magnitude bits.
pub fn to_sign_magnitude(value: i32, magbits: u8) -> i32 {
    let shift = u32::from(MAXIMUM_MAGNITUDE_BITS - magbits.min(MAXIMUM_MAGNITUDE_BITS));
    let magnitude = (value.unsigned_abs() << shift) as i32 & MAGNITUDE_MASK;
    if value < 0 { SIGN_BIT | magnitude } else { magnitude }
}

/// Integer value of a sign-magnitude sample with `magbits` magnitude bits.
pub fn from_sign_magnitude(raw: i32, magbits: u8) -> i32 {
    let shift = u32::from(MAXIMUM_MAGNITUDE_BITS - magbits.min(MAXIMUM_MAGNITUDE_BITS));
    if raw >= 0 {
        raw >> shift
    } else {
        -((raw & MAGNITUDE_MASK) >> shift)
    }
}

/// Signed magnitude of a sign-magnitude sample, before any scaling.
#[inline]
fn signed_magnitude(raw: i32) -> f32 {
    if raw >= 0 {
        raw as f32
    } else {
        -((raw & MAGNITUDE_MASK) as f32)
    }
}

/// Inverse quantization of one subband.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dequantization {
    /// Reversible: drop the `shift` unused low bit-planes.
    Shift { shift: u32 },
    /// Scalar: multiply the aligned magnitude by `step`, already divided by `2^(31 - magbits)`.
    Scale { step: f32 },
}

impl Dequantization {
    /// Converts a sign-magnitude block to two's-complement integers in place.
    pub fn apply_int(self, blk: &mut DataBlock<i32>) {
        for y in 0..blk.h {
            let row = blk.row_mut(y);
            match self {
                Dequantization::Shift { shift } => {
                    for v in row {
                        *v = if *v >= 0 {
                            *v >> shift
                        } else {
                            -((*v & MAGNITUDE_MASK) >> shift)
                        };
                    }
                }
                Dequantization::Scale { step } => {
                    for v in row {
                        *v = (signed_magnitude(*v) * step) as i32;
                    }
                }
            }
        }
    }

    /// Dequantizes `src` into the dense float block `dst`, which must have the same size.
    pub fn apply_float(self, src: &DataBlock<i32>, dst: &mut DataBlock<f32>) {
        let scale = match self {
            Dequantization::Scale { step } => step,
            Dequantization::Shift { shift } => 1.0 / (1u64 << shift) as f32,
        };
        for y in 0..src.h {
            for (out, &raw) in dst.row_mut(y).iter_mut().zip(src.row(y)) {
                *out = signed_magnitude(raw) * scale;
            }
        }
    }
}

pub struct Dequantizer<S> {
    src: S,
    transform: ComponentTransform,
    /// Nominal range bits of the component transform output, per component.
    range_bits: Vec<u8>,
    /// Set when the current tile's component transform could not be resolved.
    tile_error: Option<ReconError>,
    intern: SampleBlock,
}

impl<S: QuantizedSource> Dequantizer<S> {
    pub fn new(src: S) -> Result<Self, ReconError> {
        let mut stage = Self {
            src,
            transform: ComponentTransform::None,
            range_bits: Vec::new(),
            tile_error: None,
            intern: SampleBlock::default(),
        };
        stage.tile_changed()?;
        Ok(stage)
    }

    fn tile_changed(&mut self) -> Result<(), ReconError> {
        let tile = self.src.tile();
        let utrb: Vec<u8> = self.src.geometry().components.iter().map(|c| c.depth).collect();
        match ComponentTransform::for_tile(self.src.specs(), tile, utrb.len()) {
            Ok(transform) => {
                self.transform = transform;
                self.range_bits = calc_mixed_bit_depths(&utrb, transform);
                self.tile_error = None;
                debug!(
                    "dequantizer at tile {}: {:?}, range bits {:?}",
                    tile.index, self.transform, self.range_bits
                );
                Ok(())
            }
            Err(e) => {
                self.transform = ComponentTransform::None;
                self.range_bits.clear();
                self.tile_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Nominal range bits used to scale the steps of component `c`.
    pub fn range_bits(&self, c: usize) -> Result<u8, ReconError> {
        self.range_bits
            .get(c)
            .copied()
            .ok_or(ReconError::ComponentOutOfRange(c))
    }

    pub fn component_transform(&self) -> ComponentTransform {
        self.transform
    }

    /// Inverse quantization of subband `sb` of component `c` in the current tile.
    pub fn dequantization(&self, c: usize, sb: &SubbandInfo) -> Result<Dequantization, ReconError> {
        let tile = self.src.tile().index;
        let specs = self.src.specs();
        let shift = u32::from(MAXIMUM_MAGNITUDE_BITS - sb.magbits.min(MAXIMUM_MAGNITUDE_BITS));
        let rb = i32::from(self.range_bits(c)?);
        let params = specs.quant_params.get(tile, c);

        let step = match *specs.quant_type.get(tile, c) {
            QuantizationType::Reversible => return Ok(Dequantization::Shift { shift }),
            QuantizationType::Derived => {
                let mrl = i32::from(self.src.subband_tree(c)?.info.res_level);
                let exp = rb + i32::from(sb.gain_exponent) + mrl - i32::from(sb.level);
                f64::from(params.step(0, 0)?) * 2f64.powi(exp)
            }
            QuantizationType::Expounded => {
                let exp = rb + i32::from(sb.gain_exponent);
                f64::from(params.step(sb.res_level, sb.subband_idx)?) * 2f64.powi(exp)
            }
        };
        Ok(Dequantization::Scale {
            step: (step / 2f64.powi(shift as i32)) as f32,
        })
    }

    /// Validates a request against the tile-component's filter before touching any data.
    fn prepare(&self, c: usize, sb: &SubbandInfo, kind: DataKind) -> Result<Dequantization, ReconError> {
        if let Some(e) = &self.tile_error {
            return Err(e.clone());
        }
        let natural = self.src.specs().filter.get(self.src.tile().index, c).data_kind();
        if kind != natural {
            return Err(ReconError::DataKindMismatch {
                requested: kind,
                actual: natural,
            });
        }
        self.dequantization(c, sb)
    }
}

impl<S: QuantizedSource> TiledSource for Dequantizer<S> {
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

impl<S: QuantizedSource> SubbandSource for Dequantizer<S> {
    fn subband_tree(&self, c: usize) -> Result<&Subband, ReconError> {
        self.src.subband_tree(c)
    }
}

impl<S: QuantizedSource> CoefficientSource for Dequantizer<S> {
    fn get_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        kind: DataKind,
        reuse: Option<SampleBlock>,
    ) -> Result<SampleBlock, ReconError> {
        let dq = self.prepare(c, sb, kind)?;
        match kind {
            DataKind::Int => {
                let reuse = reuse.and_then(SampleBlock::into_int);
                let mut blk = self.src.get_code_block(c, m, n, sb, reuse)?;
                dq.apply_int(&mut blk);
                Ok(SampleBlock::Int(blk))
            }
            DataKind::Float => {
                let reuse = reuse.and_then(SampleBlock::into_float);
                let src = self.src.get_intern_code_block(c, m, n, sb)?;
                let mut out = DataBlock::reuse_or_new(reuse, src.ulx, src.uly, src.w, src.h);
                out.progressive = src.progressive;
                dq.apply_float(src, &mut out);
                Ok(SampleBlock::Float(out))
            }
        }
    }

    fn get_intern_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError> {
        let dq = self.prepare(c, sb, kind)?;
        let src = self.src.get_intern_code_block(c, m, n, sb)?;
        match kind {
            DataKind::Int => {
                let mut out = std::mem::take(&mut self.intern).into_int().unwrap_or_default();
                src.copy_dense_into(&mut out);
                dq.apply_int(&mut out);
                self.intern = SampleBlock::Int(out);
            }
            DataKind::Float => {
                let reuse = std::mem::take(&mut self.intern).into_float();
                let mut out = DataBlock::reuse_or_new(reuse, src.ulx, src.uly, src.w, src.h);
                out.progressive = src.progressive;
                dq.apply_float(src, &mut out);
                self.intern = SampleBlock::Float(out);
            }
        }
        Ok(&self.intern)
    }
}
