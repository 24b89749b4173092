//! ROI de-scaling with the maximum shift method (ISO/IEC 15444-1, Annex H).
//!
//! The encoder shifts background coefficients down by the ROI boost so that every ROI bit-plane
//! comes first. A coefficient whose top `magbits` magnitude bits are all zero is background and
//! is shifted back up. An ROI coefficient that received bit-planes beyond `magbits` is cut back
//! to `magbits` planes with the mid-interval reconstruction bit set just below them.

use log::debug;

use crate::constants::{MAGNITUDE_MASK, SIGN_BIT};
use crate::error::ReconError;
use crate::jpeg2000::data_block::DataBlock;
use crate::jpeg2000::source::{QuantizedSource, SubbandSource, TiledSource};
use crate::jpeg2000::specs::DecoderSpecs;
use crate::jpeg2000::subband::{Subband, SubbandInfo};
use crate::jpeg2000::tiling::{ImageGeometry, TileContext};

/// De-scaling applied to one tile-component, chosen at tile change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiStrategy {
    /// No ROI coded (or ROI de-scaling disabled): samples pass through untouched.
    Identity,
    /// Maximum shift de-scaling with the RGN boost value.
    MaxShift { boost: u8 },
}

impl RoiStrategy {
    /// De-scales a sign-magnitude block in place.
    pub fn apply(self, blk: &mut DataBlock<i32>, magbits: u8) {
        let RoiStrategy::MaxShift { boost } = self else {
            return;
        };
        let m = u32::from(magbits);
        let mask = (((1u64 << m) - 1) << (31 - m)) as i32;
        let below = !mask & MAGNITUDE_MASK;
        let mid = if m < 31 { 1i32 << (30 - m) } else { 0 };
        let boost = u32::from(boost);

        for y in 0..blk.h {
            for v in blk.row_mut(y) {
                let tmp = *v;
                if tmp & mask == 0 {
                    *v = (tmp & SIGN_BIT) | tmp.checked_shl(boost).unwrap_or(0);
                } else if tmp & below != 0 {
                    *v = (tmp & !below) | mid;
                }
            }
        }
    }
}

pub struct RoiDeScaler<S> {
    src: S,
    enabled: bool,
    strategies: Vec<RoiStrategy>,
    buffer: DataBlock<i32>,
}

impl<S: QuantizedSource> RoiDeScaler<S> {
    /// Wraps `src`. With `enabled` false every tile-component uses [`RoiStrategy::Identity`].
    pub fn new(src: S, enabled: bool) -> Self {
        let mut stage = Self {
            src,
            enabled,
            strategies: Vec::new(),
            buffer: DataBlock::default(),
        };
        stage.select_strategies();
        stage
    }

    fn select_strategies(&mut self) {
        let tile = self.src.tile();
        let specs = self.src.specs();
        self.strategies = (0..self.src.num_components())
            .map(|c| match specs.roi_shift.get(tile.index, c) {
                Some(boost) if self.enabled => RoiStrategy::MaxShift { boost: *boost },
                _ => RoiStrategy::Identity,
            })
            .collect();
        debug!("ROI de-scaling at tile {}: {:?}", tile.index, self.strategies);
    }

    pub fn strategy(&self, c: usize) -> Result<RoiStrategy, ReconError> {
        self.strategies
            .get(c)
            .copied()
            .ok_or(ReconError::ComponentOutOfRange(c))
    }
}

impl<S: QuantizedSource> TiledSource for RoiDeScaler<S> {
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
        self.select_strategies();
        moved
    }

    fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        let moved = self.src.next_tile();
        self.select_strategies();
        moved
    }
}

impl<S: QuantizedSource> SubbandSource for RoiDeScaler<S> {
    fn subband_tree(&self, c: usize) -> Result<&Subband, ReconError> {
        self.src.subband_tree(c)
    }
}

impl<S: QuantizedSource> QuantizedSource for RoiDeScaler<S> {
    fn get_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        reuse: Option<DataBlock<i32>>,
    ) -> Result<DataBlock<i32>, ReconError> {
        let strategy = self.strategy(c)?;
        let mut blk = self.src.get_code_block(c, m, n, sb, reuse)?;
        strategy.apply(&mut blk, sb.magbits);
        Ok(blk)
    }

    fn get_intern_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
    ) -> Result<&DataBlock<i32>, ReconError> {
        match self.strategy(c)? {
            RoiStrategy::Identity => self.src.get_intern_code_block(c, m, n, sb),
            strategy => {
                let blk = self.src.get_intern_code_block(c, m, n, sb)?;
                blk.copy_dense_into(&mut self.buffer);
                strategy.apply(&mut self.buffer, sb.magbits);
                Ok(&self.buffer)
            }
        }
    }
}
