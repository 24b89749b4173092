//! Pull contracts between the reconstruction stages.
//!
//! Every stage owns its upstream source and forwards tile changes to it before recomputing its
//! own per-tile state. "Copy" operations return caller-owned dense blocks, reusing the block
//! passed in when it has the right kind. "Intern" operations return a view into a buffer owned by
//! the stage, valid until the next call on that stage.

use crate::error::ReconError;
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock};
use crate::jpeg2000::specs::DecoderSpecs;
use crate::jpeg2000::subband::{Subband, SubbandInfo};
use crate::jpeg2000::tiling::{ImageGeometry, Rect, TileContext};

/// Tile navigation and the read-only header tables.
pub trait TiledSource {
    fn geometry(&self) -> &ImageGeometry;

    fn specs(&self) -> &DecoderSpecs;

    /// The current tile.
    fn tile(&self) -> TileContext;

    fn set_tile(&mut self, x: u32, y: u32) -> Result<TileContext, ReconError>;

    /// Advances to the next tile in row-major order.
    fn next_tile(&mut self) -> Result<TileContext, ReconError>;

    fn num_components(&self) -> usize {
        self.geometry().num_components()
    }

    fn num_tiles(&self) -> (u32, u32) {
        self.geometry().num_tiles()
    }
}

/// Source organised in subbands and code-blocks.
pub trait SubbandSource: TiledSource {
    /// Synthesis subband tree of component `c` in the current tile.
    fn subband_tree(&self, c: usize) -> Result<&Subband, ReconError>;
}

/// Sign-magnitude code-blocks, as produced by the entropy decoder.
pub trait QuantizedSource: SubbandSource {
    fn get_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        reuse: Option<DataBlock<i32>>,
    ) -> Result<DataBlock<i32>, ReconError>;

    fn get_intern_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
    ) -> Result<&DataBlock<i32>, ReconError>;
}

/// Dequantized wavelet coefficients.
pub trait CoefficientSource: SubbandSource {
    fn get_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        kind: DataKind,
        reuse: Option<SampleBlock>,
    ) -> Result<SampleBlock, ReconError>;

    fn get_intern_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError>;
}

/// Reconstructed samples of whole tile-components.
pub trait ImageSource: TiledSource {
    /// Nominal range bits of component `c`, for sinks that rescale or clip.
    fn nominal_range_bits(&self, c: usize) -> Result<u8, ReconError> {
        self.geometry()
            .components
            .get(c)
            .map(|comp| comp.depth)
            .ok_or(ReconError::ComponentOutOfRange(c))
    }

    /// Highest resolution level available for component `c` in the current tile.
    fn max_resolution_level(&self, c: usize) -> Result<u8, ReconError>;

    /// Natural sample representation of component `c` in the current tile.
    fn data_kind(&self, c: usize) -> Result<DataKind, ReconError>;

    /// Horizontal and vertical subsampling of the samples handed out for component `c`.
    fn comp_subsampling(&self, c: usize) -> Result<(u8, u8), ReconError> {
        self.geometry()
            .components
            .get(c)
            .map(|comp| (comp.dx, comp.dy))
            .ok_or(ReconError::ComponentOutOfRange(c))
    }

    /// Tile-component rectangle on the component grid at resolution level `rl`.
    fn tile_comp_rect(&self, c: usize, rl: u8) -> Result<Rect, ReconError> {
        let max = self.max_resolution_level(c)?;
        if rl > max {
            return Err(ReconError::ResolutionLevelUnavailable {
                requested: rl,
                available: max,
            });
        }
        let (dx, dy) = self.comp_subsampling(c)?;
        let tile = self.tile();
        Ok(self
            .geometry()
            .tile_rect(tile.x, tile.y)
            .subsampled(dx, dy)
            .reduced(max - rl))
    }

    fn get_comp_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
        reuse: Option<SampleBlock>,
    ) -> Result<SampleBlock, ReconError> {
        let blk = self.get_intern_comp_data(c, rl, kind)?;
        Ok(blk.copy_dense(reuse))
    }

    fn get_intern_comp_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError>;
}
