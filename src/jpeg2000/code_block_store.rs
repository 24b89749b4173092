//! In-memory entropy decoder output.
//!
//! Holds the sign-magnitude code-blocks handed over by an entropy decoder and serves them to the
//! reconstruction chain. Code-blocks that were never inserted read as all-zero, which is what a
//! decoder produces when no coding pass was received.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::error::ReconError;
use crate::jpeg2000::data_block::DataBlock;
use crate::jpeg2000::quantization::to_sign_magnitude;
use crate::jpeg2000::source::{QuantizedSource, SubbandSource, TiledSource};
use crate::jpeg2000::specs::DecoderSpecs;
use crate::jpeg2000::subband::{Subband, SubbandInfo, synthesis_tree};
use crate::jpeg2000::tiling::{ImageGeometry, TileContext, TileCursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeBlockKey {
    pub tile: usize,
    pub component: usize,
    pub res_level: u8,
    pub subband_idx: u32,
    /// Code-block row.
    pub m: u32,
    /// Code-block column.
    pub n: u32,
}

#[derive(Debug, Clone)]
struct StoredBlock {
    data: Vec<i32>,
    progressive: bool,
}

#[derive(Debug)]
pub struct CodeBlockStore {
    geometry: ImageGeometry,
    specs: Arc<DecoderSpecs>,
    cursor: TileCursor,
    trees: Vec<Subband>,
    /// Set when the current tile's synthesis trees could not be built.
    tile_error: Option<ReconError>,
    blocks: HashMap<CodeBlockKey, StoredBlock>,
    intern: DataBlock<i32>,
}

impl CodeBlockStore {
    pub fn new(geometry: ImageGeometry, specs: Arc<DecoderSpecs>) -> Result<Self, ReconError> {
        geometry.validate()?;
        let cursor = TileCursor::new(&geometry);
        let mut store = Self {
            geometry,
            specs,
            cursor,
            trees: Vec::new(),
            tile_error: None,
            blocks: HashMap::new(),
            intern: DataBlock::default(),
        };
        store.build_trees()?;
        Ok(store)
    }

    fn build_trees(&mut self) -> Result<(), ReconError> {
        let tile = self.cursor.tile();
        let built = (0..self.geometry.num_components())
            .map(|c| synthesis_tree(&self.geometry, &self.specs, tile, c))
            .collect::<Result<Vec<_>, _>>();
        match built {
            Ok(trees) => {
                self.trees = trees;
                self.tile_error = None;
                debug!(
                    "code-block store at tile {} ({}, {})",
                    tile.index, tile.x, tile.y
                );
                Ok(())
            }
            Err(e) => {
                self.trees.clear();
                self.tile_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn check_tile(&self) -> Result<(), ReconError> {
        match &self.tile_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn tile_context(&self, index: usize) -> Result<TileContext, ReconError> {
        let (ntx, nty) = self.geometry.num_tiles();
        let (x, y) = ((index % ntx as usize) as u32, (index / ntx as usize) as u32);
        if y >= nty {
            return Err(ReconError::TileOutOfRange { x, y });
        }
        Ok(TileContext { index, x, y })
    }

    /// Stores the decoded samples of one code-block, in raster order.
    pub fn insert(
        &mut self,
        key: CodeBlockKey,
        data: Vec<i32>,
        progressive: bool,
    ) -> Result<(), ReconError> {
        let tile = self.tile_context(key.tile)?;
        if key.component >= self.geometry.num_components() {
            return Err(ReconError::ComponentOutOfRange(key.component));
        }
        let tree = synthesis_tree(&self.geometry, &self.specs, tile, key.component)?;
        let sb = tree
            .subband_by_idx(key.res_level, key.subband_idx)
            .filter(|sb| sb.is_leaf())
            .ok_or(ReconError::SubbandNotFound {
                res_level: key.res_level,
                subband: key.subband_idx,
            })?;
        let rect = sb.info.code_block_rect(key.m, key.n)?;
        let expected = rect.width() as usize * rect.height() as usize;
        if data.len() != expected {
            return Err(ReconError::CoefficientCountMismatch {
                expected,
                actual: data.len(),
            });
        }
        self.blocks.insert(key, StoredBlock { data, progressive });
        Ok(())
    }

    /// Splits a whole tile-component of integer coefficients, laid out like the synthesis buffer
    /// (LL top-left, then HL, LH and HH of each level), into sign-magnitude code-blocks.
    pub fn insert_tile_component(
        &mut self,
        tile: usize,
        c: usize,
        coefficients: &[i32],
        progressive: bool,
    ) -> Result<(), ReconError> {
        let context = self.tile_context(tile)?;
        if c >= self.geometry.num_components() {
            return Err(ReconError::ComponentOutOfRange(c));
        }
        let tree = synthesis_tree(&self.geometry, &self.specs, context, c)?;
        let scanw = tree.info.w as usize;
        let expected = scanw * tree.info.h as usize;
        if coefficients.len() != expected {
            return Err(ReconError::CoefficientCountMismatch {
                expected,
                actual: coefficients.len(),
            });
        }
        for sb in tree.leaves() {
            for m in 0..sb.num_cb_y {
                for n in 0..sb.num_cb_x {
                    let rect = sb.code_block_rect(m, n)?;
                    let mut data = Vec::with_capacity((rect.width() * rect.height()) as usize);
                    for y in rect.y0..rect.y1 {
                        let start = (sb.uly + y) as usize * scanw + (sb.ulx + rect.x0) as usize;
                        let row = &coefficients[start..start + rect.width() as usize];
                        data.extend(row.iter().map(|&v| to_sign_magnitude(v, sb.magbits)));
                    }
                    let key = CodeBlockKey {
                        tile,
                        component: c,
                        res_level: sb.res_level,
                        subband_idx: sb.subband_idx,
                        m,
                        n,
                    };
                    self.blocks.insert(key, StoredBlock { data, progressive });
                }
            }
        }
        debug!(
            "stored tile {} comp {}: {} subbands",
            tile,
            c,
            tree.leaves().len()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn key(&self, c: usize, m: u32, n: u32, sb: &SubbandInfo) -> CodeBlockKey {
        CodeBlockKey {
            tile: self.cursor.tile().index,
            component: c,
            res_level: sb.res_level,
            subband_idx: sb.subband_idx,
            m,
            n,
        }
    }

    fn fill(&self, c: usize, m: u32, n: u32, sb: &SubbandInfo, blk: &mut DataBlock<i32>) -> Result<(), ReconError> {
        self.check_tile()?;
        if c >= self.geometry.num_components() {
            return Err(ReconError::ComponentOutOfRange(c));
        }
        let rect = sb.code_block_rect(m, n)?;
        blk.reshape(
            rect.x0 as usize,
            rect.y0 as usize,
            rect.width() as usize,
            rect.height() as usize,
        );
        let key = self.key(c, m, n, sb);
        if let Some(stored) = self.blocks.get(&key) {
            blk.data.copy_from_slice(&stored.data);
            blk.progressive = stored.progressive;
        }
        trace!(
            "code-block tile {} comp {} rl {} sb {} ({}, {}): {}x{}",
            key.tile, c, sb.res_level, sb.subband_idx, m, n, blk.w, blk.h
        );
        Ok(())
    }
}

impl TiledSource for CodeBlockStore {
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    fn specs(&self) -> &DecoderSpecs {
        &self.specs
    }

    fn tile(&self) -> TileContext {
        self.cursor.tile()
    }

    fn set_tile(&mut self, x: u32, y: u32) -> Result<TileContext, ReconError> {
        let tile = self.cursor.set_tile(x, y)?;
        self.build_trees()?;
        Ok(tile)
    }

    fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        let tile = self.cursor.next_tile()?;
        self.build_trees()?;
        Ok(tile)
    }
}

impl SubbandSource for CodeBlockStore {
    fn subband_tree(&self, c: usize) -> Result<&Subband, ReconError> {
        self.check_tile()?;
        self.trees.get(c).ok_or(ReconError::ComponentOutOfRange(c))
    }
}

impl QuantizedSource for CodeBlockStore {
    fn get_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
        reuse: Option<DataBlock<i32>>,
    ) -> Result<DataBlock<i32>, ReconError> {
        let mut blk = reuse.unwrap_or_default();
        self.fill(c, m, n, sb, &mut blk)?;
        Ok(blk)
    }

    fn get_intern_code_block(
        &mut self,
        c: usize,
        m: u32,
        n: u32,
        sb: &SubbandInfo,
    ) -> Result<&DataBlock<i32>, ReconError> {
        let mut blk = std::mem::take(&mut self.intern);
        let filled = self.fill(c, m, n, sb, &mut blk);
        self.intern = blk;
        filled?;
        Ok(&self.intern)
    }
}
