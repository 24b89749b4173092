//! Inverse wavelet stage: pulls dequantized code-blocks and synthesizes whole tile-components.
//!
//! The reconstructed tile-component is kept per component until the tile changes, so that
//! repeated pulls at the same resolution level do not redo the synthesis.

use log::{debug, trace};

use crate::error::ReconError;
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock};
use crate::jpeg2000::dwt::{Dwt53, Dwt97, LiftingFilter, synthesize_tree};
use crate::jpeg2000::source::{CoefficientSource, ImageSource, TiledSource};
use crate::jpeg2000::specs::{DecoderSpecs, WaveletFilter};
use crate::jpeg2000::subband::Subband;
use crate::jpeg2000::tiling::{ImageGeometry, TileContext};

/// Ties a lifting filter to its variant of [`SampleBlock`].
trait SynthesisSamples: LiftingFilter {
    fn view(blk: &SampleBlock) -> Option<&DataBlock<Self::Sample>>;

    fn wrap(blk: DataBlock<Self::Sample>) -> SampleBlock;
}

impl SynthesisSamples for Dwt53 {
    fn view(blk: &SampleBlock) -> Option<&DataBlock<i32>> {
        blk.as_int()
    }

    fn wrap(blk: DataBlock<i32>) -> SampleBlock {
        SampleBlock::Int(blk)
    }
}

impl SynthesisSamples for Dwt97 {
    fn view(blk: &SampleBlock) -> Option<&DataBlock<f32>> {
        blk.as_float()
    }

    fn wrap(blk: DataBlock<f32>) -> SampleBlock {
        SampleBlock::Float(blk)
    }
}

struct Reconstructed {
    rl: u8,
    block: SampleBlock,
}

pub struct InverseWavelet<S> {
    src: S,
    filters: Vec<WaveletFilter>,
    cache: Vec<Option<Reconstructed>>,
    tmp_int: Vec<i32>,
    tmp_float: Vec<f32>,
}

impl<S: CoefficientSource> InverseWavelet<S> {
    pub fn new(src: S) -> Self {
        let mut stage = Self {
            src,
            filters: Vec::new(),
            cache: Vec::new(),
            tmp_int: Vec::new(),
            tmp_float: Vec::new(),
        };
        stage.tile_changed();
        stage
    }

    fn tile_changed(&mut self) {
        let tile = self.src.tile();
        let specs = self.src.specs();
        self.filters = (0..self.src.num_components())
            .map(|c| *specs.filter.get(tile.index, c))
            .collect();
        self.cache = (0..self.filters.len()).map(|_| None).collect();
        debug!("inverse wavelet at tile {}: filters {:?}", tile.index, self.filters);
    }

    /// Synthesis filter of component `c` in the current tile.
    pub fn filter(&self, c: usize) -> Result<WaveletFilter, ReconError> {
        self.filters
            .get(c)
            .copied()
            .ok_or(ReconError::ComponentOutOfRange(c))
    }

    fn check_request(&self, c: usize, rl: u8, kind: DataKind) -> Result<(), ReconError> {
        let natural = self.filter(c)?.data_kind();
        if kind != natural {
            return Err(ReconError::DataKindMismatch {
                requested: kind,
                actual: natural,
            });
        }
        let max = self.max_resolution_level(c)?;
        if rl > max {
            return Err(ReconError::ResolutionLevelUnavailable {
                requested: rl,
                available: max,
            });
        }
        Ok(())
    }

    fn reconstruct(&mut self, c: usize, rl: u8) -> Result<SampleBlock, ReconError> {
        let node = self
            .src
            .subband_tree(c)?
            .resolution(rl)
            .cloned()
            .ok_or(ReconError::ResolutionLevelUnavailable {
                requested: rl,
                available: self.max_resolution_level(c)?,
            })?;
        let rect = self.tile_comp_rect(c, rl)?;
        let reuse = self.cache.get_mut(c).and_then(Option::take).map(|r| r.block);

        match self.filter(c)? {
            WaveletFilter::Reversible5x3 => {
                let reuse = reuse.and_then(SampleBlock::into_int);
                let mut tmp = std::mem::take(&mut self.tmp_int);
                let out =
                    Self::synthesize::<Dwt53>(&mut self.src, c, &node, rect.x0, rect.y0, reuse, &mut tmp);
                self.tmp_int = tmp;
                out
            }
            WaveletFilter::Irreversible9x7 => {
                let reuse = reuse.and_then(SampleBlock::into_float);
                let mut tmp = std::mem::take(&mut self.tmp_float);
                let out =
                    Self::synthesize::<Dwt97>(&mut self.src, c, &node, rect.x0, rect.y0, reuse, &mut tmp);
                self.tmp_float = tmp;
                out
            }
        }
    }

    /// Gathers every code-block below `node` into its Mallat position, then runs the synthesis.
    fn synthesize<F: SynthesisSamples>(
        src: &mut S,
        c: usize,
        node: &Subband,
        x0: u32,
        y0: u32,
        reuse: Option<DataBlock<F::Sample>>,
        tmp: &mut Vec<F::Sample>,
    ) -> Result<SampleBlock, ReconError> {
        let (w, h) = (node.info.w as usize, node.info.h as usize);
        let mut out = DataBlock::reuse_or_new(reuse, x0 as usize, y0 as usize, w, h);
        let mut progressive = false;

        for sb in node.leaves() {
            trace!(
                "gather comp {} rl {} sb {}: {}x{} code-blocks",
                c, sb.res_level, sb.subband_idx, sb.num_cb_x, sb.num_cb_y
            );
            for m in 0..sb.num_cb_y {
                for n in 0..sb.num_cb_x {
                    let blk = src.get_intern_code_block(c, m, n, sb, F::FILTER.data_kind())?;
                    let blk = F::view(blk).ok_or(ReconError::FilterKindMismatch(blk.kind()))?;
                    progressive |= blk.progressive;
                    let x = sb.ulx as usize + blk.ulx;
                    for y in 0..blk.h {
                        let start = (sb.uly as usize + blk.uly + y) * w + x;
                        out.data[start..start + blk.w].copy_from_slice(blk.row(y));
                    }
                }
            }
        }

        synthesize_tree::<F>(&mut out.data, w, node, tmp);
        out.progressive = progressive;
        Ok(F::wrap(out))
    }
}

impl<S: CoefficientSource> TiledSource for InverseWavelet<S> {
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
        self.tile_changed();
        moved
    }

    fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        let moved = self.src.next_tile();
        self.tile_changed();
        moved
    }
}

impl<S: CoefficientSource> ImageSource for InverseWavelet<S> {
    fn max_resolution_level(&self, c: usize) -> Result<u8, ReconError> {
        Ok(self.src.subband_tree(c)?.info.res_level)
    }

    fn data_kind(&self, c: usize) -> Result<DataKind, ReconError> {
        Ok(self.filter(c)?.data_kind())
    }

    fn get_intern_comp_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
    ) -> Result<&SampleBlock, ReconError> {
        self.check_request(c, rl, kind)?;
        let cached = matches!(self.cache.get(c), Some(Some(r)) if r.rl == rl);
        if !cached {
            let block = self.reconstruct(c, rl)?;
            self.cache[c] = Some(Reconstructed { rl, block });
        }
        match &self.cache[c] {
            Some(r) => Ok(&r.block),
            None => Err(ReconError::ComponentOutOfRange(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::jpeg2000::code_block_store::CodeBlockStore;
    use crate::jpeg2000::dwt::analyze_tree;
    use crate::jpeg2000::image::J2kComponentInfo;
    use crate::jpeg2000::quantization::Dequantizer;
    use crate::jpeg2000::source::SubbandSource;
    use crate::jpeg2000::specs::{QuantizationParams, QuantizationType};
    use crate::jpeg2000::tiling::Rect;

    fn test_image(w: usize, h: usize) -> Vec<i32> {
        (0..w * h)
            .map(|i| ((i % w) * 9 + (i / w) * 5) as i32 % 61 - 30)
            .collect()
    }

    /// Store holding the forward 5-3 decomposition of `image` for a single tile.
    fn reversible_stage(
        x0: u32,
        y0: u32,
        w: u32,
        h: u32,
        levels: u8,
        image: &[i32],
    ) -> InverseWavelet<Dequantizer<CodeBlockStore>> {
        let mut geometry = ImageGeometry::single_tile(w, h, vec![J2kComponentInfo::new(8, true)]);
        geometry.x_origin = x0;
        geometry.y_origin = y0;
        geometry.tile_x_origin = x0;
        geometry.tile_y_origin = y0;
        let mut specs = DecoderSpecs::reversible(levels, 8);
        specs.code_block_size.set_default((2, 2));

        let tree = Subband::new(Rect::new(x0, y0, x0 + w, y0 + h), levels);
        let mut coefficients = image.to_vec();
        analyze_tree::<Dwt53>(&mut coefficients, w as usize, &tree, &mut Vec::new());

        let mut store = CodeBlockStore::new(geometry, Arc::new(specs)).unwrap();
        store.insert_tile_component(0, 0, &coefficients, false).unwrap();
        InverseWavelet::new(Dequantizer::new(store).unwrap())
    }

    #[test]
    fn test_full_resolution_matches_input() {
        for (x0, y0, w, h, levels) in [(0, 0, 16, 16, 2), (3, 5, 13, 11, 3), (1, 0, 9, 1, 2)] {
            let image = test_image(w as usize, h as usize);
            let mut stage = reversible_stage(x0, y0, w, h, levels, &image);
            assert_eq!(stage.max_resolution_level(0).unwrap(), levels);
            let blk = stage.get_intern_comp_data(0, levels, DataKind::Int).unwrap();
            let blk = blk.as_int().unwrap();
            assert_eq!((blk.ulx, blk.uly), (x0 as usize, y0 as usize));
            assert_eq!((blk.w, blk.h), (w as usize, h as usize));
            assert_eq!(blk.data, image, "{}x{} at ({}, {})", w, h, x0, y0);
        }
    }

    #[test]
    fn test_reduced_resolution_is_the_ll_band() {
        let image = test_image(16, 12);
        let tree = Subband::new(Rect::new(0, 0, 16, 12), 2);
        let mut coefficients = image.clone();
        analyze_tree::<Dwt53>(&mut coefficients, 16, &tree, &mut Vec::new());

        let mut stage = reversible_stage(0, 0, 16, 12, 2, &image);
        // resolution 1: LL1 is the 8x6 top-left corner after one analysis level
        let mut one_level = image.clone();
        crate::jpeg2000::dwt::analyze_2d::<Dwt53>(&mut one_level, 16, &tree.info, &mut Vec::new());
        let expected: Vec<i32> = (0..6).flat_map(|y| one_level[y * 16..y * 16 + 8].to_vec()).collect();

        assert_eq!(stage.tile_comp_rect(0, 1).unwrap(), Rect::new(0, 0, 8, 6));
        let blk = stage.get_comp_data(0, 1, DataKind::Int, None).unwrap();
        assert_eq!(blk.as_int().unwrap().data, expected);

        let blk = stage.get_comp_data(0, 0, DataKind::Int, None).unwrap();
        let expected: Vec<i32> = (0..3).flat_map(|y| coefficients[y * 16..y * 16 + 4].to_vec()).collect();
        assert_eq!(blk.as_int().unwrap().data, expected);

        assert_eq!(
            stage.get_intern_comp_data(0, 3, DataKind::Int).err(),
            Some(ReconError::ResolutionLevelUnavailable {
                requested: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_kind_must_match_filter() {
        let image = test_image(4, 4);
        let mut stage = reversible_stage(0, 0, 4, 4, 1, &image);
        assert_eq!(stage.data_kind(0).unwrap(), DataKind::Int);
        assert_eq!(
            stage.get_intern_comp_data(0, 1, DataKind::Float).err(),
            Some(ReconError::DataKindMismatch {
                requested: DataKind::Float,
                actual: DataKind::Int
            })
        );
        assert!(stage.get_intern_comp_data(1, 1, DataKind::Int).is_err());
    }

    #[test]
    fn test_irreversible_dc_only() {
        // unit LL step so that a single LL coefficient of 16 reconstructs a flat 16
        let geometry = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, true)]);
        let mut specs = DecoderSpecs::new(
            WaveletFilter::Irreversible9x7,
            QuantizationType::Derived,
            QuantizationParams::derived(8, 1.0 / 256.0),
            1,
        );
        specs.guard_bits.set_default(2);
        let mut store = CodeBlockStore::new(geometry, Arc::new(specs)).unwrap();
        let tree = store.subband_tree(0).unwrap().clone();
        let ll = tree.subband_by_idx(0, 0).unwrap().info;
        let mut coefficients = vec![0; 64];
        for y in 0..ll.h as usize {
            for x in 0..ll.w as usize {
                coefficients[y * 8 + x] = 16;
            }
        }
        store.insert_tile_component(0, 0, &coefficients, true).unwrap();
        let mut stage = InverseWavelet::new(Dequantizer::new(store).unwrap());
        let blk = stage.get_intern_comp_data(0, 1, DataKind::Float).unwrap();
        assert!(blk.progressive());
        let f = blk.as_float().unwrap();
        for v in &f.data {
            assert!((v - 16.0).abs() < 1e-3, "got {}", v);
        }
    }
}
