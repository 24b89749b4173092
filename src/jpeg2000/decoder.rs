//! JPEG 2000 reconstruction facade.
//!
//! `J2kReconstructor` wires the sample reconstruction chain on top of an entropy decoder output:
//! ROI de-scaling, dequantization, inverse wavelet, inverse component transform and colour
//! space mapping. It hands out tile-components in the representation the caller asks for, with
//! the DC level shift applied, and can assemble whole images tile by tile.

use log::{debug, info};

use crate::error::ReconError;
use crate::jpeg2000::color::{ColorMapping, ColorSpaceMapper};
use crate::jpeg2000::component_transform::{ComponentTransform, InverseComponentTransform};
use crate::jpeg2000::data_block::{DataBlock, DataKind, SampleBlock, convert_block};
use crate::jpeg2000::image::{ComponentPlane, ReconstructedImage};
use crate::jpeg2000::inverse_wavelet::InverseWavelet;
use crate::jpeg2000::quantization::Dequantizer;
use crate::jpeg2000::roi::RoiDeScaler;
use crate::jpeg2000::source::{ImageSource, QuantizedSource, TiledSource};
use crate::jpeg2000::tiling::{ImageGeometry, Rect, TileContext};

/// Run-time decoding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructionOptions {
    /// Resolution level to reconstruct, 0 being the lowest. `None` reconstructs at full
    /// resolution.
    pub resolution_level: Option<u8>,
    /// Undo the ROI maximum shift. When false ROI coefficients are decoded as coded.
    pub roi_descaling: bool,
    /// Apply the inverse RCT or ICT signalled for each tile.
    pub component_transform: bool,
    pub color_mapping: ColorMapping,
    /// Add `2^(depth - 1)` to the samples of unsigned components.
    pub level_shift: bool,
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            resolution_level: None,
            roi_descaling: true,
            component_transform: true,
            color_mapping: ColorMapping::None,
            level_shift: true,
        }
    }
}

type Chain<S> =
    ColorSpaceMapper<InverseComponentTransform<InverseWavelet<Dequantizer<RoiDeScaler<S>>>>>;

pub struct J2kReconstructor<S: QuantizedSource> {
    chain: Chain<S>,
    options: ReconstructionOptions,
}

impl<S: QuantizedSource> J2kReconstructor<S> {
    /// Builds the chain over `src`, positioned on its current tile.
    ///
    /// Configuration errors of that tile (incoherent component transform, unsupported
    /// component count for the colour mapping) are reported here.
    pub fn new(src: S, options: ReconstructionOptions) -> Result<Self, ReconError> {
        let roi = RoiDeScaler::new(src, options.roi_descaling);
        let dequantizer = Dequantizer::new(roi)?;
        let wavelet = InverseWavelet::new(dequantizer);
        let transform = InverseComponentTransform::new(wavelet, options.component_transform)?;
        let chain = ColorSpaceMapper::new(transform, options.color_mapping)?;
        debug!("reconstruction chain ready: {:?}", options);
        Ok(Self { chain, options })
    }

    pub fn options(&self) -> &ReconstructionOptions {
        &self.options
    }

    pub fn geometry(&self) -> &ImageGeometry {
        self.chain.geometry()
    }

    pub fn num_components(&self) -> usize {
        self.chain.num_components()
    }

    pub fn num_tiles(&self) -> (u32, u32) {
        self.chain.num_tiles()
    }

    pub fn tile(&self) -> TileContext {
        self.chain.tile()
    }

    pub fn set_tile(&mut self, x: u32, y: u32) -> Result<TileContext, ReconError> {
        self.chain.set_tile(x, y)
    }

    pub fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        self.chain.next_tile()
    }

    /// Number of bits of the nominal range of component `c`.
    pub fn bits_for_nominal_range(&self, c: usize) -> Result<u8, ReconError> {
        self.chain.nominal_range_bits(c)
    }

    /// Natural representation of component `c` in the current tile.
    pub fn data_kind(&self, c: usize) -> Result<DataKind, ReconError> {
        self.chain.data_kind(c)
    }

    pub fn max_resolution_level(&self, c: usize) -> Result<u8, ReconError> {
        self.chain.max_resolution_level(c)
    }

    /// Resolution level reconstructed for component `c` in the current tile.
    pub fn resolution_level(&self, c: usize) -> Result<u8, ReconError> {
        let max = self.chain.max_resolution_level(c)?;
        match self.options.resolution_level {
            None => Ok(max),
            Some(rl) if rl <= max => Ok(rl),
            Some(rl) => Err(ReconError::ResolutionLevelUnavailable {
                requested: rl,
                available: max,
            }),
        }
    }

    pub fn tile_comp_rect(&self, c: usize, rl: u8) -> Result<Rect, ReconError> {
        self.chain.tile_comp_rect(c, rl)
    }

    /// Reconstructed samples of component `c` of the current tile at resolution level `rl`,
    /// in the `kind` representation and level shifted when the options ask for it.
    pub fn get_data(
        &mut self,
        c: usize,
        rl: u8,
        kind: DataKind,
    ) -> Result<SampleBlock, ReconError> {
        let natural = self.chain.data_kind(c)?;
        let blk = self.chain.get_comp_data(c, rl, natural, None)?;
        let mut blk = if kind == natural {
            blk
        } else {
            convert_block(&blk, kind)
        };
        if let Some(shift) = self.level_shift(c)? {
            match &mut blk {
                SampleBlock::Int(b) => b.data.iter_mut().for_each(|v| *v += shift),
                SampleBlock::Float(b) => b.data.iter_mut().for_each(|v| *v += shift as f32),
            }
        }
        Ok(blk)
    }

    /// DC offset added to component `c`, if any.
    fn level_shift(&self, c: usize) -> Result<Option<i32>, ReconError> {
        let comp = self
            .geometry()
            .components
            .get(c)
            .ok_or(ReconError::ComponentOutOfRange(c))?;
        if !self.options.level_shift || comp.is_signed {
            return Ok(None);
        }
        let depth = self.bits_for_nominal_range(c)?;
        Ok(Some(1i32 << (depth - 1)))
    }

    /// Inverse component transform applied in the current tile.
    pub fn component_transform(&self) -> ComponentTransform {
        self.chain.source().transform()
    }

    /// Reconstructs every tile in row-major order and assembles one plane per component.
    ///
    /// With a reduced resolution, all tiles of a component must have the same number of
    /// decomposition levels.
    pub fn decode_image(&mut self, kind: DataKind) -> Result<ReconstructedImage, ReconError> {
        let geometry = self.geometry().clone();
        let nc = geometry.num_components();
        let (ntx, nty) = geometry.num_tiles();
        info!(
            "reconstructing {}x{} image, {} components, {}x{} tiles",
            geometry.width, geometry.height, nc, ntx, nty
        );

        let mut planes: Vec<Option<(u8, ComponentPlane)>> = vec![None; nc];
        for ty in 0..nty {
            for tx in 0..ntx {
                self.set_tile(tx, ty)?;
                for (c, slot) in planes.iter_mut().enumerate() {
                    let rl = self.resolution_level(c)?;
                    let reduction = self.max_resolution_level(c)? - rl;
                    if slot.is_none() {
                        *slot = Some((reduction, self.new_plane(c, reduction, kind)?));
                    }
                    let Some((expected, plane)) = slot.as_mut() else {
                        continue;
                    };
                    if *expected != reduction {
                        return Err(ReconError::InvalidGeometry(
                            "decomposition levels differ between tiles at reduced resolution",
                        ));
                    }
                    let rect = self.tile_comp_rect(c, rl)?;
                    let blk = self.get_data(c, rl, kind)?;
                    let (x, y) = ((rect.x0 - plane.x0) as usize, (rect.y0 - plane.y0) as usize);
                    match (&mut plane.samples, &blk) {
                        (SampleBlock::Int(dst), SampleBlock::Int(src)) => paste(dst, src, x, y),
                        (SampleBlock::Float(dst), SampleBlock::Float(src)) => paste(dst, src, x, y),
                        (dst, src) => {
                            return Err(ReconError::DataKindMismatch {
                                requested: dst.kind(),
                                actual: src.kind(),
                            });
                        }
                    }
                }
            }
        }

        let reduction = planes.first().and_then(|p| p.as_ref()).map_or(0, |(r, _)| *r);
        let area = geometry.image_rect().reduced(reduction);
        Ok(ReconstructedImage {
            width: area.width(),
            height: area.height(),
            kind,
            planes: planes.into_iter().flatten().map(|(_, plane)| plane).collect(),
        })
    }

    fn new_plane(
        &self,
        c: usize,
        reduction: u8,
        kind: DataKind,
    ) -> Result<ComponentPlane, ReconError> {
        let (dx, dy) = self.chain.comp_subsampling(c)?;
        let rect = self.geometry().image_rect().subsampled(dx, dy).reduced(reduction);
        let comp = self.geometry().components[c];
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        Ok(ComponentPlane {
            x0: rect.x0,
            y0: rect.y0,
            width: rect.width(),
            height: rect.height(),
            depth: self.bits_for_nominal_range(c)?,
            centered: comp.is_signed || !self.options.level_shift,
            samples: SampleBlock::reuse_or_new(kind, None, rect.x0 as usize, rect.y0 as usize, w, h),
        })
    }
}

/// Copies `src` into `dst` with its upper-left corner at `(x, y)` of `dst`.
fn paste<T: Copy + Default>(dst: &mut DataBlock<T>, src: &DataBlock<T>, x: usize, y: usize) {
    for row in 0..src.h {
        let start = dst.index(x, y + row);
        dst.data[start..start + src.w].copy_from_slice(src.row(row));
    }
}
