pub mod constants;
pub mod error;
pub mod jpeg2000;

pub use error::ReconError;
pub use jpeg2000::code_block_store::{CodeBlockKey, CodeBlockStore};
pub use jpeg2000::color::ColorMapping;
pub use jpeg2000::data_block::{DataBlock, DataKind, SampleBlock};
pub use jpeg2000::decoder::{J2kReconstructor, ReconstructionOptions};
pub use jpeg2000::image::{ComponentPlane, J2kComponentInfo, ReconstructedImage};
pub use jpeg2000::specs::{DecoderSpecs, QuantizationParams, QuantizationType, WaveletFilter};
pub use jpeg2000::tiling::{ImageGeometry, Rect, TileContext};
