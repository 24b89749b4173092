//! JPEG 2000 sample reconstruction (Part 1, ISO/IEC 15444-1)
//!
//! This module turns entropy decoded code-blocks into image samples.
//! It is divided into stages that pull from one another, each owning its upstream:
//!
//! - `code_block_store`: Sign-magnitude code-blocks as handed over by an entropy decoder.
//! - `roi`: ROI de-scaling (maximum shift method).
//! - `quantization`: Inverse quantization, reversible and scalar.
//! - `inverse_wavelet` / `dwt`: Wavelet synthesis (5-3 and 9-7 lifting).
//! - `component_transform`: Inverse RCT and ICT.
//! - `color`: Colour space mapping.
//! - `decoder`: The facade wiring the chain and assembling images.
//!
//! The header tables live in `specs`, the canvas and tile arithmetic in `tiling` and the
//! per tile-component subband trees in `subband`.

pub mod code_block_store;
pub mod color;
pub mod component_transform;
pub mod data_block;
pub mod decoder;
pub mod dwt;
pub mod image;
pub mod inverse_wavelet;
pub mod quantization;
pub mod roi;
pub mod source;
pub mod specs;
pub mod subband;
pub mod tiling;
