use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::ReconError;
use crate::jpeg2000::data_block::{DataKind, SampleBlock, round_to_int};

/// Metadata for a single component from the SIZ marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J2kComponentInfo {
    /// bit depth (e.g. 8, 12, 16)
    pub depth: u8,
    /// true if signed, false if unsigned
    pub is_signed: bool,
    /// Horizontal subsampling factor
    pub dx: u8,
    /// Vertical subsampling factor
    pub dy: u8,
}

impl J2kComponentInfo {
    /// Component without subsampling.
    pub fn new(depth: u8, is_signed: bool) -> Self {
        Self {
            depth,
            is_signed,
            dx: 1,
            dy: 1,
        }
    }

    pub fn with_subsampling(mut self, dx: u8, dy: u8) -> Self {
        self.dx = dx;
        self.dy = dy;
        self
    }
}

impl Default for J2kComponentInfo {
    fn default() -> Self {
        Self::new(8, false)
    }
}

/// Orientation of a wavelet subband. The discriminant is the subband's position among its
/// siblings, which is also the low two bits of its subband index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SubbandOrientation {
    /// Low-Low (base image)
    #[default]
    LL = 0,
    /// High-Low (horizontal details)
    HL = 1,
    /// Low-High (vertical details)
    LH = 2,
    /// High-High (diagonal details)
    HH = 3,
}

impl SubbandOrientation {
    /// Analysis gain exponent: log2 of the nominal gain of the analysis filters.
    pub fn gain_exponent(self) -> u8 {
        match self {
            SubbandOrientation::LL => 0,
            SubbandOrientation::HL | SubbandOrientation::LH => 1,
            SubbandOrientation::HH => 2,
        }
    }
}

/// One reconstructed component image.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlane {
    /// Component image origin on the component grid at the reconstructed resolution.
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    /// Nominal range bits of the samples.
    pub depth: u8,
    /// Samples are centred on zero (signed components, or no level shift applied).
    pub centered: bool,
    /// Dense row-major samples.
    pub samples: SampleBlock,
}

impl ComponentPlane {
    /// Sample at `(x, y)` mapped to an unsigned `depth`-bit integer, clipped to range.
    pub fn unsigned_sample(&self, x: usize, y: usize) -> u32 {
        let v = match &self.samples {
            SampleBlock::Int(b) => i64::from(b.get(x, y)),
            SampleBlock::Float(b) => i64::from(round_to_int(b.get(x, y))),
        };
        let depth = u32::from(self.depth);
        let v = if self.centered { v + (1i64 << (depth - 1)) } else { v };
        v.clamp(0, (1i64 << depth) - 1) as u32
    }
}

/// Whole image assembled from every tile of every component.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedImage {
    /// Width of the image area at the reconstructed resolution (reference grid).
    pub width: u32,
    /// Height of the image area at the reconstructed resolution.
    pub height: u32,
    pub kind: DataKind,
    pub planes: Vec<ComponentPlane>,
}

impl ReconstructedImage {
    pub fn component_count(&self) -> usize {
        self.planes.len()
    }

    /// Interleaves all planes into 8-bit samples, rescaling each component's nominal range.
    ///
    /// All planes must have the same dimensions.
    pub fn to_interleaved_u8(&self) -> Result<Vec<u8>, ReconError> {
        let first = self
            .planes
            .first()
            .ok_or(ReconError::UnsupportedComponentCount(0))?;
        let (w, h) = (first.width as usize, first.height as usize);
        if self
            .planes
            .iter()
            .any(|p| p.width as usize != w || p.height as usize != h)
        {
            return Err(ReconError::ComponentSizeMismatch);
        }

        let nc = self.planes.len();
        let mut out = vec![0u8; w * h * nc];
        for (c, plane) in self.planes.iter().enumerate() {
            let depth = u32::from(plane.depth);
            for y in 0..h {
                for x in 0..w {
                    let v = plane.unsigned_sample(x, y);
                    let v8 = if depth >= 8 { v >> (depth - 8) } else { v << (8 - depth) };
                    out[(y * w + x) * nc + c] = v8 as u8;
                }
            }
        }
        Ok(out)
    }
}
