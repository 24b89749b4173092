use thiserror::Error;

use crate::jpeg2000::data_block::DataKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    // Configuration errors, raised at construction or tile change
    #[error("Wavelet and component transformation not coherent in tile {tile}")]
    IncoherentComponentTransform { tile: usize },
    #[error("Component transformation needs 3 components, image has {0}")]
    ComponentTransformNeedsThreeComponents(usize),
    #[error("Unsupported component count {0} (expected 1 or 3)")]
    UnsupportedComponentCount(usize),
    #[error("Invalid image geometry: {0}")]
    InvalidGeometry(&'static str),
    #[error("Reversible quantization used with an irreversible filter in tile {tile}, component {component}")]
    ReversibleQuantizationWithIrreversibleFilter { tile: usize, component: usize },
    #[error("Missing quantization step for resolution level {res_level}, subband {subband}")]
    MissingQuantizationStep { res_level: u8, subband: u32 },
    #[error("Invalid quantization parameters: {0}")]
    InvalidQuantization(&'static str),
    #[error("Magnitude bit count {0} out of range")]
    InvalidMagnitudeBits(i32),
    #[error("Invalid code-block size exponents {0}x{1}")]
    InvalidCodeBlockSize(u8, u8),
    #[error("Component {component} needs {dx}x{dy} upsampling, only 1:1 and 2:1 are supported")]
    UnsupportedResampling { component: usize, dx: u8, dy: u8 },

    // Tile navigation
    #[error("Tile ({x}, {y}) out of range")]
    TileOutOfRange { x: u32, y: u32 },
    #[error("No more tiles")]
    NoMoreTiles,

    // Data contract violations, rejected before any mutation
    #[error("Requested {requested:?} samples, data is {actual:?}")]
    DataKindMismatch { requested: DataKind, actual: DataKind },
    #[error("Wavelet filter does not match the {0:?} sample path")]
    FilterKindMismatch(DataKind),
    #[error("Component index {0} out of range")]
    ComponentOutOfRange(usize),
    #[error("Resolution level {requested} not available (maximum {available})")]
    ResolutionLevelUnavailable { requested: u8, available: u8 },
    #[error("Subband index {subband} not found at resolution level {res_level}")]
    SubbandNotFound { res_level: u8, subband: u32 },
    #[error("Code-block ({m}, {n}) out of range")]
    CodeBlockOutOfRange { m: usize, n: usize },
    #[error("Expected {expected} coefficients, got {actual}")]
    CoefficientCountMismatch { expected: usize, actual: usize },
    #[error("Components of a 3-component transform differ in size")]
    ComponentSizeMismatch,
}

impl ReconError {
    /// True for errors that abort the decode of the affected tile because the
    /// header tables are inconsistent, as opposed to bad requests.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ReconError::IncoherentComponentTransform { .. }
                | ReconError::ComponentTransformNeedsThreeComponents(_)
                | ReconError::UnsupportedComponentCount(_)
                | ReconError::InvalidGeometry(_)
                | ReconError::ReversibleQuantizationWithIrreversibleFilter { .. }
                | ReconError::MissingQuantizationStep { .. }
                | ReconError::InvalidQuantization(_)
                | ReconError::InvalidMagnitudeBits(_)
                | ReconError::InvalidCodeBlockSize(_, _)
                | ReconError::UnsupportedResampling { .. }
        )
    }
}
