// Sign-magnitude code-block samples as delivered by the entropy decoder: bit 31 is the sign,
// the magnitude is aligned so that its most significant bit sits at bit 30.
pub const SIGN_BIT: i32 = i32::MIN;
pub const MAGNITUDE_MASK: i32 = 0x7FFF_FFFF;

// Number of bits available to the magnitude below the sign bit.
pub const MAXIMUM_MAGNITUDE_BITS: u8 = 31;

// ISO/IEC 15444-1, Table A.11: code-block width and height exponents are in 2..=10 and their sum
// may not exceed 12.
pub const MINIMUM_CODE_BLOCK_EXPONENT: u8 = 2;
pub const MAXIMUM_CODE_BLOCK_EXPONENT: u8 = 10;
pub const MAXIMUM_CODE_BLOCK_EXPONENT_SUM: u8 = 12;

// ISO/IEC 15444-1, Table A.15: at most 32 decomposition levels.
pub const MAXIMUM_DECOMPOSITION_LEVELS: u8 = 32;

pub const MAXIMUM_COMPONENT_DEPTH: u8 = 30; // Implementation limit for i32 samples (ISO/IEC 15444-1 allows 38)

// Number of components processed by the inverse multiple component transforms (Annex G).
pub const TRANSFORM_COMPONENT_COUNT: usize = 3;

// Inverse irreversible component transform, ISO/IEC 15444-1, Equation G-6.
pub const ICT_CR_TO_R: f32 = 1.402;
pub const ICT_CB_TO_G: f32 = -0.34413;
pub const ICT_CR_TO_G: f32 = -0.71414;
pub const ICT_CB_TO_B: f32 = 1.772;

// Forward irreversible component transform, Equation G-5.
pub const ICT_FORWARD: [[f32; 3]; 3] = [
    [0.299, 0.587, 0.114],
    [-0.16875, -0.33126, 0.5],
    [0.5, -0.41869, -0.08131],
];

// sYCC to sRGB mapping applied by the colour space mapper (rows give R, G, B).
pub const SYCC_MATRIX: [[f32; 3]; 3] = [
    [1.0, 0.0, 1.402],
    [1.0, -0.34413, -0.71414],
    [1.0, 1.772, 0.0],
];
