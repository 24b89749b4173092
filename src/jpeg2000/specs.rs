//! Read-only coding parameters, as decoded from the main and tile-part headers.
//!
//! Each parameter is a [`ModuleSpec`]: a main-header default that COD/COC/QCD/QCC/RGN markers can
//! override per component, per tile, or per tile-component.

use std::collections::HashMap;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::{
    MAXIMUM_CODE_BLOCK_EXPONENT, MAXIMUM_CODE_BLOCK_EXPONENT_SUM, MAXIMUM_DECOMPOSITION_LEVELS,
    MINIMUM_CODE_BLOCK_EXPONENT,
};
use crate::error::ReconError;
use crate::jpeg2000::data_block::DataKind;

/// A parameter value with tile, component and tile-component overrides.
///
/// Lookup priority is tile-component, tile, component, then the main default.
#[derive(Debug, Clone)]
pub struct ModuleSpec<T> {
    default: T,
    comp_defaults: HashMap<usize, T>,
    tile_defaults: HashMap<usize, T>,
    tile_comp: HashMap<(usize, usize), T>,
}

impl<T> ModuleSpec<T> {
    pub fn new(default: T) -> Self {
        Self {
            default,
            comp_defaults: HashMap::new(),
            tile_defaults: HashMap::new(),
            tile_comp: HashMap::new(),
        }
    }

    pub fn set_default(&mut self, value: T) {
        self.default = value;
    }

    pub fn set_comp_default(&mut self, c: usize, value: T) {
        self.comp_defaults.insert(c, value);
    }

    pub fn set_tile_default(&mut self, t: usize, value: T) {
        self.tile_defaults.insert(t, value);
    }

    pub fn set_tile_comp(&mut self, t: usize, c: usize, value: T) {
        self.tile_comp.insert((t, c), value);
    }

    pub fn get(&self, t: usize, c: usize) -> &T {
        self.tile_comp
            .get(&(t, c))
            .or_else(|| self.tile_defaults.get(&t))
            .or_else(|| self.comp_defaults.get(&c))
            .unwrap_or(&self.default)
    }

    /// Value for a tile-wide parameter, ignoring component overrides.
    pub fn get_tile(&self, t: usize) -> &T {
        self.tile_defaults.get(&t).unwrap_or(&self.default)
    }
}

/// Quantization style, the low five bits of Sqcd/Sqcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum QuantizationType {
    /// No quantization; only the bit-plane alignment is undone.
    Reversible = 0,
    /// Scalar quantization, one step for LL from which the others are derived.
    Derived = 1,
    /// Scalar quantization, an explicit step for every subband.
    Expounded = 2,
}

impl QuantizationType {
    pub fn is_reversible(self) -> bool {
        self == QuantizationType::Reversible
    }
}

/// Wavelet filter, the transformation byte of COD/COC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WaveletFilter {
    /// 9-7 irreversible filter, floating point.
    Irreversible9x7 = 0,
    /// 5-3 reversible filter, integer lifting.
    Reversible5x3 = 1,
}

impl WaveletFilter {
    pub fn is_reversible(self) -> bool {
        self == WaveletFilter::Reversible5x3
    }

    /// Sample representation produced by the filter's synthesis.
    pub fn data_kind(self) -> DataKind {
        match self {
            WaveletFilter::Reversible5x3 => DataKind::Int,
            WaveletFilter::Irreversible9x7 => DataKind::Float,
        }
    }
}

/// Exponent and normalized step size for every subband of a tile-component, indexed by
/// resolution level and subband index (0 at level 0, 1..=3 for HL, LH, HH above).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantizationParams {
    pub exponents: Vec<[u8; 4]>,
    /// Normalized step sizes. Empty for reversible quantization.
    pub steps: Vec<[f32; 4]>,
}

impl QuantizationParams {
    /// Decodes the SPqcd/SPqcc values of a QCD/QCC marker.
    ///
    /// Reversible values are 8-bit (exponent in bits 7..3); scalar values are 16-bit with a
    /// 5-bit exponent and an 11-bit mantissa. Subbands are listed LL first, then HL, LH, HH for
    /// each resolution level from 1 up.
    pub fn from_sqcd(
        style: QuantizationType,
        values: &[u16],
        levels: u8,
    ) -> Result<Self, ReconError> {
        let expected = match style {
            QuantizationType::Derived => 1,
            _ => 1 + 3 * levels as usize,
        };
        if values.len() < expected {
            return Err(ReconError::InvalidQuantization("too few SPqcd values"));
        }

        let rows = match style {
            QuantizationType::Derived => 1,
            _ => levels as usize + 1,
        };
        let mut params = QuantizationParams {
            exponents: vec![[0; 4]; rows],
            steps: Vec::new(),
        };
        if !style.is_reversible() {
            params.steps = vec![[0.0; 4]; rows];
        }

        for (i, &v) in values.iter().take(expected).enumerate() {
            let (rl, s) = if i == 0 { (0, 0) } else { ((i - 1) / 3 + 1, (i - 1) % 3 + 1) };
            if style.is_reversible() {
                if v > 0xFF {
                    return Err(ReconError::InvalidQuantization("reversible SPqcd wider than 8 bits"));
                }
                params.exponents[rl][s] = (v >> 3) as u8;
            } else {
                let exp = ((v >> 11) & 0x1F) as u8;
                let mantissa = f32::from(v & 0x7FF);
                params.exponents[rl][s] = exp;
                params.steps[rl][s] = (1.0 + mantissa / 2048.0) / (1u32 << exp) as f32;
            }
        }
        Ok(params)
    }

    /// Exponents for reversible coding of `range_bits` deep samples: the range bits plus the
    /// subband's analysis gain.
    pub fn reversible(levels: u8, range_bits: u8) -> Self {
        let mut exponents = vec![[range_bits; 4]; levels as usize + 1];
        for row in exponents.iter_mut().skip(1) {
            *row = [range_bits, range_bits + 1, range_bits + 1, range_bits + 2];
        }
        QuantizationParams {
            exponents,
            steps: Vec::new(),
        }
    }

    /// Single LL step for derived quantization.
    pub fn derived(exponent: u8, step: f32) -> Self {
        QuantizationParams {
            exponents: vec![[exponent, 0, 0, 0]],
            steps: vec![[step, 0.0, 0.0, 0.0]],
        }
    }

    pub fn exponent(&self, res_level: u8, subband: u32) -> Result<u8, ReconError> {
        self.exponents
            .get(res_level as usize)
            .and_then(|row| row.get(subband as usize))
            .copied()
            .ok_or(ReconError::MissingQuantizationStep {
                res_level,
                subband,
            })
    }

    pub fn step(&self, res_level: u8, subband: u32) -> Result<f32, ReconError> {
        self.steps
            .get(res_level as usize)
            .and_then(|row| row.get(subband as usize))
            .copied()
            .ok_or(ReconError::MissingQuantizationStep {
                res_level,
                subband,
            })
    }
}

/// Coding parameters of the whole codestream.
#[derive(Debug, Clone)]
pub struct DecoderSpecs {
    pub quant_type: ModuleSpec<QuantizationType>,
    pub quant_params: ModuleSpec<QuantizationParams>,
    pub guard_bits: ModuleSpec<u8>,
    /// ROI maximum shift (RGN marker), `None` where no ROI was coded.
    pub roi_shift: ModuleSpec<Option<u8>>,
    pub filter: ModuleSpec<WaveletFilter>,
    pub decomposition_levels: ModuleSpec<u8>,
    /// Nominal code-block width and height exponents.
    pub code_block_size: ModuleSpec<(u8, u8)>,
    /// Multiple component transform flag of COD; a tile-wide parameter.
    pub component_transform: ModuleSpec<bool>,
}

impl DecoderSpecs {
    /// Reversible 5-3 coding of `range_bits` deep components.
    pub fn reversible(levels: u8, range_bits: u8) -> Self {
        Self::new(
            WaveletFilter::Reversible5x3,
            QuantizationType::Reversible,
            QuantizationParams::reversible(levels, range_bits),
            levels,
        )
    }

    pub fn new(
        filter: WaveletFilter,
        quant_type: QuantizationType,
        quant_params: QuantizationParams,
        levels: u8,
    ) -> Self {
        Self {
            quant_type: ModuleSpec::new(quant_type),
            quant_params: ModuleSpec::new(quant_params),
            guard_bits: ModuleSpec::new(2),
            roi_shift: ModuleSpec::new(None),
            filter: ModuleSpec::new(filter),
            decomposition_levels: ModuleSpec::new(levels),
            code_block_size: ModuleSpec::new((6, 6)),
            component_transform: ModuleSpec::new(false),
        }
    }

    /// Checks the parameters that apply to one tile-component.
    pub fn validate_tile_component(&self, t: usize, c: usize) -> Result<(), ReconError> {
        let levels = *self.decomposition_levels.get(t, c);
        if levels > MAXIMUM_DECOMPOSITION_LEVELS {
            return Err(ReconError::InvalidGeometry("too many decomposition levels"));
        }

        let (xcb, ycb) = *self.code_block_size.get(t, c);
        if !(MINIMUM_CODE_BLOCK_EXPONENT..=MAXIMUM_CODE_BLOCK_EXPONENT).contains(&xcb)
            || !(MINIMUM_CODE_BLOCK_EXPONENT..=MAXIMUM_CODE_BLOCK_EXPONENT).contains(&ycb)
            || xcb + ycb > MAXIMUM_CODE_BLOCK_EXPONENT_SUM
        {
            return Err(ReconError::InvalidCodeBlockSize(xcb, ycb));
        }

        let qt = *self.quant_type.get(t, c);
        if qt.is_reversible() && !self.filter.get(t, c).is_reversible() {
            return Err(ReconError::ReversibleQuantizationWithIrreversibleFilter {
                tile: t,
                component: c,
            });
        }

        let params = self.quant_params.get(t, c);
        match qt {
            QuantizationType::Derived => {
                params.step(0, 0)?;
            }
            QuantizationType::Reversible | QuantizationType::Expounded => {
                let rows = if qt.is_reversible() {
                    params.exponents.len()
                } else {
                    params.exponents.len().min(params.steps.len())
                };
                if rows <= levels as usize {
                    return Err(ReconError::MissingQuantizationStep {
                        res_level: rows as u8,
                        subband: if rows == 0 { 0 } else { 1 },
                    });
                }
            }
        }
        Ok(())
    }
}
