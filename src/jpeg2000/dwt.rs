//! Discrete Wavelet Transforms for JPEG 2000 (ISO/IEC 15444-1, Annex F)
//!
//! One-dimensional lifting kernels work on strided signals so that the same code runs along
//! rows and columns. A signal of length `n` whose first sample sits at an even canvas position
//! has `(n + 1) / 2` low-pass and `n / 2` high-pass coefficients ("lpf" phase); one starting at
//! an odd position has `n / 2` low-pass and `(n + 1) / 2` high-pass coefficients ("hpf" phase).
//! Boundaries use whole-sample symmetric extension.

use log::trace;

use crate::jpeg2000::specs::WaveletFilter;
use crate::jpeg2000::subband::{Subband, SubbandInfo};

/// A lifting filter pair with its sample type.
pub trait LiftingFilter {
    type Sample: Copy + Default + std::fmt::Debug;

    const FILTER: WaveletFilter;

    /// Interleaves `low_len` low-pass and `high_len` high-pass coefficients into a signal whose
    /// first sample is low-pass.
    #[allow(clippy::too_many_arguments)]
    fn synthesize_lpf(
        low: &[Self::Sample],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[Self::Sample],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [Self::Sample],
        out_off: usize,
        out_step: usize,
    );

    /// Same as [`LiftingFilter::synthesize_lpf`] for a signal whose first sample is high-pass.
    #[allow(clippy::too_many_arguments)]
    fn synthesize_hpf(
        low: &[Self::Sample],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[Self::Sample],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [Self::Sample],
        out_off: usize,
        out_step: usize,
    );

    /// Splits a signal whose first sample is low-pass.
    #[allow(clippy::too_many_arguments)]
    fn analyze_lpf(
        input: &[Self::Sample],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [Self::Sample],
        low_off: usize,
        low_step: usize,
        high: &mut [Self::Sample],
        high_off: usize,
        high_step: usize,
    );

    /// Splits a signal whose first sample is high-pass.
    #[allow(clippy::too_many_arguments)]
    fn analyze_hpf(
        input: &[Self::Sample],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [Self::Sample],
        low_off: usize,
        low_step: usize,
        high: &mut [Self::Sample],
        high_off: usize,
        high_step: usize,
    );
}

/// 5-3 reversible filter, integer lifting.
pub struct Dwt53;

impl LiftingFilter for Dwt53 {
    type Sample = i32;

    const FILTER: WaveletFilter = WaveletFilter::Reversible5x3;

    fn synthesize_lpf(
        low: &[i32],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[i32],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [i32],
        out_off: usize,
        out_step: usize,
    ) {
        let n = low_len + high_len;
        if n == 0 {
            return;
        }
        let o = |i: usize| out_off + i * out_step;
        let l = |k: usize| low[low_off + k * low_step];
        let h = |k: usize| high[high_off + k * high_step];

        // Even samples: undo the update step
        out[o(0)] = if n > 1 { l(0) - ((h(0) + 1) >> 1) } else { l(0) };
        let mut i = 2;
        while i + 1 < n {
            let k = i / 2;
            out[o(i)] = l(k) - ((h(k - 1) + h(k) + 2) >> 2);
            i += 2;
        }
        if n % 2 == 1 && n > 2 {
            let k = i / 2;
            out[o(i)] = l(k) - ((2 * h(k - 1) + 2) >> 2);
        }

        // Odd samples: undo the prediction step
        let mut i = 1;
        while i + 1 < n {
            out[o(i)] = h(i / 2) + ((out[o(i - 1)] + out[o(i + 1)]) >> 1);
            i += 2;
        }
        if n % 2 == 0 && n > 1 {
            out[o(i)] = h(i / 2) + out[o(i - 1)];
        }
    }

    fn synthesize_hpf(
        low: &[i32],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[i32],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [i32],
        out_off: usize,
        out_step: usize,
    ) {
        let n = low_len + high_len;
        if n == 0 {
            return;
        }
        let o = |i: usize| out_off + i * out_step;
        let l = |k: usize| low[low_off + k * low_step];
        let h = |k: usize| high[high_off + k * high_step];

        // Odd samples are low-pass
        let mut i = 1;
        while i + 1 < n {
            let k = i / 2;
            out[o(i)] = l(k) - ((h(k) + h(k + 1) + 2) >> 2);
            i += 2;
        }
        if n > 1 && n % 2 == 0 {
            let k = i / 2;
            out[o(i)] = l(k) - ((2 * h(k) + 2) >> 2);
        }

        // Even samples are high-pass
        out[o(0)] = if n > 1 { h(0) + out[o(1)] } else { h(0) >> 1 };
        let mut i = 2;
        while i + 1 < n {
            out[o(i)] = h(i / 2) + ((out[o(i - 1)] + out[o(i + 1)]) >> 1);
            i += 2;
        }
        if n % 2 == 1 && n > 1 {
            out[o(i)] = h(i / 2) + out[o(i - 1)];
        }
    }

    fn analyze_lpf(
        input: &[i32],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [i32],
        low_off: usize,
        low_step: usize,
        high: &mut [i32],
        high_off: usize,
        high_step: usize,
    ) {
        let n = in_len;
        if n == 0 {
            return;
        }
        let x = |i: usize| input[in_off + i * in_step];
        let lo = |k: usize| low_off + k * low_step;
        let hi = |k: usize| high_off + k * high_step;

        // Prediction of the odd samples
        let mut i = 1;
        while i + 1 < n {
            high[hi(i / 2)] = x(i) - ((x(i - 1) + x(i + 1)) >> 1);
            i += 2;
        }
        if n % 2 == 0 {
            high[hi(i / 2)] = x(i) - ((2 * x(i - 1)) >> 1);
        }

        // Update of the even samples
        low[lo(0)] = if n > 1 { x(0) + ((high[hi(0)] + 1) >> 1) } else { x(0) };
        let mut i = 2;
        while i + 1 < n {
            let k = i / 2;
            low[lo(k)] = x(i) + ((high[hi(k - 1)] + high[hi(k)] + 2) >> 2);
            i += 2;
        }
        if n % 2 == 1 && n > 2 {
            let k = i / 2;
            low[lo(k)] = x(i) + ((2 * high[hi(k - 1)] + 2) >> 2);
        }
    }

    fn analyze_hpf(
        input: &[i32],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [i32],
        low_off: usize,
        low_step: usize,
        high: &mut [i32],
        high_off: usize,
        high_step: usize,
    ) {
        let n = in_len;
        if n == 0 {
            return;
        }
        let x = |i: usize| input[in_off + i * in_step];
        let lo = |k: usize| low_off + k * low_step;
        let hi = |k: usize| high_off + k * high_step;

        // Even samples are high-pass
        high[hi(0)] = if n > 1 { x(0) - x(1) } else { x(0) << 1 };
        let mut i = 2;
        while i + 1 < n {
            high[hi(i / 2)] = x(i) - ((x(i - 1) + x(i + 1)) >> 1);
            i += 2;
        }
        if n % 2 == 1 && n > 1 {
            high[hi(i / 2)] = x(i) - x(i - 1);
        }

        // Odd samples are low-pass
        let mut i = 1;
        while i + 1 < n {
            let k = i / 2;
            low[lo(k)] = x(i) + ((high[hi(k)] + high[hi(k + 1)] + 2) >> 2);
            i += 2;
        }
        if n > 1 && n % 2 == 0 {
            let k = i / 2;
            low[lo(k)] = x(i) + ((2 * high[hi(k)] + 2) >> 2);
        }
    }
}

/// 9-7 irreversible filter, floating point lifting.
pub struct Dwt97;

impl Dwt97 {
    pub const ALPHA: f32 = -1.586_134_342;
    pub const BETA: f32 = -0.052_980_118_54;
    pub const GAMMA: f32 = 0.882_911_076_2;
    pub const DELTA: f32 = 0.443_506_852_2;
    pub const KL: f32 = 0.812_893_065_5;
    pub const KH: f32 = 1.230_174_106;

    /// Synthesis low-pass impulse response (Table F.4).
    pub const SYNTHESIS_LOW_TAPS: [f32; 7] = [
        -0.091_271_763,
        -0.057_543_526,
        0.591_271_763,
        1.115_087_052,
        0.591_271_763,
        -0.057_543_526,
        -0.091_271_763,
    ];

    /// Synthesis high-pass impulse response (Table F.4).
    pub const SYNTHESIS_HIGH_TAPS: [f32; 9] = [
        0.026_748_757,
        0.016_864_118,
        -0.078_223_266,
        -0.266_864_118,
        0.602_949_018,
        -0.266_864_118,
        -0.078_223_266,
        0.016_864_118,
        0.026_748_757,
    ];

    /// Adds `coef` times the two neighbours to every sample of the given parity, in place on an
    /// interleaved signal of length `n`.
    fn lift(sig: &mut [f32], off: usize, step: usize, n: usize, parity: usize, coef: f32) {
        let at = |i: usize| off + i * step;
        let mut i = parity;
        while i < n {
            let left = if i > 0 { sig[at(i - 1)] } else { sig[at(i + 1)] };
            let right = if i + 1 < n { sig[at(i + 1)] } else { sig[at(i - 1)] };
            sig[at(i)] += coef * (left + right);
            i += 2;
        }
    }

    /// Inverse lifting on an interleaved signal whose low-pass samples have parity `low`.
    fn synthesize(sig: &mut [f32], off: usize, step: usize, n: usize, low: usize) {
        let high = 1 - low;
        Self::lift(sig, off, step, n, low, -Self::DELTA);
        Self::lift(sig, off, step, n, high, -Self::GAMMA);
        Self::lift(sig, off, step, n, low, -Self::BETA);
        Self::lift(sig, off, step, n, high, -Self::ALPHA);
    }

    fn analyze(sig: &mut [f32], n: usize, low: usize) {
        let high = 1 - low;
        Self::lift(sig, 0, 1, n, high, Self::ALPHA);
        Self::lift(sig, 0, 1, n, low, Self::BETA);
        Self::lift(sig, 0, 1, n, high, Self::GAMMA);
        Self::lift(sig, 0, 1, n, low, Self::DELTA);
    }

    #[allow(clippy::too_many_arguments)]
    fn interleave_and_synthesize(
        low: &[f32],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[f32],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [f32],
        out_off: usize,
        out_step: usize,
        low_parity: usize,
    ) {
        let n = low_len + high_len;
        if n == 0 {
            return;
        }
        if n == 1 {
            out[out_off] = if low_parity == 0 {
                low[low_off]
            } else {
                high[high_off] / 2.0
            };
            return;
        }
        let high_parity = 1 - low_parity;
        for k in 0..low_len {
            out[out_off + (2 * k + low_parity) * out_step] = low[low_off + k * low_step] / Self::KL;
        }
        for k in 0..high_len {
            out[out_off + (2 * k + high_parity) * out_step] =
                high[high_off + k * high_step] / Self::KH;
        }
        Self::synthesize(out, out_off, out_step, n, low_parity);
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_and_split(
        input: &[f32],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [f32],
        low_off: usize,
        low_step: usize,
        high: &mut [f32],
        high_off: usize,
        high_step: usize,
        low_parity: usize,
    ) {
        let n = in_len;
        if n == 0 {
            return;
        }
        if n == 1 {
            if low_parity == 0 {
                low[low_off] = input[in_off];
            } else {
                high[high_off] = input[in_off] * 2.0;
            }
            return;
        }
        let mut sig: Vec<f32> = (0..n).map(|i| input[in_off + i * in_step]).collect();
        Self::analyze(&mut sig, n, low_parity);
        for (i, v) in sig.into_iter().enumerate() {
            if i % 2 == low_parity {
                low[low_off + (i / 2) * low_step] = v * Self::KL;
            } else {
                high[high_off + (i / 2) * high_step] = v * Self::KH;
            }
        }
    }
}

impl LiftingFilter for Dwt97 {
    type Sample = f32;

    const FILTER: WaveletFilter = WaveletFilter::Irreversible9x7;

    fn synthesize_lpf(
        low: &[f32],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[f32],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [f32],
        out_off: usize,
        out_step: usize,
    ) {
        Self::interleave_and_synthesize(
            low, low_off, low_len, low_step, high, high_off, high_len, high_step, out, out_off,
            out_step, 0,
        );
    }

    fn synthesize_hpf(
        low: &[f32],
        low_off: usize,
        low_len: usize,
        low_step: usize,
        high: &[f32],
        high_off: usize,
        high_len: usize,
        high_step: usize,
        out: &mut [f32],
        out_off: usize,
        out_step: usize,
    ) {
        Self::interleave_and_synthesize(
            low, low_off, low_len, low_step, high, high_off, high_len, high_step, out, out_off,
            out_step, 1,
        );
    }

    fn analyze_lpf(
        input: &[f32],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [f32],
        low_off: usize,
        low_step: usize,
        high: &mut [f32],
        high_off: usize,
        high_step: usize,
    ) {
        Self::analyze_and_split(
            input, in_off, in_len, in_step, low, low_off, low_step, high, high_off, high_step, 0,
        );
    }

    fn analyze_hpf(
        input: &[f32],
        in_off: usize,
        in_len: usize,
        in_step: usize,
        low: &mut [f32],
        low_off: usize,
        low_step: usize,
        high: &mut [f32],
        high_off: usize,
        high_step: usize,
    ) {
        Self::analyze_and_split(
            input, in_off, in_len, in_step, low, low_off, low_step, high, high_off, high_step, 1,
        );
    }
}

/// One level of 2-D synthesis of subband node `sb`, in place in a buffer whose rows are `scanw`
/// samples apart. Rows are synthesized first, then columns.
///
/// `tmp` is scratch space, grown as needed.
pub fn synthesize_2d<F: LiftingFilter>(
    buf: &mut [F::Sample],
    scanw: usize,
    sb: &SubbandInfo,
    tmp: &mut Vec<F::Sample>,
) {
    let (w, h) = (sb.w as usize, sb.h as usize);
    if w == 0 || h == 0 {
        return;
    }
    let origin = sb.uly as usize * scanw + sb.ulx as usize;
    tmp.resize(w.max(h), F::Sample::default());

    let (lw, hw) = if sb.ulcx % 2 == 0 { (w.div_ceil(2), w / 2) } else { (w / 2, w.div_ceil(2)) };
    for y in 0..h {
        let start = origin + y * scanw;
        tmp[..w].copy_from_slice(&buf[start..start + w]);
        if sb.ulcx % 2 == 0 {
            F::synthesize_lpf(tmp, 0, lw, 1, tmp, lw, hw, 1, buf, start, 1);
        } else {
            F::synthesize_hpf(tmp, 0, lw, 1, tmp, lw, hw, 1, buf, start, 1);
        }
    }

    let (lh, hh) = if sb.ulcy % 2 == 0 { (h.div_ceil(2), h / 2) } else { (h / 2, h.div_ceil(2)) };
    for x in 0..w {
        for (y, t) in tmp[..h].iter_mut().enumerate() {
            *t = buf[origin + y * scanw + x];
        }
        if sb.ulcy % 2 == 0 {
            F::synthesize_lpf(tmp, 0, lh, 1, tmp, lh, hh, 1, buf, origin + x, scanw);
        } else {
            F::synthesize_hpf(tmp, 0, lh, 1, tmp, lh, hh, 1, buf, origin + x, scanw);
        }
    }
}

/// One level of 2-D analysis of the `sb` region, the exact inverse of [`synthesize_2d`]:
/// columns first, then rows, leaving the four subbands in Mallat order.
pub fn analyze_2d<F: LiftingFilter>(
    buf: &mut [F::Sample],
    scanw: usize,
    sb: &SubbandInfo,
    tmp: &mut Vec<F::Sample>,
) {
    let (w, h) = (sb.w as usize, sb.h as usize);
    if w == 0 || h == 0 {
        return;
    }
    let origin = sb.uly as usize * scanw + sb.ulx as usize;
    let n = w.max(h);
    tmp.resize(2 * n, F::Sample::default());
    let (sig, split) = tmp.split_at_mut(n);

    let lh = if sb.ulcy % 2 == 0 { h.div_ceil(2) } else { h / 2 };
    for x in 0..w {
        for (y, s) in sig[..h].iter_mut().enumerate() {
            *s = buf[origin + y * scanw + x];
        }
        let (low, high) = split[..h].split_at_mut(lh);
        if sb.ulcy % 2 == 0 {
            F::analyze_lpf(sig, 0, h, 1, low, 0, 1, high, 0, 1);
        } else {
            F::analyze_hpf(sig, 0, h, 1, low, 0, 1, high, 0, 1);
        }
        for (y, v) in split[..h].iter().enumerate() {
            buf[origin + y * scanw + x] = *v;
        }
    }

    let lw = if sb.ulcx % 2 == 0 { w.div_ceil(2) } else { w / 2 };
    for y in 0..h {
        let start = origin + y * scanw;
        sig[..w].copy_from_slice(&buf[start..start + w]);
        let (low, high) = split[..w].split_at_mut(lw);
        if sb.ulcx % 2 == 0 {
            F::analyze_lpf(sig, 0, w, 1, low, 0, 1, high, 0, 1);
        } else {
            F::analyze_hpf(sig, 0, w, 1, low, 0, 1, high, 0, 1);
        }
        buf[start..start + w].copy_from_slice(&split[..w]);
    }
}

/// Multi-level synthesis of the node `sb` and all nodes below it, lowest resolution first.
pub fn synthesize_tree<F: LiftingFilter>(
    buf: &mut [F::Sample],
    scanw: usize,
    sb: &Subband,
    tmp: &mut Vec<F::Sample>,
) {
    if let Some(children) = sb.children() {
        synthesize_tree::<F>(buf, scanw, &children[0], tmp);
        trace!(
            "synthesis rl {} ({}x{} at {}, {})",
            sb.info.res_level, sb.info.w, sb.info.h, sb.info.ulcx, sb.info.ulcy
        );
        synthesize_2d::<F>(buf, scanw, &sb.info, tmp);
    }
}

/// Forward multi-level decomposition of a tile-component buffer following `sb`.
pub fn analyze_tree<F: LiftingFilter>(
    buf: &mut [F::Sample],
    scanw: usize,
    sb: &Subband,
    tmp: &mut Vec<F::Sample>,
) {
    if let Some(children) = sb.children() {
        analyze_2d::<F>(buf, scanw, &sb.info, tmp);
        analyze_tree::<F>(buf, scanw, &children[0], tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::tiling::Rect;

    fn synth<F: LiftingFilter>(low: &[F::Sample], high: &[F::Sample], lpf: bool) -> Vec<F::Sample> {
        let mut out = vec![F::Sample::default(); low.len() + high.len()];
        if lpf {
            F::synthesize_lpf(low, 0, low.len(), 1, high, 0, high.len(), 1, &mut out, 0, 1);
        } else {
            F::synthesize_hpf(low, 0, low.len(), 1, high, 0, high.len(), 1, &mut out, 0, 1);
        }
        out
    }

    fn analyze<F: LiftingFilter>(x: &[F::Sample], lpf: bool) -> (Vec<F::Sample>, Vec<F::Sample>) {
        let n = x.len();
        let (nl, nh) = if lpf { (n.div_ceil(2), n / 2) } else { (n / 2, n.div_ceil(2)) };
        let mut low = vec![F::Sample::default(); nl];
        let mut high = vec![F::Sample::default(); nh];
        if lpf {
            F::analyze_lpf(x, 0, n, 1, &mut low, 0, 1, &mut high, 0, 1);
        } else {
            F::analyze_hpf(x, 0, n, 1, &mut low, 0, 1, &mut high, 0, 1);
        }
        (low, high)
    }

    fn signal(n: usize) -> Vec<i32> {
        (0..n as i32).map(|i| (i * 37 + 11) % 23 - 9).collect()
    }

    #[test]
    fn test_53_perfect_reconstruction() {
        for n in 0..=13 {
            for lpf in [true, false] {
                let x = signal(n);
                let (low, high) = analyze::<Dwt53>(&x, lpf);
                assert_eq!(synth::<Dwt53>(&low, &high, lpf), x, "n = {}, lpf = {}", n, lpf);
            }
        }
    }

    #[test]
    fn test_53_analysis_of_synthesis() {
        for n in 0..=13usize {
            for lpf in [true, false] {
                let (nl, nh) = if lpf { (n.div_ceil(2), n / 2) } else { (n / 2, n.div_ceil(2)) };
                // even coefficients so the single high-pass sample survives the halving
                let low: Vec<i32> = (0..nl as i32).map(|k| 2 * (k * 5 - 7)).collect();
                let high: Vec<i32> = (0..nh as i32).map(|k| 2 * (3 - k * 4)).collect();
                let x = synth::<Dwt53>(&low, &high, lpf);
                let (l2, h2) = analyze::<Dwt53>(&x, lpf);
                assert_eq!((l2, h2), (low, high), "n = {}, lpf = {}", n, lpf);
            }
        }
    }

    #[test]
    fn test_53_single_sample() {
        assert_eq!(synth::<Dwt53>(&[7], &[], true), vec![7]);
        assert_eq!(synth::<Dwt53>(&[], &[14], false), vec![7]);
        assert_eq!(analyze::<Dwt53>(&[7], false), (vec![], vec![14]));
    }

    #[test]
    fn test_53_strided_access() {
        // lows at even, highs at odd indices of one buffer; output every third sample
        let x = signal(6);
        let (low, high) = analyze::<Dwt53>(&x, true);
        let mut packed = vec![0; 6];
        for k in 0..3 {
            packed[2 * k] = low[k];
            packed[2 * k + 1] = high[k];
        }
        let mut out = vec![0; 18];
        Dwt53::synthesize_lpf(&packed, 0, 3, 2, &packed, 1, 3, 2, &mut out, 1, 3);
        let got: Vec<i32> = (0..6).map(|i| out[1 + 3 * i]).collect();
        assert_eq!(got, x);
    }

    #[test]
    fn test_97_round_trip() {
        for n in 0..=13 {
            for lpf in [true, false] {
                let x: Vec<f32> = signal(n).into_iter().map(|v| v as f32 * 1.5).collect();
                let (low, high) = analyze::<Dwt97>(&x, lpf);
                let y = synth::<Dwt97>(&low, &high, lpf);
                for (i, (a, b)) in y.iter().zip(&x).enumerate() {
                    assert!((a - b).abs() < 1e-3, "n = {}, lpf = {}, at {}: {} vs {}", n, lpf, i, a, b);
                }
            }
        }
    }

    #[test]
    fn test_97_impulse_responses_match_taps() {
        let n = 20;
        // low-pass impulse at interleaved position 10
        let mut low = vec![0.0f32; n / 2];
        low[5] = 1.0;
        let y = synth::<Dwt97>(&low, &vec![0.0; n / 2], true);
        for (t, tap) in Dwt97::SYNTHESIS_LOW_TAPS.iter().enumerate() {
            let got = y[10 - 3 + t];
            assert!((got - tap).abs() < 1e-5, "low tap {}: {} vs {}", t, got, tap);
        }
        assert!(y[..6].iter().chain(&y[15..]).all(|v| v.abs() < 1e-6));

        // high-pass impulse at interleaved position 9
        let mut high = vec![0.0f32; n / 2];
        high[4] = 1.0;
        let y = synth::<Dwt97>(&vec![0.0; n / 2], &high, true);
        for (t, tap) in Dwt97::SYNTHESIS_HIGH_TAPS.iter().enumerate() {
            let got = y[9 - 4 + t];
            assert!((got - tap).abs() < 1e-5, "high tap {}: {} vs {}", t, got, tap);
        }
    }

    #[test]
    fn test_97_single_sample() {
        assert_eq!(synth::<Dwt97>(&[3.0], &[], true), vec![3.0]);
        assert_eq!(synth::<Dwt97>(&[], &[3.0], false), vec![1.5]);
    }

    #[test]
    fn test_2d_round_trip_odd_origin() {
        // 7x5 region whose canvas origin is odd in both directions
        let tree = Subband::new(Rect::new(3, 1, 10, 6), 1);
        let sb = tree.info;
        let (w, h) = (sb.w as usize, sb.h as usize);
        let image: Vec<i32> = (0..(w * h) as i32).map(|v| (v * 13) % 31 - 15).collect();
        let mut buf = image.clone();
        let mut tmp = Vec::new();
        analyze_2d::<Dwt53>(&mut buf, w, &sb, &mut tmp);
        assert_ne!(buf, image);
        synthesize_2d::<Dwt53>(&mut buf, w, &sb, &mut tmp);
        assert_eq!(buf, image);
    }

    #[test]
    fn test_multi_level_round_trip() {
        for (rect, levels) in [
            (Rect::new(0, 0, 16, 12), 3),
            (Rect::new(5, 3, 18, 10), 2),
            (Rect::new(1, 1, 2, 9), 3),
        ] {
            let tree = Subband::new(rect, levels);
            let (w, h) = (rect.width() as usize, rect.height() as usize);
            let image: Vec<i32> = (0..(w * h) as i32).map(|v| (v * 7) % 41 - 20).collect();
            let mut buf = image.clone();
            let mut tmp = Vec::new();
            analyze_tree::<Dwt53>(&mut buf, w, &tree, &mut tmp);
            synthesize_tree::<Dwt53>(&mut buf, w, &tree, &mut tmp);
            assert_eq!(buf, image, "rect {:?}, {} levels", rect, levels);

            let image: Vec<f32> = image.iter().map(|&v| v as f32).collect();
            let mut buf = image.clone();
            let mut tmp = Vec::new();
            analyze_tree::<Dwt97>(&mut buf, w, &tree, &mut tmp);
            synthesize_tree::<Dwt97>(&mut buf, w, &tree, &mut tmp);
            for (a, b) in buf.iter().zip(&image) {
                assert!((a - b).abs() < 1e-3, "rect {:?}: {} vs {}", rect, a, b);
            }
        }
    }

    #[test]
    fn test_2d_constant_goes_to_ll() {
        let tree = Subband::new(Rect::new(0, 0, 8, 8), 1);
        let mut buf = vec![5i32; 64];
        let mut tmp = Vec::new();
        analyze_2d::<Dwt53>(&mut buf, 8, &tree.info, &mut tmp);
        for y in 0..8 {
            for x in 0..8 {
                let expected = if x < 4 && y < 4 { 5 } else { 0 };
                assert_eq!(buf[y * 8 + x], expected, "at ({}, {})", x, y);
            }
        }
    }
}
