//! Quantization (ISO/IEC 15444-1 Annex E).
//!
//! Scalar and deadzone quantizers with midpoint reconstruction, the
//! per-subband step derivation with gain compensation, and the
//! (exponent, mantissa) step-size codec whose packed form lands in the
//! QCD/QCC segments. The reversible 5/3 path quantizes nothing; the trellis
//! variant lives in [`crate::trellis`].

use crate::error::{J2kError, Result};
use crate::trellis::TrellisConfig;
use crate::Subband;

/// Quantizer selection, one payload per variant.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizerParams {
    /// Identity; the reversible path.
    NoQuantization,
    Scalar { step: f32 },
    Deadzone { step: f32, width: f32 },
    Trellis(TrellisConfig),
}

impl QuantizerParams {
    fn validate(&self) -> Result<()> {
        match self {
            QuantizerParams::NoQuantization => Ok(()),
            QuantizerParams::Scalar { step } => {
                if *step <= 0.0 {
                    Err(J2kError::InvalidStepSize)
                } else {
                    Ok(())
                }
            }
            QuantizerParams::Deadzone { step, width } => {
                if *step <= 0.0 || *width < 0.0 {
                    Err(J2kError::InvalidStepSize)
                } else {
                    Ok(())
                }
            }
            QuantizerParams::Trellis(cfg) => cfg.validate(),
        }
    }

    /// Forward-quantize a subband's coefficients.
    pub fn quantize(&self, coefficients: &[f32]) -> Result<Vec<i32>> {
        self.validate()?;
        match self {
            QuantizerParams::NoQuantization => {
                Ok(coefficients.iter().map(|&c| c.round() as i32).collect())
            }
            QuantizerParams::Scalar { step } => {
                Ok(coefficients.iter().map(|&c| quantize_scalar(c, *step)).collect())
            }
            QuantizerParams::Deadzone { step, width } => Ok(coefficients
                .iter()
                .map(|&c| quantize_deadzone(c, *step, *width))
                .collect()),
            QuantizerParams::Trellis(cfg) => Ok(crate::trellis::quantize(coefficients, cfg)?.indices),
        }
    }

    /// Reconstruct coefficients from quantization indices.
    pub fn dequantize(&self, indices: &[i32]) -> Result<Vec<f32>> {
        self.validate()?;
        match self {
            QuantizerParams::NoQuantization => Ok(indices.iter().map(|&q| q as f32).collect()),
            QuantizerParams::Scalar { step } | QuantizerParams::Deadzone { step, .. } => {
                Ok(indices.iter().map(|&q| dequantize_scalar(q, *step)).collect())
            }
            QuantizerParams::Trellis(cfg) => {
                // Index-only reconstruction onto the union grid.
                Ok(indices.iter().map(|&q| q as f32 * cfg.step * 0.5).collect())
            }
        }
    }
}

/// `q = floor(|c| / delta) * sign(c)`.
pub fn quantize_scalar(c: f32, step: f32) -> i32 {
    let q = (c.abs() / step).floor() as i32;
    if c < 0.0 { -q } else { q }
}

/// Midpoint reconstruction; zero stays zero.
pub fn dequantize_scalar(q: i32, step: f32) -> f32 {
    if q == 0 {
        return 0.0;
    }
    let r = (q.abs() as f32 + 0.5) * step;
    if q < 0 { -r } else { r }
}

/// Deadzone of total width `width * step` centered on zero; outside it the
/// quantizer is the scalar one.
pub fn quantize_deadzone(c: f32, step: f32, width: f32) -> i32 {
    if c.abs() <= width * step * 0.5 {
        0
    } else {
        quantize_scalar(c, step)
    }
}

/// Subband amplification of the synthesis basis, compensated when deriving
/// per-subband steps. Reversible: (1, sqrt2, sqrt2, 2); irreversible:
/// (1, 2, 2, 4).
pub fn subband_gain(band: Subband, reversible: bool) -> f32 {
    let sqrt2 = std::f32::consts::SQRT_2;
    match (band, reversible) {
        (Subband::LL, _) => 1.0,
        (Subband::HL | Subband::LH, true) => sqrt2,
        (Subband::HH, true) => 2.0,
        (Subband::HL | Subband::LH, false) => 2.0,
        (Subband::HH, false) => 4.0,
    }
}

/// Per-subband base steps with optional "expounded" overrides.
#[derive(Debug, Clone)]
pub struct StepDerivation {
    pub base: f32,
    pub reversible: bool,
    pub max_level: u8,
    /// Explicit (level, band) -> step overrides.
    pub overrides: Vec<(u8, Subband, f32)>,
}

impl StepDerivation {
    pub fn new(base: f32, reversible: bool, max_level: u8) -> Result<Self> {
        if base <= 0.0 {
            return Err(J2kError::InvalidStepSize);
        }
        if !(1..=crate::decomposition::MAX_LEVELS).contains(&max_level) {
            return Err(J2kError::InvalidParameter("decomposition level out of range"));
        }
        Ok(Self {
            base,
            reversible,
            max_level,
            overrides: Vec::new(),
        })
    }

    /// `delta_b = delta_base * 2^level / gain(band)`, unless expounded.
    pub fn step_for(&self, level: u8, band: Subband) -> Result<f32> {
        if level == 0 || level > self.max_level {
            return Err(J2kError::InvalidParameter("subband level beyond decomposition"));
        }
        if let Some(&(_, _, step)) = self
            .overrides
            .iter()
            .find(|&&(l, b, _)| l == level && b == band)
        {
            if step <= 0.0 {
                return Err(J2kError::InvalidStepSize);
            }
            return Ok(step);
        }
        Ok(self.base * (1u32 << level) as f32 / subband_gain(band, self.reversible))
    }
}

/// Step size as the wire pair: a signed 5-bit exponent and an 11-bit
/// mantissa, `delta = 2^-exponent * (1 + mantissa / 2048)`. Zero maps to
/// (0, 0) exactly.
pub fn encode_step(step: f32) -> Result<(i8, u16)> {
    if step < 0.0 || !step.is_finite() {
        return Err(J2kError::InvalidStepSize);
    }
    if step == 0.0 {
        return Ok((0, 0));
    }

    let mut exponent = -step.log2().floor() as i32;
    let mut mantissa = ((step * 2f32.powi(exponent) - 1.0) * 2048.0).round() as i32;
    if mantissa == 2048 {
        mantissa = 0;
        exponent -= 1;
    }
    if exponent == 0 && mantissa == 0 {
        // (0, 0) is the zero sentinel; a true step of 1.0 takes the
        // next representable value (off by 1/2048).
        mantissa = 1;
    }
    if !(-16..=15).contains(&exponent) {
        return Err(J2kError::InvalidParameter("step size exponent out of range"));
    }
    Ok((exponent as i8, mantissa.clamp(0, 2047) as u16))
}

pub fn decode_step(exponent: i8, mantissa: u16) -> f32 {
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    2f32.powi(-(exponent as i32)) * (1.0 + mantissa as f32 / 2048.0)
}

/// Pack the pair into the 16-bit SPqcd form: exponent in the top 5 bits
/// (two's complement), mantissa in the low 11.
pub fn pack_step(exponent: i8, mantissa: u16) -> u16 {
    (((exponent as u16) & 0x1F) << 11) | (mantissa & 0x7FF)
}

pub fn unpack_step(packed: u16) -> (i8, u16) {
    let raw = (packed >> 11) as i8 & 0x1F;
    // Sign-extend the 5-bit field.
    let exponent = (raw << 3) >> 3;
    (exponent, packed & 0x7FF)
}

/// QCD payload for the reversible path: guard bits + one 8-bit exponent
/// per subband (no mantissas).
pub fn qcd_payload_reversible(exponents: &[u8], guard_bits: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + exponents.len());
    out.push(guard_bits << 5); // Sqcd style 0: no quantization
    out.extend(exponents.iter().map(|&e| e << 3));
    out
}

/// QCD payload for scalar-expounded quantization: guard bits + one packed
/// 16-bit step per subband, big-endian.
pub fn qcd_payload_scalar(steps: &[(i8, u16)], guard_bits: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 2 * steps.len());
    out.push((guard_bits << 5) | 0x02); // Sqcd style 2: scalar expounded
    for &(e, m) in steps {
        out.extend_from_slice(&pack_step(e, m).to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip_on_indices() {
        // quantize(dequantize(q)) == q for every index.
        for q in -100..=100 {
            for step in [0.125f32, 0.5, 1.0, 2.5] {
                let r = dequantize_scalar(q, step);
                assert_eq!(quantize_scalar(r, step), q, "q={q} step={step}");
            }
        }
    }

    #[test]
    fn scalar_error_is_bounded() {
        let step = 2.0;
        for i in 0..200 {
            let c = i as f32 * 0.17 - 17.0;
            let r = dequantize_scalar(quantize_scalar(c, step), step);
            assert!((c - r).abs() <= step, "c={c} r={r}");
        }
    }

    #[test]
    fn deadzone_zeroes_the_center() {
        assert_eq!(quantize_deadzone(0.4, 1.0, 1.0), 0);
        assert_eq!(quantize_deadzone(-0.5, 1.0, 1.0), 0);
        assert_eq!(quantize_deadzone(1.4, 1.0, 1.0), 1);
        assert_eq!(quantize_deadzone(-2.3, 1.0, 1.0), -2);
        // Zero width degrades to plain scalar.
        assert_eq!(quantize_deadzone(0.4, 1.0, 0.0), 0);
    }

    #[test]
    fn step_codec_round_trip() {
        for step in [0.0625f32, 0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0] {
            let (e, m) = encode_step(step).unwrap();
            let back = decode_step(e, m);
            let rel = (back - step).abs() / step;
            assert!(rel <= 0.01, "step {step}: decoded {back} (rel {rel})");

            let (e2, m2) = unpack_step(pack_step(e, m));
            assert_eq!((e, m), (e2, m2));
        }
    }

    #[test]
    fn step_codec_zero_is_exact() {
        assert_eq!(encode_step(0.0).unwrap(), (0, 0));
        assert_eq!(decode_step(0, 0), 0.0);
    }

    #[test]
    fn step_codec_rejects_negative() {
        assert_eq!(encode_step(-1.0).unwrap_err(), J2kError::InvalidStepSize);
    }

    #[test]
    fn gains_match_both_paths() {
        assert_eq!(subband_gain(Subband::LL, true), 1.0);
        assert!((subband_gain(Subband::HL, true) - std::f32::consts::SQRT_2).abs() < 1e-6);
        assert_eq!(subband_gain(Subband::HH, true), 2.0);
        assert_eq!(subband_gain(Subband::LH, false), 2.0);
        assert_eq!(subband_gain(Subband::HH, false), 4.0);
    }

    #[test]
    fn step_derivation_with_overrides() {
        let mut derivation = StepDerivation::new(0.5, false, 3).unwrap();
        // delta * 2^2 / gain(HL) = 0.5 * 4 / 2
        assert_eq!(derivation.step_for(2, Subband::HL).unwrap(), 1.0);
        derivation.overrides.push((2, Subband::HL, 0.75));
        assert_eq!(derivation.step_for(2, Subband::HL).unwrap(), 0.75);
        assert!(derivation.step_for(4, Subband::HH).is_err());
        assert!(derivation.step_for(0, Subband::LL).is_err());
    }

    #[test]
    fn params_validate_steps() {
        assert!(QuantizerParams::Scalar { step: 0.0 }.quantize(&[1.0]).is_err());
        assert!(QuantizerParams::Deadzone { step: -1.0, width: 1.0 }
            .quantize(&[1.0])
            .is_err());
        let q = QuantizerParams::Scalar { step: 0.5 }.quantize(&[1.3, -2.7]).unwrap();
        assert_eq!(q, vec![2, -5]);
    }

    #[test]
    fn qcd_payloads() {
        let rev = qcd_payload_reversible(&[10, 11, 11, 12], 2);
        assert_eq!(rev[0], 0x40);
        assert_eq!(rev.len(), 5);

        let steps = [encode_step(0.5).unwrap(), encode_step(1.0).unwrap()];
        let lossy = qcd_payload_scalar(&steps, 2);
        assert_eq!(lossy[0], 0x42);
        assert_eq!(lossy.len(), 5);
    }
}
