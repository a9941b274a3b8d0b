//! EBCOT context modeling (ISO/IEC 15444-1 Annex D, Tables D.1-D.4).
//!
//! Pure functions from a coefficient's neighborhood summary to one of the 19
//! context labels consumed by the MQ coder. Labels 0-8 are zero coding,
//! 9-13 sign coding (with an XOR bit folded into the coded decision),
//! 14-16 magnitude refinement; 17 (run-length) and 18 (uniform) are owned by
//! the cleanup pass itself.

use crate::Subband;

/// Base label for sign coding contexts.
const SC_BASE: usize = 9;
/// Base label for magnitude refinement contexts.
const MR_BASE: usize = 14;

/// Zero-coding context label from the clamped significant-neighbor counts
/// (Table D.1). `h`/`v` ∈ 0..=2, `d` ∈ 0..=4. The LL and LH bands share one
/// family, HL swaps the roles of the horizontal and vertical counts, and HH
/// is keyed on the diagonals.
pub fn zero_coding_label(band: Subband, h: u8, v: u8, d: u8) -> usize {
    let (h, v) = match band {
        Subband::HL => (v, h),
        _ => (h, v),
    };

    match band {
        Subband::LL | Subband::LH | Subband::HL => match (h, v, d) {
            (2, _, _) => 8,
            (1, v, _) if v >= 1 => 7,
            (1, 0, d) if d >= 1 => 6,
            (1, 0, 0) => 5,
            (0, 2, _) => 4,
            (0, 1, _) => 3,
            (0, 0, d) if d >= 2 => 2,
            (0, 0, 1) => 1,
            _ => 0,
        },
        Subband::HH => {
            let hv = h + v;
            match (hv, d) {
                (_, d) if d >= 3 => 8,
                (hv, 2) if hv >= 1 => 7,
                (0, 2) => 6,
                (hv, 1) if hv >= 2 => 5,
                (1, 1) => 4,
                (0, 1) => 3,
                (hv, 0) if hv >= 2 => 2,
                (1, 0) => 1,
                _ => 0,
            }
        }
    }
}

/// Sign-coding context label and XOR bit (Table D.2). Inputs are the summed
/// signed contributions of the horizontal and vertical neighbor pairs,
/// already clamped to -1..=1 (a significant positive neighbor contributes +1,
/// a significant negative one -1). The coded decision is
/// `sign XOR xor_bit`.
pub fn sign_coding_label(h: i8, v: i8) -> (usize, u8) {
    debug_assert!((-1..=1).contains(&h) && (-1..=1).contains(&v));
    match (h, v) {
        (1, 1) => (SC_BASE + 4, 0),
        (1, 0) => (SC_BASE + 3, 0),
        (1, -1) => (SC_BASE + 2, 0),
        (0, 1) => (SC_BASE + 1, 0),
        (0, 0) => (SC_BASE, 0),
        (0, -1) => (SC_BASE + 1, 1),
        (-1, 1) => (SC_BASE + 2, 1),
        (-1, 0) => (SC_BASE + 3, 1),
        (-1, -1) => (SC_BASE + 4, 1),
        _ => unreachable!(),
    }
}

/// Magnitude-refinement context label (Table D.4): first refinement is keyed
/// on whether any of the eight neighbors is significant; every later
/// refinement uses the dedicated third label.
pub fn magnitude_refinement_label(already_refined: bool, any_significant_neighbor: bool) -> usize {
    if already_refined {
        MR_BASE + 2
    } else if any_significant_neighbor {
        MR_BASE + 1
    } else {
        MR_BASE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coding_ranges() {
        for &band in &[Subband::LL, Subband::HL, Subband::LH, Subband::HH] {
            for h in 0..=2u8 {
                for v in 0..=2u8 {
                    for d in 0..=4u8 {
                        let label = zero_coding_label(band, h, v, d);
                        assert!(label <= 8);
                        if h == 0 && v == 0 && d == 0 {
                            assert_eq!(label, 0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn hl_transposes_lh() {
        for h in 0..=2u8 {
            for v in 0..=2u8 {
                for d in 0..=4u8 {
                    assert_eq!(
                        zero_coding_label(Subband::HL, h, v, d),
                        zero_coding_label(Subband::LH, v, h, d)
                    );
                }
            }
        }
    }

    #[test]
    fn strong_horizontal_dominates() {
        assert_eq!(zero_coding_label(Subband::LL, 2, 0, 0), 8);
        assert_eq!(zero_coding_label(Subband::LL, 2, 2, 4), 8);
        assert_eq!(zero_coding_label(Subband::HH, 0, 0, 3), 8);
    }

    #[test]
    fn sign_labels_are_antisymmetric() {
        for h in -1..=1i8 {
            for v in -1..=1i8 {
                let (label, xor) = sign_coding_label(h, v);
                let (label_n, xor_n) = sign_coding_label(-h, -v);
                assert!((9..=13).contains(&label));
                assert_eq!(label, label_n);
                if h != 0 || v != 0 {
                    assert_ne!(xor, xor_n);
                }
            }
        }
        assert_eq!(sign_coding_label(0, 0), (9, 0));
    }

    #[test]
    fn refinement_labels() {
        assert_eq!(magnitude_refinement_label(false, false), 14);
        assert_eq!(magnitude_refinement_label(false, true), 15);
        assert_eq!(magnitude_refinement_label(true, false), 16);
        assert_eq!(magnitude_refinement_label(true, true), 16);
    }
}
