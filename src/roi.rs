//! Region-of-interest scaling (ISO/IEC 15444-1 Annex H, MAXSHIFT).
//!
//! Regions rasterize to an image-domain priority mask; each wavelet level
//! gets a downsampled mask with any-hit aggregation, so a subband position is
//! ROI whenever any of its ancestor pixels is. Apply-side, ROI coefficients
//! scale by `2^s`; remove-side needs no mask at all, because MAXSHIFT picks
//! `s` large enough that every scaled magnitude clears `2^s` and every
//! background magnitude stays below it.

use crate::error::{J2kError, Result};

/// Largest shift the RGN segment can carry.
pub const MAX_SHIFT: u8 = 37;

/// Region geometry in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum RoiShape {
    Rect { x: u32, y: u32, width: u32, height: u32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
    Polygon(Vec<(f32, f32)>),
    /// Explicit mask; dimensions must match the image.
    Mask { width: u32, height: u32, data: Vec<bool> },
}

/// A prioritized region. Where regions overlap, the highest priority wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiRegion {
    pub shape: RoiShape,
    pub priority: u8,
}

/// Rasterized ROI state: per pixel, `priority + 1` of the winning region,
/// zero outside every region.
#[derive(Debug, Clone)]
pub struct RoiMask {
    pub width: usize,
    pub height: usize,
    data: Vec<u8>,
}

impl RoiMask {
    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn priority_at(&self, x: usize, y: usize) -> Option<u8> {
        self.data[y * self.width + x].checked_sub(1)
    }

    /// Binary mask for a subband at decomposition level `level`
    /// (`level` halvings of the image plane), any-hit aggregated and clamped
    /// to the subband's dimensions.
    pub fn for_level(&self, level: u8, band_width: usize, band_height: usize) -> Vec<bool> {
        let mut out = vec![false; band_width * band_height];
        for y in 0..self.height {
            for x in 0..self.width {
                if self.data[y * self.width + x] != 0 {
                    let bx = x >> level;
                    let by = y >> level;
                    if bx < band_width && by < band_height {
                        out[by * band_width + bx] = true;
                    }
                }
            }
        }
        out
    }
}

fn point_in_polygon(vertices: &[(f32, f32)], px: f32, py: f32) -> bool {
    // Even-odd rule.
    let mut inside = false;
    let n = vertices.len();
    for i in 0..n {
        let (x1, y1) = vertices[i];
        let (x2, y2) = vertices[(i + 1) % n];
        if (y1 > py) != (y2 > py) {
            let t = (py - y1) / (y2 - y1);
            if px < x1 + t * (x2 - x1) {
                inside = !inside;
            }
        }
    }
    inside
}

impl RoiShape {
    fn covers(&self, x: usize, y: usize) -> bool {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        match self {
            RoiShape::Rect { x: rx, y: ry, width, height } => {
                (x as u32) >= *rx
                    && (x as u32) < rx + width
                    && (y as u32) >= *ry
                    && (y as u32) < ry + height
            }
            RoiShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return false;
                }
                let dx = (px - cx) / rx;
                let dy = (py - cy) / ry;
                dx * dx + dy * dy <= 1.0
            }
            RoiShape::Polygon(vertices) => {
                vertices.len() >= 3 && point_in_polygon(vertices, px, py)
            }
            RoiShape::Mask { width, data, .. } => data
                .get(y * *width as usize + x)
                .copied()
                .unwrap_or(false),
        }
    }
}

/// Rasterize a set of regions over the image plane.
pub fn rasterize(regions: &[RoiRegion], width: usize, height: usize) -> Result<RoiMask> {
    if width == 0 || height == 0 {
        return Err(J2kError::InvalidParameter("ROI mask dimensions must be non-zero"));
    }
    for region in regions {
        if let RoiShape::Mask { width: mw, height: mh, data } = &region.shape {
            if *mw as usize != width || *mh as usize != height || data.len() != width * height {
                return Err(J2kError::InvalidParameter("explicit ROI mask dimensions mismatch"));
            }
        }
    }

    let mut mask = RoiMask {
        width,
        height,
        data: vec![0; width * height],
    };
    for region in regions {
        let tag = region.priority.min(254) + 1;
        for y in 0..height {
            for x in 0..width {
                let slot = &mut mask.data[y * width + x];
                if *slot < tag && region.shape.covers(x, y) {
                    *slot = tag;
                }
            }
        }
    }
    Ok(mask)
}

fn check_shift(shift: u8) -> Result<()> {
    if shift > MAX_SHIFT {
        return Err(J2kError::InvalidParameter("ROI shift exceeds 37"));
    }
    Ok(())
}

/// The smallest shift MAXSHIFT allows for the given coefficients: the
/// magnitude bit count of the largest background (non-ROI) coefficient.
pub fn maxshift_for(coefficients: &[i32], mask: &[bool]) -> u8 {
    coefficients
        .iter()
        .zip(mask.iter())
        .filter(|&(_, &in_roi)| !in_roi)
        .map(|(&c, _)| 32 - c.unsigned_abs().leading_zeros())
        .max()
        .unwrap_or(0) as u8
}

/// Scale ROI coefficients up by `2^shift` in place.
pub fn apply_shift(coefficients: &mut [i32], mask: &[bool], shift: u8) -> Result<()> {
    check_shift(shift)?;
    if coefficients.len() != mask.len() {
        return Err(J2kError::InvalidData {
            expected: mask.len(),
            actual: coefficients.len(),
        });
    }
    let headroom = 1i64 << (31i64 - shift as i64).max(0);
    for (c, &in_roi) in coefficients.iter_mut().zip(mask.iter()) {
        if in_roi {
            if (c.unsigned_abs() as i64) >= headroom {
                return Err(J2kError::InvalidParameter("coefficient too large for ROI shift"));
            }
            // Shift in i64: the headroom check guarantees the result fits,
            // and the shift amount itself may exceed 31.
            *c = ((*c as i64) << shift) as i32;
        }
    }
    Ok(())
}

/// Undo MAXSHIFT without a mask: any magnitude at or above `2^shift` is an
/// ROI coefficient and scales back down; everything else is background.
pub fn remove_shift(coefficients: &mut [i32], shift: u8) -> Result<()> {
    check_shift(shift)?;
    if shift == 0 {
        return Ok(());
    }
    let threshold = 1u64 << shift;
    for c in coefficients.iter_mut() {
        let mag = c.unsigned_abs() as u64;
        if mag >= threshold {
            let down = (mag >> shift) as i32;
            *c = if *c < 0 { -down } else { down };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_mask_scales_and_recovers() {
        // 8x8 block, rect covering the top-left 4x4, shift 5.
        let regions = [RoiRegion {
            shape: RoiShape::Rect { x: 0, y: 0, width: 4, height: 4 },
            priority: 0,
        }];
        let mask = rasterize(&regions, 8, 8).unwrap();
        let flat = mask.for_level(0, 8, 8);

        let original: Vec<i32> = (0..64).map(|i| (i as i32 % 13) - 6).collect();
        let mut coeffs = original.clone();
        apply_shift(&mut coeffs, &flat, 5).unwrap();

        for y in 0..8 {
            for x in 0..8 {
                let i = y * 8 + x;
                if x < 4 && y < 4 {
                    assert_eq!(coeffs[i], original[i] * 32);
                } else {
                    assert_eq!(coeffs[i], original[i]);
                }
            }
        }

        // Background magnitudes reach 6 (3 bits), so shift 5 separates.
        remove_shift(&mut coeffs, 5).unwrap();
        assert_eq!(coeffs, original);
    }

    #[test]
    fn round_trip_is_exact_for_large_magnitudes() {
        let mask = vec![true; 16];
        let original: Vec<i32> = (0..16).map(|i| (1 << 19) - i as i32 * 7919).collect();
        let mut coeffs = original.clone();
        apply_shift(&mut coeffs, &mask, 5).unwrap();
        remove_shift(&mut coeffs, 5).unwrap();
        assert_eq!(coeffs, original);
    }

    #[test]
    fn ellipse_rasterization() {
        let regions = [RoiRegion {
            shape: RoiShape::Ellipse { cx: 4.0, cy: 4.0, rx: 3.0, ry: 2.0 },
            priority: 1,
        }];
        let mask = rasterize(&regions, 8, 8).unwrap();
        assert!(mask.contains(4, 4));
        assert!(mask.contains(2, 4));
        assert!(!mask.contains(0, 0));
        assert!(!mask.contains(4, 0));
        assert_eq!(mask.priority_at(4, 4), Some(1));
        assert_eq!(mask.priority_at(0, 0), None);
    }

    #[test]
    fn polygon_rasterization() {
        // Triangle covering the lower-left half.
        let regions = [RoiRegion {
            shape: RoiShape::Polygon(vec![(0.0, 0.0), (0.0, 8.0), (8.0, 8.0)]),
            priority: 0,
        }];
        let mask = rasterize(&regions, 8, 8).unwrap();
        assert!(mask.contains(1, 6));
        assert!(!mask.contains(6, 1));
    }

    #[test]
    fn overlapping_priorities_take_the_maximum() {
        let regions = [
            RoiRegion {
                shape: RoiShape::Rect { x: 0, y: 0, width: 8, height: 8 },
                priority: 1,
            },
            RoiRegion {
                shape: RoiShape::Rect { x: 2, y: 2, width: 2, height: 2 },
                priority: 5,
            },
        ];
        let mask = rasterize(&regions, 8, 8).unwrap();
        assert_eq!(mask.priority_at(0, 0), Some(1));
        assert_eq!(mask.priority_at(3, 3), Some(5));
    }

    #[test]
    fn level_mapping_is_any_hit() {
        // A single marked pixel marks its ancestor at every level.
        let regions = [RoiRegion {
            shape: RoiShape::Rect { x: 5, y: 3, width: 1, height: 1 },
            priority: 0,
        }];
        let mask = rasterize(&regions, 16, 16).unwrap();

        let l1 = mask.for_level(1, 8, 8);
        assert!(l1[1 * 8 + 2]); // (5 >> 1, 3 >> 1)
        assert_eq!(l1.iter().filter(|&&b| b).count(), 1);

        let l2 = mask.for_level(2, 4, 4);
        assert!(l2[0 * 4 + 1]);
    }

    #[test]
    fn maxshift_ignores_roi_samples() {
        let coeffs = [100, -2, 3, 0];
        let mask = [true, false, false, false];
        // Background max is 3 -> two magnitude bits.
        assert_eq!(maxshift_for(&coeffs, &mask), 2);
        assert_eq!(maxshift_for(&coeffs, &[true; 4]), 0);
    }

    #[test]
    fn shift_bounds_are_enforced() {
        let mut coeffs = [1i32];
        assert!(apply_shift(&mut coeffs, &[true], 38).is_err());
        assert!(remove_shift(&mut coeffs, 38).is_err());

        let mut big = [1 << 28];
        assert!(apply_shift(&mut big, &[true], 5).is_err());
    }

    #[test]
    fn explicit_mask_must_match_dimensions() {
        let regions = [RoiRegion {
            shape: RoiShape::Mask { width: 4, height: 4, data: vec![true; 16] },
            priority: 0,
        }];
        assert!(rasterize(&regions, 8, 8).is_err());
    }
}
