//! Multiple component transforms (ISO/IEC 15444-1 Annex G).
//!
//! RCT is the integer transform paired with the reversible 5/3 path; its
//! inverse is exact for any signed inputs. ICT is the real YCbCr pair for
//! the 9/7 path. Both operate on three equal-length component planes.

use crate::error::{J2kError, Result};

fn check_planes(a: usize, b: usize, c: usize) -> Result<()> {
    if a != b || b != c {
        return Err(J2kError::InvalidComponentConfiguration(
            "component planes differ in size",
        ));
    }
    Ok(())
}

/// Forward reversible color transform:
/// Y = floor((R + 2G + B) / 4), Cb = B - G, Cr = R - G.
pub fn forward_rct(r: &mut [i32], g: &mut [i32], b: &mut [i32]) -> Result<()> {
    check_planes(r.len(), g.len(), b.len())?;
    for i in 0..r.len() {
        let (rv, gv, bv) = (r[i], g[i], b[i]);
        r[i] = (rv + 2 * gv + bv) >> 2;
        g[i] = bv - gv;
        b[i] = rv - gv;
    }
    Ok(())
}

/// Exact inverse of [`forward_rct`]:
/// G = Y - floor((Cb + Cr) / 4), B = Cb + G, R = Cr + G.
pub fn inverse_rct(y: &mut [i32], cb: &mut [i32], cr: &mut [i32]) -> Result<()> {
    check_planes(y.len(), cb.len(), cr.len())?;
    for i in 0..y.len() {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        let g = yv - ((cbv + crv) >> 2);
        y[i] = crv + g;
        cb[i] = g;
        cr[i] = cbv + g;
    }
    Ok(())
}

/// Forward irreversible color transform (the 601 luma weights).
pub fn forward_ict(r: &mut [f32], g: &mut [f32], b: &mut [f32]) -> Result<()> {
    check_planes(r.len(), g.len(), b.len())?;
    for i in 0..r.len() {
        let (rv, gv, bv) = (r[i], g[i], b[i]);
        let y = 0.299 * rv + 0.587 * gv + 0.114 * bv;
        r[i] = y;
        g[i] = -0.168_736 * rv - 0.331_264 * gv + 0.5 * bv;
        b[i] = 0.5 * rv - 0.418_688 * gv - 0.081_312 * bv;
    }
    Ok(())
}

pub fn inverse_ict(y: &mut [f32], cb: &mut [f32], cr: &mut [f32]) -> Result<()> {
    check_planes(y.len(), cb.len(), cr.len())?;
    for i in 0..y.len() {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        y[i] = yv + 1.402 * crv;
        let g = yv - 0.344_136 * cbv - 0.714_136 * crv;
        cr[i] = yv + 1.772 * cbv;
        cb[i] = g;
    }
    Ok(())
}

/// Center unsigned samples around zero: `x - 2^(depth - 1)`.
pub fn level_shift_forward(samples: &mut [i32], bit_depth: u8) {
    let offset = 1i32 << (bit_depth - 1);
    for s in samples.iter_mut() {
        *s -= offset;
    }
}

pub fn level_shift_inverse(samples: &mut [i32], bit_depth: u8) {
    let offset = 1i32 << (bit_depth - 1);
    for s in samples.iter_mut() {
        *s += offset;
    }
}
