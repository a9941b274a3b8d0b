//! 1-D lifting wavelet transforms (ISO/IEC 15444-1 Annex F).
//!
//! Two filter banks: the reversible integer 5/3 and the irreversible real
//! 9/7. Both run as in-place lifting over the interleaved signal (even
//! samples become the low band, odd the high band) and then de-interleave.
//! Boundary neighbors resolve through one extension policy shared by both
//! filters; the inverse steps iterate in reverse index order, which keeps
//! periodic extension exactly reversible even at odd lengths where a wrapped
//! neighbor shares the parity of the sample being lifted.

/// Boundary extension policy at the ends of a (tile-)segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryExtension {
    /// Whole-sample symmetric mirroring (the JPEG 2000 default).
    #[default]
    Symmetric,
    /// Wrap-around.
    Periodic,
    /// Out-of-range neighbors read as zero.
    ZeroPad,
}

impl BoundaryExtension {
    /// Resolve neighbor index `i` (only ever one step outside `0..len`).
    /// `None` means the neighbor contributes zero.
    #[inline]
    fn resolve(self, i: i64, len: usize) -> Option<usize> {
        let n = len as i64;
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        match self {
            BoundaryExtension::Symmetric => {
                let m = if i < 0 { -i } else { 2 * (n - 1) - i };
                Some(m.clamp(0, n - 1) as usize)
            }
            BoundaryExtension::Periodic => Some(((i % n + n) % n) as usize),
            BoundaryExtension::ZeroPad => None,
        }
    }
}

#[inline]
fn fetch_i32(x: &[i32], i: i64, ext: BoundaryExtension) -> i32 {
    ext.resolve(i, x.len()).map_or(0, |j| x[j])
}

#[inline]
fn fetch_f32(x: &[f32], i: i64, ext: BoundaryExtension) -> f32 {
    ext.resolve(i, x.len()).map_or(0.0, |j| x[j])
}

fn deinterleave_i32(x: &[i32], out_l: &mut [i32], out_h: &mut [i32]) {
    for (i, &v) in x.iter().enumerate() {
        if i % 2 == 0 {
            out_l[i / 2] = v;
        } else {
            out_h[i / 2] = v;
        }
    }
}

fn interleave_i32(in_l: &[i32], in_h: &[i32], x: &mut [i32]) {
    for (i, v) in x.iter_mut().enumerate() {
        *v = if i % 2 == 0 { in_l[i / 2] } else { in_h[i / 2] };
    }
}

/// Reversible 5/3 integer filter bank.
pub struct Dwt53;

impl Dwt53 {
    /// Forward transform: `out_l` gets ceil(n/2) low-pass samples, `out_h`
    /// floor(n/2) high-pass samples.
    pub fn forward(signal: &[i32], out_l: &mut [i32], out_h: &mut [i32], ext: BoundaryExtension) {
        let len = signal.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            out_l[0] = signal[0];
            return;
        }

        let mut x = signal.to_vec();

        // Predict: y[2n+1] = x[2n+1] - floor((x[2n] + x[2n+2]) / 2)
        for i in (1..len).step_by(2) {
            let left = fetch_i32(&x, i as i64 - 1, ext);
            let right = fetch_i32(&x, i as i64 + 1, ext);
            x[i] -= (left + right) >> 1;
        }
        // Update: y[2n] = x[2n] + floor((y[2n-1] + y[2n+1] + 2) / 4)
        for i in (0..len).step_by(2) {
            let left = fetch_i32(&x, i as i64 - 1, ext);
            let right = fetch_i32(&x, i as i64 + 1, ext);
            x[i] += (left + right + 2) >> 2;
        }

        deinterleave_i32(&x, out_l, out_h);
    }

    /// Inverse transform; exact for every extension policy.
    pub fn inverse(in_l: &[i32], in_h: &[i32], output: &mut [i32], ext: BoundaryExtension) {
        let len = output.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            output[0] = in_l[0];
            return;
        }

        let mut x = vec![0i32; len];
        interleave_i32(in_l, in_h, &mut x);

        // Undo the lifting steps in reverse, iterating high-to-low so a
        // wrapped same-parity neighbor is still in its lifted state when read.
        for i in (0..len).step_by(2).rev() {
            let left = fetch_i32(&x, i as i64 - 1, ext);
            let right = fetch_i32(&x, i as i64 + 1, ext);
            x[i] -= (left + right + 2) >> 2;
        }
        for i in (1..len).step_by(2).rev() {
            let left = fetch_i32(&x, i as i64 - 1, ext);
            let right = fetch_i32(&x, i as i64 + 1, ext);
            x[i] += (left + right) >> 1;
        }

        output.copy_from_slice(&x);
    }
}

/// Irreversible 9/7 real filter bank.
pub struct Dwt97;

impl Dwt97 {
    const ALPHA: f32 = -1.586_134_3;
    const BETA: f32 = -0.052_980_118;
    const GAMMA: f32 = 0.882_911_1;
    const DELTA: f32 = 0.443_506_85;
    const K: f32 = 1.230_174_1;
    const INV_K: f32 = 1.0 / Self::K;

    fn lift_odd(x: &mut [f32], coeff: f32, ext: BoundaryExtension, reverse: bool) {
        let len = x.len();
        let idx: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((1..len).step_by(2).rev())
        } else {
            Box::new((1..len).step_by(2))
        };
        for i in idx {
            let left = fetch_f32(x, i as i64 - 1, ext);
            let right = fetch_f32(x, i as i64 + 1, ext);
            x[i] += coeff * (left + right);
        }
    }

    fn lift_even(x: &mut [f32], coeff: f32, ext: BoundaryExtension, reverse: bool) {
        let len = x.len();
        let idx: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..len).step_by(2).rev())
        } else {
            Box::new((0..len).step_by(2))
        };
        for i in idx {
            let left = fetch_f32(x, i as i64 - 1, ext);
            let right = fetch_f32(x, i as i64 + 1, ext);
            x[i] += coeff * (left + right);
        }
    }

    pub fn forward(signal: &[f32], out_l: &mut [f32], out_h: &mut [f32], ext: BoundaryExtension) {
        let len = signal.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            out_l[0] = signal[0];
            return;
        }

        let mut x = signal.to_vec();

        Self::lift_odd(&mut x, Self::ALPHA, ext, false);
        Self::lift_even(&mut x, Self::BETA, ext, false);
        Self::lift_odd(&mut x, Self::GAMMA, ext, false);
        Self::lift_even(&mut x, Self::DELTA, ext, false);

        for (i, v) in x.iter_mut().enumerate() {
            *v *= if i % 2 == 0 { Self::INV_K } else { Self::K };
        }

        for (i, &v) in x.iter().enumerate() {
            if i % 2 == 0 {
                out_l[i / 2] = v;
            } else {
                out_h[i / 2] = v;
            }
        }
    }

    pub fn inverse(in_l: &[f32], in_h: &[f32], output: &mut [f32], ext: BoundaryExtension) {
        let len = output.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            output[0] = in_l[0];
            return;
        }

        let mut x = vec![0.0f32; len];
        for (i, v) in x.iter_mut().enumerate() {
            *v = if i % 2 == 0 { in_l[i / 2] } else { in_h[i / 2] };
        }

        for (i, v) in x.iter_mut().enumerate() {
            *v *= if i % 2 == 0 { Self::K } else { Self::INV_K };
        }

        Self::lift_even(&mut x, -Self::DELTA, ext, true);
        Self::lift_odd(&mut x, -Self::GAMMA, ext, true);
        Self::lift_even(&mut x, -Self::BETA, ext, true);
        Self::lift_odd(&mut x, -Self::ALPHA, ext, true);

        output.copy_from_slice(&x);
    }
}
