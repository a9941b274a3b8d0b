//! 2-D dyadic decomposition and tiling on top of the 1-D filter banks.
//!
//! One level splits the working LL into the four quadrant subbands by
//! applying the 1-D transform along every row and then every column; the new
//! LL feeds the next level. The element type selects the filter bank: `i32`
//! runs the reversible 5/3, `f32` the irreversible 9/7 (the two paths of the
//! codec never mix types).
//!
//! Tiles transform independently, with boundary extension applied at tile
//! edges rather than image edges, so the per-tile work parallelizes freely.

use rayon::prelude::*;

use crate::dwt::{BoundaryExtension, Dwt53, Dwt97};
use crate::error::{J2kError, Result};
use crate::Subband;

/// Maximum decomposition depth.
pub const MAX_LEVELS: u8 = 32;

/// Element type of a wavelet path; ties the sample representation to its
/// filter bank.
pub trait Sample: Copy + Default + Send + Sync {
    fn forward_1d(signal: &[Self], low: &mut [Self], high: &mut [Self], ext: BoundaryExtension);
    fn inverse_1d(low: &[Self], high: &[Self], output: &mut [Self], ext: BoundaryExtension);
}

impl Sample for i32 {
    fn forward_1d(signal: &[i32], low: &mut [i32], high: &mut [i32], ext: BoundaryExtension) {
        Dwt53::forward(signal, low, high, ext);
    }
    fn inverse_1d(low: &[i32], high: &[i32], output: &mut [i32], ext: BoundaryExtension) {
        Dwt53::inverse(low, high, output, ext);
    }
}

impl Sample for f32 {
    fn forward_1d(signal: &[f32], low: &mut [f32], high: &mut [f32], ext: BoundaryExtension) {
        Dwt97::forward(signal, low, high, ext);
    }
    fn inverse_1d(low: &[f32], high: &[f32], output: &mut [f32], ext: BoundaryExtension) {
        Dwt97::inverse(low, high, output, ext);
    }
}

/// One subband's coefficients.
#[derive(Debug, Clone)]
pub struct SubbandData<T> {
    pub band: Subband,
    /// Decomposition level this subband was produced at (1 = finest).
    pub level: u8,
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

/// The three detail subbands of one level.
#[derive(Debug, Clone)]
pub struct DecompositionLevel<T> {
    pub level: u8,
    pub hl: SubbandData<T>,
    pub lh: SubbandData<T>,
    pub hh: SubbandData<T>,
}

/// A complete multi-level decomposition. `levels[0]` is the finest level;
/// the coarsest LL is owned here as well. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Decomposition<T> {
    pub width: usize,
    pub height: usize,
    pub levels: Vec<DecompositionLevel<T>>,
    pub ll: SubbandData<T>,
}

impl<T> Decomposition<T> {
    /// All subbands, coarsest first (the order quantization and packet
    /// assembly walk them in).
    pub fn subbands(&self) -> impl Iterator<Item = &SubbandData<T>> {
        std::iter::once(&self.ll).chain(
            self.levels
                .iter()
                .rev()
                .flat_map(|l| [&l.hl, &l.lh, &l.hh]),
        )
    }
}

/// One forward 2-D level: returns (LL, HL, LH, HH).
#[allow(clippy::type_complexity)]
pub fn forward_2d<T: Sample>(
    data: &[T],
    width: usize,
    height: usize,
    ext: BoundaryExtension,
) -> (Vec<T>, Vec<T>, Vec<T>, Vec<T>) {
    let lw = width.div_ceil(2);
    let hw = width / 2;
    let lh = height.div_ceil(2);
    let hh = height / 2;

    // Rows: [ L | H ] into a scratch buffer.
    let mut scratch = vec![T::default(); width * height];
    let mut low = vec![T::default(); lw.max(lh)];
    let mut high = vec![T::default(); hw.max(hh)];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        T::forward_1d(row, &mut low[..lw], &mut high[..hw], ext);
        scratch[y * width..y * width + lw].copy_from_slice(&low[..lw]);
        scratch[y * width + lw..(y + 1) * width].copy_from_slice(&high[..hw]);
    }

    // Columns: top half low-pass, bottom half high-pass.
    let mut out = vec![T::default(); width * height];
    let mut col = vec![T::default(); height];
    for x in 0..width {
        for y in 0..height {
            col[y] = scratch[y * width + x];
        }
        T::forward_1d(&col, &mut low[..lh], &mut high[..hh], ext);
        for y in 0..lh {
            out[y * width + x] = low[y];
        }
        for y in 0..hh {
            out[(lh + y) * width + x] = high[y];
        }
    }

    let quadrant = |x0: usize, y0: usize, w: usize, h: usize| {
        let mut q = vec![T::default(); w * h];
        for y in 0..h {
            for x in 0..w {
                q[y * w + x] = out[(y0 + y) * width + x0 + x];
            }
        }
        q
    };

    (
        quadrant(0, 0, lw, lh),
        quadrant(lw, 0, hw, lh),
        quadrant(0, lh, lw, hh),
        quadrant(lw, lh, hw, hh),
    )
}

/// One inverse 2-D level.
pub fn inverse_2d<T: Sample>(
    ll: &[T],
    hl: &[T],
    lh: &[T],
    hh: &[T],
    width: usize,
    height: usize,
    ext: BoundaryExtension,
) -> Vec<T> {
    let lw = width.div_ceil(2);
    let hw = width / 2;
    let lhh = height.div_ceil(2);
    let hhh = height / 2;

    // Columns first (undoing the forward order).
    let mut scratch = vec![T::default(); width * height];
    let mut low = vec![T::default(); lhh.max(lw)];
    let mut high = vec![T::default(); hhh.max(hw)];
    let mut col = vec![T::default(); height];
    for x in 0..width {
        for y in 0..lhh {
            low[y] = if x < lw {
                ll[y * lw + x]
            } else {
                hl[y * hw + (x - lw)]
            };
        }
        for y in 0..hhh {
            high[y] = if x < lw {
                lh[y * lw + x]
            } else {
                hh[y * hw + (x - lw)]
            };
        }
        T::inverse_1d(&low[..lhh], &high[..hhh], &mut col, ext);
        for y in 0..height {
            scratch[y * width + x] = col[y];
        }
    }

    let mut out = vec![T::default(); width * height];
    let mut row_l = vec![T::default(); lw];
    let mut row_h = vec![T::default(); hw];
    let mut row = vec![T::default(); width];
    for y in 0..height {
        row_l.copy_from_slice(&scratch[y * width..y * width + lw]);
        row_h.copy_from_slice(&scratch[y * width + lw..(y + 1) * width]);
        T::inverse_1d(&row_l, &row_h, &mut row, ext);
        out[y * width..(y + 1) * width].copy_from_slice(&row);
    }
    out
}

/// Full multi-level forward decomposition of one (tile-)component.
pub fn forward_multi<T: Sample>(
    data: &[T],
    width: usize,
    height: usize,
    levels: u8,
    ext: BoundaryExtension,
) -> Result<Decomposition<T>> {
    if width == 0 || height == 0 {
        return Err(J2kError::InvalidParameter("decomposition of an empty region"));
    }
    if !(1..=MAX_LEVELS).contains(&levels) {
        return Err(J2kError::InvalidParameter("decomposition levels must be 1..=32"));
    }
    if data.len() != width * height {
        return Err(J2kError::InvalidData {
            expected: width * height,
            actual: data.len(),
        });
    }

    let mut out_levels = Vec::with_capacity(levels as usize);
    let mut cur = data.to_vec();
    let (mut cw, mut ch) = (width, height);

    for level in 1..=levels {
        let (ll, hl, lh, hh) = forward_2d(&cur, cw, ch, ext);
        let (lw, lhh) = (cw.div_ceil(2), ch.div_ceil(2));
        let (hw, hhh) = (cw / 2, ch / 2);
        out_levels.push(DecompositionLevel {
            level,
            hl: SubbandData { band: Subband::HL, level, width: hw, height: lhh, data: hl },
            lh: SubbandData { band: Subband::LH, level, width: lw, height: hhh, data: lh },
            hh: SubbandData { band: Subband::HH, level, width: hw, height: hhh, data: hh },
        });
        cur = ll;
        cw = lw;
        ch = lhh;
    }

    Ok(Decomposition {
        width,
        height,
        ll: SubbandData {
            band: Subband::LL,
            level: levels,
            width: cw,
            height: ch,
            data: cur,
        },
        levels: out_levels,
    })
}

/// Invert a full decomposition back to samples.
pub fn inverse_multi<T: Sample>(decomp: &Decomposition<T>, ext: BoundaryExtension) -> Vec<T> {
    let mut cur = decomp.ll.data.clone();
    for level in decomp.levels.iter().rev() {
        let (w, h) = level_dims(decomp.width, decomp.height, level.level - 1);
        debug_assert_eq!(level.hl.height, h.div_ceil(2));
        debug_assert_eq!(level.lh.width, w.div_ceil(2));
        cur = inverse_2d(&cur, &level.hl.data, &level.lh.data, &level.hh.data, w, h, ext);
    }
    cur
}

/// Dimensions of the working LL after `level` halvings.
fn level_dims(width: usize, height: usize, level: u8) -> (usize, usize) {
    let mut w = width;
    let mut h = height;
    for _ in 0..level {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }
    (w, h)
}

/// Regular tile grid over the image plane.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    pub tile_width: usize,
    pub tile_height: usize,
}

impl TileGrid {
    pub fn new(tile_width: usize, tile_height: usize) -> Result<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(J2kError::InvalidParameter("tile dimensions must be non-zero"));
        }
        Ok(Self { tile_width, tile_height })
    }

    pub fn tiles_across(&self, width: usize) -> usize {
        width.div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self, height: usize) -> usize {
        height.div_ceil(self.tile_height)
    }

    /// Tile rectangles in row-major tile order: `(x0, y0, w, h)`.
    pub fn rects(&self, width: usize, height: usize) -> Vec<(usize, usize, usize, usize)> {
        let mut rects = Vec::new();
        for ty in 0..self.tiles_down(height) {
            for tx in 0..self.tiles_across(width) {
                let x0 = tx * self.tile_width;
                let y0 = ty * self.tile_height;
                rects.push((x0, y0, self.tile_width.min(width - x0), self.tile_height.min(height - y0)));
            }
        }
        rects
    }
}

/// Per-tile decompositions, row-major by tile coordinate.
#[derive(Debug, Clone)]
pub struct TiledDecomposition<T> {
    pub grid: TileGrid,
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<Decomposition<T>>,
}

/// Transform every tile independently. Tiles are embarrassingly parallel;
/// the output order is fixed by tile coordinates regardless of scheduling.
pub fn forward_tiled<T: Sample>(
    data: &[T],
    width: usize,
    height: usize,
    grid: TileGrid,
    levels: u8,
    ext: BoundaryExtension,
    parallel: bool,
) -> Result<TiledDecomposition<T>> {
    if data.len() != width * height {
        return Err(J2kError::InvalidData {
            expected: width * height,
            actual: data.len(),
        });
    }

    let extract = |&(x0, y0, w, h): &(usize, usize, usize, usize)| {
        let mut tile = vec![T::default(); w * h];
        for y in 0..h {
            let src = (y0 + y) * width + x0;
            tile[y * w..(y + 1) * w].copy_from_slice(&data[src..src + w]);
        }
        forward_multi(&tile, w, h, levels, ext)
    };

    let rects = grid.rects(width, height);
    let tiles: Result<Vec<_>> = if parallel {
        rects.par_iter().map(extract).collect()
    } else {
        rects.iter().map(extract).collect()
    };

    Ok(TiledDecomposition {
        grid,
        width,
        height,
        tiles: tiles?,
    })
}

/// Reassemble the image from per-tile inverse transforms.
pub fn inverse_tiled<T: Sample>(decomp: &TiledDecomposition<T>, ext: BoundaryExtension) -> Vec<T> {
    let (width, height) = (decomp.width, decomp.height);
    let rects = decomp.grid.rects(width, height);

    let tiles: Vec<Vec<T>> = decomp.tiles.par_iter().map(|t| inverse_multi(t, ext)).collect();

    let mut out = vec![T::default(); width * height];
    for ((x0, y0, w, h), tile) in rects.into_iter().zip(tiles) {
        for y in 0..h {
            let dst = (y0 + y) * width + x0;
            out[dst..dst + w].copy_from_slice(&tile[y * w..(y + 1) * w]);
        }
    }
    out
}
