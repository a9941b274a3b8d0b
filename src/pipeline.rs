//! Code-block pipeline: partitioning, legacy/HT dispatch, parallel encode
//! with deterministic assembly, and the whole-image driver that chains
//! tiling, DWT, ROI scaling and block coding.
//!
//! Blocks are independent, so the per-block work may run on the rayon pool;
//! results land in an indexed collector (append-only slots, first error
//! wins), which makes the parallel output byte-identical to the sequential
//! one.

use std::sync::Mutex;

use log::warn;
use rayon::prelude::*;

use crate::bit_plane_coder::{self, CodingOptions};
use crate::decomposition::{
    forward_multi, inverse_multi, Decomposition, DecompositionLevel, SubbandData, TileGrid,
};
use crate::dwt::BoundaryExtension;
use crate::error::{J2kError, Result};
use crate::ht_block_coder;
use crate::roi::{self, RoiMask, RoiRegion};
use crate::Subband;

/// Which block coder a code-block went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingMode {
    /// EBCOT Tier-1 (MQ coder).
    Legacy,
    /// High-throughput FBCOT.
    Ht,
}

/// One encoded code-block with the metadata the packet layer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Block origin within its subband.
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub band: Subband,
    pub level: u8,
    pub mode: CodingMode,
    pub bit_depth: u8,
    pub payload: Vec<u8>,
    pub pass_count: u8,
    pub zero_bit_planes: u8,
    pub termination_offsets: Vec<u32>,
}

/// Per-subband pipeline options.
#[derive(Debug, Clone)]
pub struct BlockPipelineOptions {
    pub mode: CodingMode,
    /// Nominal code-block side; a power of two, at most 64.
    pub nominal_block_size: usize,
    pub parallel: bool,
    pub coding: CodingOptions,
    /// HT only: emit the SigProp/MagRef refinement passes.
    pub ht_refinement: bool,
}

impl Default for BlockPipelineOptions {
    fn default() -> Self {
        Self {
            mode: CodingMode::Legacy,
            nominal_block_size: 64,
            parallel: false,
            coding: CodingOptions::default(),
            ht_refinement: false,
        }
    }
}

impl BlockPipelineOptions {
    fn validate(&self) -> Result<()> {
        let n = self.nominal_block_size;
        if !n.is_power_of_two() || !(4..=64).contains(&n) {
            return Err(J2kError::InvalidParameter(
                "nominal code-block size must be a power of two in 4..=64",
            ));
        }
        Ok(())
    }
}

/// Shared result collector for parallel block coding: one slot per block
/// index, error recorded once.
struct ResultCollector<T> {
    slots: Mutex<Vec<Option<T>>>,
    error: Mutex<Option<J2kError>>,
}

impl<T> ResultCollector<T> {
    fn new(count: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(count, || None);
        Self {
            slots: Mutex::new(slots),
            error: Mutex::new(None),
        }
    }

    fn store(&self, index: usize, result: Result<T>) {
        match result {
            Ok(value) => self.slots.lock().expect("collector poisoned")[index] = Some(value),
            Err(e) => {
                let mut slot = self.error.lock().expect("collector poisoned");
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
        }
    }

    fn finish(self) -> Result<Vec<T>> {
        if let Some(e) = self.error.into_inner().expect("collector poisoned") {
            return Err(e);
        }
        Ok(self
            .slots
            .into_inner()
            .expect("collector poisoned")
            .into_iter()
            .map(|slot| slot.expect("every block stored a result"))
            .collect())
    }
}

/// Partition a subband into code-block rectangles, row-major. Partial blocks
/// on the right and bottom edges keep their true size.
pub fn partition(width: usize, height: usize, nominal: usize) -> Vec<(usize, usize, usize, usize)> {
    let mut rects = Vec::new();
    for y0 in (0..height).step_by(nominal) {
        for x0 in (0..width).step_by(nominal) {
            rects.push((x0, y0, nominal.min(width - x0), nominal.min(height - y0)));
        }
    }
    rects
}

fn encode_one_block(
    sub: &SubbandData<i32>,
    rect: (usize, usize, usize, usize),
    bit_depth: u8,
    options: &BlockPipelineOptions,
) -> Result<EncodedBlock> {
    let (x0, y0, w, h) = rect;
    let mut coeffs = vec![0i32; w * h];
    for y in 0..h {
        let src = (y0 + y) * sub.width + x0;
        coeffs[y * w..(y + 1) * w].copy_from_slice(&sub.data[src..src + w]);
    }

    let (payload, pass_count, zero_bit_planes, termination_offsets) = match options.mode {
        CodingMode::Legacy => {
            let out = bit_plane_coder::encode(&coeffs, w, h, sub.band, bit_depth, &options.coding)?;
            (out.data, out.pass_count, out.zero_bit_planes, out.termination_offsets)
        }
        CodingMode::Ht => {
            let out = ht_block_coder::encode(&coeffs, w, h, bit_depth, options.ht_refinement)?;
            (out.data, out.pass_count, out.zero_bit_planes, out.termination_offsets)
        }
    };

    Ok(EncodedBlock {
        x: x0,
        y: y0,
        width: w,
        height: h,
        band: sub.band,
        level: sub.level,
        mode: options.mode,
        bit_depth,
        payload,
        pass_count,
        zero_bit_planes,
        termination_offsets,
    })
}

/// Encode every code-block of one subband. With `options.parallel` the
/// blocks run on the rayon pool; output order is bound to the block index
/// either way, so both schedules produce identical results.
pub fn encode_subband(
    sub: &SubbandData<i32>,
    bit_depth: u8,
    options: &BlockPipelineOptions,
) -> Result<Vec<EncodedBlock>> {
    options.validate()?;
    if sub.width == 0 || sub.height == 0 {
        return Ok(Vec::new());
    }

    let rects = partition(sub.width, sub.height, options.nominal_block_size);
    let collector = ResultCollector::new(rects.len());

    if options.parallel {
        rects.par_iter().enumerate().for_each(|(i, &rect)| {
            collector.store(i, encode_one_block(sub, rect, bit_depth, options));
        });
    } else {
        for (i, &rect) in rects.iter().enumerate() {
            collector.store(i, encode_one_block(sub, rect, bit_depth, options));
        }
    }
    collector.finish()
}

/// Decode a subband's blocks back into its coefficient plane.
pub fn decode_subband(
    blocks: &[EncodedBlock],
    width: usize,
    height: usize,
    coding: &CodingOptions,
    parallel: bool,
) -> Result<Vec<i32>> {
    let collector = ResultCollector::new(blocks.len());
    let decode_with_options = |block: &EncodedBlock| -> Result<Vec<i32>> {
        match block.mode {
            CodingMode::Legacy => {
                let out = bit_plane_coder::decode(
                    &block.payload,
                    block.width,
                    block.height,
                    block.band,
                    block.bit_depth,
                    block.zero_bit_planes,
                    block.pass_count,
                    &block.termination_offsets,
                    coding,
                )?;
                if out.truncated {
                    warn!(
                        "code-block at ({}, {}) truncated after {} of {} passes",
                        block.x, block.y, out.passes_decoded, block.pass_count
                    );
                }
                Ok(out.coefficients)
            }
            CodingMode::Ht => ht_block_coder::decode(
                &block.payload,
                block.width,
                block.height,
                block.bit_depth,
                block.zero_bit_planes,
                block.pass_count,
                &block.termination_offsets,
            ),
        }
    };

    if parallel {
        blocks.par_iter().enumerate().for_each(|(i, block)| {
            collector.store(i, decode_with_options(block));
        });
    } else {
        for (i, block) in blocks.iter().enumerate() {
            collector.store(i, decode_with_options(block));
        }
    }
    let planes = collector.finish()?;

    let mut out = vec![0i32; width * height];
    for (block, coeffs) in blocks.iter().zip(planes) {
        for y in 0..block.height {
            let dst = (block.y + y) * width + block.x;
            out[dst..dst + block.width].copy_from_slice(&coeffs[y * block.width..(y + 1) * block.width]);
        }
    }
    Ok(out)
}

/// Per-layer coding-pass allocation for a subband's blocks: layer `k` maps
/// each block index to the cumulative number of passes included up to that
/// layer. Later layers can only add passes, never retract them.
#[derive(Debug, Clone, Default)]
pub struct LayerAllocation {
    layers: Vec<Vec<u8>>,
}

impl LayerAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one quality layer's cumulative pass counts (one entry per
    /// block).
    pub fn push_layer(&mut self, passes: Vec<u8>) -> Result<()> {
        if let Some(prev) = self.layers.last() {
            if prev.len() != passes.len() {
                return Err(J2kError::InvalidParameter("layer block count mismatch"));
            }
            if prev.iter().zip(passes.iter()).any(|(p, n)| n < p) {
                return Err(J2kError::InvalidParameter(
                    "layer pass contribution decreased for a block",
                ));
            }
        }
        self.layers.push(passes);
        Ok(())
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Cumulative passes of `block` up to and including `layer`.
    pub fn passes_up_to(&self, layer: usize, block: usize) -> u8 {
        self.layers[layer][block]
    }

    /// Passes newly contributed by `layer` for `block`.
    pub fn passes_in(&self, layer: usize, block: usize) -> u8 {
        let total = self.layers[layer][block];
        if layer == 0 {
            total
        } else {
            total - self.layers[layer - 1][block]
        }
    }
}

/// How hard the analyzer pushes toward small blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggressiveness {
    Conservative,
    Balanced,
    Aggressive,
}

/// Picks a code-block size from the tile content: busy tiles (dense edges,
/// high-frequency energy) get small blocks, smooth ones large blocks.
/// The default pipeline path uses a fixed size; this is opt-in.
#[derive(Debug, Clone, Copy)]
pub struct BlockSizeAnalyzer {
    pub aggressiveness: Aggressiveness,
}

impl BlockSizeAnalyzer {
    pub fn new(aggressiveness: Aggressiveness) -> Self {
        Self { aggressiveness }
    }

    /// Sobel gradient density over the interior, normalized by the sample
    /// range.
    fn edge_density(samples: &[i32], width: usize, height: usize) -> f64 {
        if width < 3 || height < 3 {
            return 0.0;
        }
        let at = |x: usize, y: usize| samples[y * width + x] as i64;
        let mut total = 0u64;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let gx = -at(x - 1, y - 1) + at(x + 1, y - 1) - 2 * at(x - 1, y) + 2 * at(x + 1, y)
                    - at(x - 1, y + 1)
                    + at(x + 1, y + 1);
                let gy = -at(x - 1, y - 1) - 2 * at(x, y - 1) - at(x + 1, y - 1)
                    + at(x - 1, y + 1)
                    + 2 * at(x, y + 1)
                    + at(x + 1, y + 1);
                total += (gx.abs() + gy.abs()) as u64;
            }
        }
        let range = samples.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0).max(1) as f64;
        total as f64 / (((width - 2) * (height - 2)) as f64 * 8.0 * range)
    }

    /// Ratio of first-difference energy to total deviation energy.
    fn high_pass_ratio(samples: &[i32], width: usize, height: usize) -> f64 {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let variance: f64 = samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum();
        if variance < 1e-9 {
            return 0.0;
        }
        let mut hf = 0.0f64;
        for y in 0..height {
            for x in 1..width {
                let d = (samples[y * width + x] - samples[y * width + x - 1]) as f64;
                hf += d * d;
            }
        }
        for y in 1..height {
            for x in 0..width {
                let d = (samples[y * width + x] - samples[(y - 1) * width + x]) as f64;
                hf += d * d;
            }
        }
        (hf / (4.0 * variance)).min(4.0)
    }

    /// Pick 16, 32 or 64 for the given tile.
    pub fn analyze(&self, samples: &[i32], width: usize, height: usize) -> usize {
        let score = Self::edge_density(samples, width, height)
            + Self::high_pass_ratio(samples, width, height);
        let (low, high) = match self.aggressiveness {
            Aggressiveness::Conservative => (0.8, 1.8),
            Aggressiveness::Balanced => (0.5, 1.2),
            Aggressiveness::Aggressive => (0.25, 0.7),
        };
        if score < low {
            64
        } else if score < high {
            32
        } else {
            16
        }
    }
}

/// ROI configuration for the image driver.
#[derive(Debug, Clone)]
pub struct RoiOptions {
    pub regions: Vec<RoiRegion>,
    pub shift: u8,
}

/// Whole-image encoder configuration (single component, reversible path).
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub levels: u8,
    /// `None` runs the image as one tile.
    pub tile_size: Option<(usize, usize)>,
    pub extension: BoundaryExtension,
    pub block: BlockPipelineOptions,
    pub roi: Option<RoiOptions>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            levels: 3,
            tile_size: None,
            extension: BoundaryExtension::Symmetric,
            block: BlockPipelineOptions::default(),
            roi: None,
        }
    }
}

/// One subband's encoded blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSubband {
    pub band: Subband,
    pub level: u8,
    pub width: usize,
    pub height: usize,
    pub blocks: Vec<EncodedBlock>,
}

/// One tile's encoded subbands, coarsest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTile {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    pub subbands: Vec<EncodedSubband>,
}

/// The encoded image: everything the decoder needs short of marker framing.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: usize,
    pub height: usize,
    pub levels: u8,
    pub tile_size: Option<(usize, usize)>,
    pub extension: BoundaryExtension,
    pub roi_shift: u8,
    pub coding: CodingOptions,
    pub tiles: Vec<EncodedTile>,
}

fn crop_mask(mask: &RoiMask, x0: usize, y0: usize, w: usize, h: usize) -> RoiMask {
    let mut regions = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            regions[y * w + x] = mask.contains(x0 + x, y0 + y);
        }
    }
    // Re-rasterize as an explicit mask region to reuse the pyramid mapping.
    let region = RoiRegion {
        shape: crate::roi::RoiShape::Mask {
            width: w as u32,
            height: h as u32,
            data: regions,
        },
        priority: 0,
    };
    roi::rasterize(&[region], w, h).expect("tile mask dimensions are consistent")
}

/// Encode a single-component image through tiling, reversible DWT, optional
/// ROI scaling and per-block entropy coding.
pub fn encode_image(samples: &[i32], width: usize, height: usize, config: &EncoderConfig) -> Result<EncodedImage> {
    if width == 0 || height == 0 {
        return Err(J2kError::InvalidParameter("image dimensions must be non-zero"));
    }
    if samples.len() != width * height {
        return Err(J2kError::InvalidData {
            expected: width * height,
            actual: samples.len(),
        });
    }
    config.block.validate()?;

    let roi_shift = config.roi.as_ref().map_or(0, |r| r.shift);
    let image_mask = match &config.roi {
        Some(r) => Some(roi::rasterize(&r.regions, width, height)?),
        None => None,
    };

    let (tw, th) = config.tile_size.unwrap_or((width, height));
    let grid = TileGrid::new(tw, th)?;

    let mut tiles = Vec::new();
    for (x0, y0, w, h) in grid.rects(width, height) {
        let mut tile_samples = vec![0i32; w * h];
        for y in 0..h {
            let src = (y0 + y) * width + x0;
            tile_samples[y * w..(y + 1) * w].copy_from_slice(&samples[src..src + w]);
        }

        let decomp = forward_multi(&tile_samples, w, h, config.levels, config.extension)?;
        let tile_mask = image_mask.as_ref().map(|m| crop_mask(m, x0, y0, w, h));

        let mut subbands = Vec::new();
        for sub in decomp.subbands() {
            let mut data = sub.data.clone();
            if let (Some(mask), true) = (&tile_mask, roi_shift > 0) {
                let band_mask = mask.for_level(sub.level, sub.width, sub.height);
                roi::apply_shift(&mut data, &band_mask, roi_shift)?;
            }

            let owned = SubbandData {
                band: sub.band,
                level: sub.level,
                width: sub.width,
                height: sub.height,
                data,
            };
            let max_bits = owned
                .data
                .iter()
                .map(|c| 32 - c.unsigned_abs().leading_zeros())
                .max()
                .unwrap_or(0)
                .max(1) as u8;
            if max_bits > 31 {
                return Err(J2kError::InvalidParameter("coefficient range exceeds 31 bits"));
            }

            let blocks = encode_subband(&owned, max_bits, &config.block)?;
            subbands.push(EncodedSubband {
                band: owned.band,
                level: owned.level,
                width: owned.width,
                height: owned.height,
                blocks,
            });
        }
        tiles.push(EncodedTile {
            x0,
            y0,
            width: w,
            height: h,
            subbands,
        });
    }

    Ok(EncodedImage {
        width,
        height,
        levels: config.levels,
        tile_size: config.tile_size,
        extension: config.extension,
        roi_shift,
        coding: config.block.coding.clone(),
        tiles,
    })
}

/// Decode an [`EncodedImage`] back into samples.
pub fn decode_image(image: &EncodedImage, parallel: bool) -> Result<Vec<i32>> {
    let mut out = vec![0i32; image.width * image.height];

    for tile in &image.tiles {
        // Subbands arrive coarsest first: LL, then HL/LH/HH per level from
        // coarse to fine.
        let mut iter = tile.subbands.iter();
        let ll_enc = iter
            .next()
            .ok_or(J2kError::DecodingError("tile without subbands"))?;
        if ll_enc.band != Subband::LL {
            return Err(J2kError::DecodingError("tile does not start with the LL subband"));
        }

        let decode_plane = |enc: &EncodedSubband| -> Result<SubbandData<i32>> {
            let mut data = decode_subband(&enc.blocks, enc.width, enc.height, &image.coding, parallel)?;
            if image.roi_shift > 0 {
                roi::remove_shift(&mut data, image.roi_shift)?;
            }
            Ok(SubbandData {
                band: enc.band,
                level: enc.level,
                width: enc.width,
                height: enc.height,
                data,
            })
        };

        let ll = decode_plane(ll_enc)?;
        let mut levels_rev = Vec::new();
        loop {
            let Some(hl_enc) = iter.next() else { break };
            let lh_enc = iter
                .next()
                .ok_or(J2kError::DecodingError("incomplete subband triplet"))?;
            let hh_enc = iter
                .next()
                .ok_or(J2kError::DecodingError("incomplete subband triplet"))?;
            levels_rev.push(DecompositionLevel {
                level: hl_enc.level,
                hl: decode_plane(hl_enc)?,
                lh: decode_plane(lh_enc)?,
                hh: decode_plane(hh_enc)?,
            });
        }
        levels_rev.reverse();

        let decomp = Decomposition {
            width: tile.width,
            height: tile.height,
            levels: levels_rev,
            ll,
        };
        let tile_samples = inverse_multi(&decomp, image.extension);

        for y in 0..tile.height {
            let dst = (tile.y0 + y) * image.width + tile.x0;
            out[dst..dst + tile.width]
                .copy_from_slice(&tile_samples[y * tile.width..(y + 1) * tile.width]);
        }
    }
    Ok(out)
}
