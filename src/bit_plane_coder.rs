//! EBCOT Tier-1 bit-plane coding (ISO/IEC 15444-1 Annex D).
//!
//! One code-block at a time: magnitudes are decomposed into bit-planes and
//! coded MSB-first in three passes per plane (significance propagation,
//! magnitude refinement, cleanup) over vertical stripes of four rows. The
//! first non-empty plane carries only a cleanup pass.
//!
//! Encoder and decoder share the scan loops and the neighborhood summaries so
//! the two sides cannot drift apart; the round-trip is bit-exact whenever the
//! declared bit depth accommodates every magnitude.

use crate::bit_io::{RawBitReader, RawBitWriter};
use crate::context_modeler::{magnitude_refinement_label, sign_coding_label, zero_coding_label};
use crate::error::{J2kError, Result};
use crate::mq_coder::{ContextSet, MqDecoder, MqEncoder, CTX_RUN, CTX_UNIFORM};
use crate::Subband;
use log::warn;

/// Tier-1 coding options: a couple of switches and one threshold.
#[derive(Debug, Clone)]
pub struct CodingOptions {
    /// Terminate the arithmetic coder after every coding pass
    /// (error-resilient mode).
    pub error_resilient: bool,
    /// Selective arithmetic coding bypass: significance and refinement
    /// passes switch to raw coding once enough planes have been coded.
    pub bypass: bool,
    /// Number of most-significant planes coded adaptively before bypass
    /// engages.
    pub bypass_msb_planes: u8,
    /// Emit the 1010 segmentation symbol on the UNIFORM context after each
    /// cleanup pass.
    pub segmentation_symbols: bool,
    /// Reset all context probabilities after every pass.
    pub reset_contexts: bool,
}

impl Default for CodingOptions {
    fn default() -> Self {
        Self {
            error_resilient: false,
            bypass: false,
            bypass_msb_planes: 4,
            segmentation_symbols: false,
            reset_contexts: false,
        }
    }
}

/// The encoded result for one code-block: payload bytes plus the numbers the
/// packet layer records about it. `termination_offsets` holds the cumulative
/// end offset of every terminated segment, so a decoder can split the payload
/// without re-deriving lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTier1 {
    pub data: Vec<u8>,
    pub pass_count: u8,
    pub zero_bit_planes: u8,
    pub termination_offsets: Vec<u32>,
}

/// Decoder output. `truncated` is a signal, not an error: when the payload
/// runs out before the declared pass count, everything decoded up to the last
/// completed pass is valid (quality truncation is how JPEG 2000 scales).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub coefficients: Vec<i32>,
    pub passes_decoded: u8,
    pub truncated: bool,
}

// Per-coefficient state bits.
const SIG: u8 = 1 << 0;
const CODED: u8 = 1 << 1;
const REFINED: u8 = 1 << 2;
const NEG: u8 = 1 << 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PassKind {
    SigProp,
    MagRef,
    Cleanup,
}

/// Pass `idx` of a block whose most significant coded plane is `top`:
/// pass 0 is the cleanup of plane `top`, after which each lower plane gets
/// the full SigProp/MagRef/Cleanup triplet.
fn pass_layout(idx: u8, top: u8) -> (PassKind, u8) {
    if idx == 0 {
        return (PassKind::Cleanup, top);
    }
    let group = (idx - 1) / 3;
    let kind = match (idx - 1) % 3 {
        0 => PassKind::SigProp,
        1 => PassKind::MagRef,
        _ => PassKind::Cleanup,
    };
    (kind, top - 1 - group)
}

fn pass_is_raw(options: &CodingOptions, kind: PassKind, plane: u8, top: u8) -> bool {
    options.bypass && kind != PassKind::Cleanup && (top - plane) >= options.bypass_msb_planes
}

/// Whether the coder terminates after pass `idx` out of `total`.
fn terminates_after(options: &CodingOptions, idx: u8, total: u8, top: u8) -> bool {
    if options.error_resilient || idx + 1 == total {
        return true;
    }
    let (kind, plane) = pass_layout(idx, top);
    let (next_kind, next_plane) = pass_layout(idx + 1, top);
    pass_is_raw(options, kind, plane, top) != pass_is_raw(options, next_kind, next_plane, top)
}

enum Sink {
    Mq(MqEncoder),
    Raw(RawBitWriter),
}

impl Sink {
    fn for_mode(raw: bool) -> Self {
        if raw {
            Sink::Raw(RawBitWriter::new())
        } else {
            Sink::Mq(MqEncoder::new())
        }
    }

    fn put(&mut self, bit: u8, label: usize, contexts: &mut ContextSet) {
        match self {
            Sink::Mq(enc) => enc.encode(bit, contexts.get_mut(label)),
            Sink::Raw(w) => w.write_bit(bit),
        }
    }

    fn is_raw(&self) -> bool {
        matches!(self, Sink::Raw(_))
    }

    fn finish(self) -> Vec<u8> {
        match self {
            Sink::Mq(enc) => enc.finish(),
            Sink::Raw(w) => w.finish(),
        }
    }
}

enum Source<'a> {
    Mq(MqDecoder<'a>),
    Raw(RawBitReader<'a>),
}

impl<'a> Source<'a> {
    fn for_mode(raw: bool, data: &'a [u8]) -> Self {
        if raw {
            Source::Raw(RawBitReader::new(data))
        } else {
            Source::Mq(MqDecoder::new(data))
        }
    }

    fn get(&mut self, label: usize, contexts: &mut ContextSet) -> u8 {
        match self {
            Source::Mq(dec) => dec.decode(contexts.get_mut(label)),
            Source::Raw(r) => r.read_bit(),
        }
    }

    fn is_raw(&self) -> bool {
        matches!(self, Source::Raw(_))
    }

    fn saw_end_of_data(&self) -> bool {
        match self {
            Source::Mq(dec) => dec.saw_end_of_data(),
            Source::Raw(r) => r.saw_end_of_data(),
        }
    }
}

/// Shared per-block coding state. The encoder fills `mag`/`NEG` up front from
/// the input coefficients; the decoder accumulates them plane by plane.
struct BlockCoder {
    width: usize,
    height: usize,
    band: Subband,
    state: Vec<u8>,
    mag: Vec<u32>,
    contexts: ContextSet,
}

impl BlockCoder {
    fn new(width: usize, height: usize, band: Subband) -> Self {
        Self {
            width,
            height,
            band,
            state: vec![0; width * height],
            mag: vec![0; width * height],
            contexts: ContextSet::new(),
        }
    }

    fn load(&mut self, coefficients: &[i32]) {
        for (i, &c) in coefficients.iter().enumerate() {
            self.mag[i] = c.unsigned_abs();
            if c < 0 {
                self.state[i] |= NEG;
            }
        }
    }

    #[inline]
    fn sig_at(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        (self.state[y as usize * self.width + x as usize] & SIG != 0) as u8
    }

    #[inline]
    fn neighbor_counts(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let (x, y) = (x as i64, y as i64);
        let h = self.sig_at(x - 1, y) + self.sig_at(x + 1, y);
        let v = self.sig_at(x, y - 1) + self.sig_at(x, y + 1);
        let d = self.sig_at(x - 1, y - 1)
            + self.sig_at(x + 1, y - 1)
            + self.sig_at(x - 1, y + 1)
            + self.sig_at(x + 1, y + 1);
        (h, v, d)
    }

    #[inline]
    fn neighborhood(&self, x: usize, y: usize) -> u8 {
        let (h, v, d) = self.neighbor_counts(x, y);
        h + v + d
    }

    /// Signed contribution of one neighbor for sign coding: +1 significant
    /// positive, -1 significant negative, 0 otherwise.
    #[inline]
    fn sign_contrib(&self, x: i64, y: i64) -> i8 {
        if self.sig_at(x, y) == 0 {
            return 0;
        }
        let i = y as usize * self.width + x as usize;
        if self.state[i] & NEG != 0 {
            -1
        } else {
            1
        }
    }

    fn sign_context(&self, x: usize, y: usize) -> (usize, u8) {
        let (x, y) = (x as i64, y as i64);
        let h = (self.sign_contrib(x - 1, y) + self.sign_contrib(x + 1, y)).clamp(-1, 1);
        let v = (self.sign_contrib(x, y - 1) + self.sign_contrib(x, y + 1)).clamp(-1, 1);
        sign_coding_label(h, v)
    }

    fn clear_coded_flags(&mut self) {
        for s in &mut self.state {
            *s &= !CODED;
        }
    }

    // --- encoder passes ---

    fn encode_sign(&mut self, x: usize, y: usize, i: usize, sink: &mut Sink) {
        let (label, xor) = self.sign_context(x, y);
        let sign = (self.state[i] & NEG != 0) as u8;
        let coded = if sink.is_raw() { sign } else { sign ^ xor };
        sink.put(coded, label, &mut self.contexts);
    }

    fn encode_sig_prop(&mut self, plane: u8, sink: &mut Sink) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                for y in stripe..stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & SIG != 0 {
                        continue;
                    }
                    let (h, v, d) = self.neighbor_counts(x, y);
                    if h + v + d == 0 {
                        continue;
                    }
                    let bit = ((self.mag[i] >> plane) & 1) as u8;
                    sink.put(bit, zero_coding_label(self.band, h, v, d), &mut self.contexts);
                    self.state[i] |= CODED;
                    if bit == 1 {
                        self.encode_sign(x, y, i, sink);
                        self.state[i] |= SIG;
                    }
                }
            }
        }
    }

    fn encode_mag_ref(&mut self, plane: u8, sink: &mut Sink) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                for y in stripe..stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & SIG == 0 || self.state[i] & CODED != 0 {
                        continue;
                    }
                    let label = magnitude_refinement_label(
                        self.state[i] & REFINED != 0,
                        self.neighborhood(x, y) > 0,
                    );
                    let bit = ((self.mag[i] >> plane) & 1) as u8;
                    sink.put(bit, label, &mut self.contexts);
                    self.state[i] |= REFINED;
                }
            }
        }
    }

    fn encode_cleanup(&mut self, plane: u8, sink: &mut Sink) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                let mut y = stripe;
                while y < stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & (SIG | CODED) != 0 {
                        y += 1;
                        continue;
                    }

                    // Run-length mode: a full stripe column whose entire
                    // neighborhood is empty collapses into one RUN decision.
                    if y == stripe
                        && stripe_end - stripe == 4
                        && (0..4).all(|k| self.neighborhood(x, stripe + k) == 0)
                    {
                        let first =
                            (0..4).find(|&k| (self.mag[(stripe + k) * self.width + x] >> plane) & 1 == 1);
                        match first {
                            None => {
                                sink.put(0, CTX_RUN, &mut self.contexts);
                                y = stripe + 4;
                            }
                            Some(r) => {
                                sink.put(1, CTX_RUN, &mut self.contexts);
                                sink.put(((r >> 1) & 1) as u8, CTX_UNIFORM, &mut self.contexts);
                                sink.put((r & 1) as u8, CTX_UNIFORM, &mut self.contexts);
                                let ry = stripe + r;
                                let ri = ry * self.width + x;
                                self.encode_sign(x, ry, ri, sink);
                                self.state[ri] |= SIG;
                                y = ry + 1;
                            }
                        }
                        continue;
                    }

                    let (h, v, d) = self.neighbor_counts(x, y);
                    let bit = ((self.mag[i] >> plane) & 1) as u8;
                    sink.put(bit, zero_coding_label(self.band, h, v, d), &mut self.contexts);
                    if bit == 1 {
                        self.encode_sign(x, y, i, sink);
                        self.state[i] |= SIG;
                    }
                    y += 1;
                }
            }
        }
    }

    // --- decoder passes ---

    fn decode_sign(&mut self, x: usize, y: usize, i: usize, src: &mut Source) {
        let (label, xor) = self.sign_context(x, y);
        let bit = src.get(label, &mut self.contexts);
        let sign = if src.is_raw() { bit } else { bit ^ xor };
        if sign == 1 {
            self.state[i] |= NEG;
        }
    }

    fn decode_sig_prop(&mut self, plane: u8, src: &mut Source) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                for y in stripe..stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & SIG != 0 {
                        continue;
                    }
                    let (h, v, d) = self.neighbor_counts(x, y);
                    if h + v + d == 0 {
                        continue;
                    }
                    let bit = src.get(zero_coding_label(self.band, h, v, d), &mut self.contexts);
                    self.state[i] |= CODED;
                    if bit == 1 {
                        self.mag[i] |= 1 << plane;
                        self.decode_sign(x, y, i, src);
                        self.state[i] |= SIG;
                    }
                }
            }
        }
    }

    fn decode_mag_ref(&mut self, plane: u8, src: &mut Source) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                for y in stripe..stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & SIG == 0 || self.state[i] & CODED != 0 {
                        continue;
                    }
                    let label = magnitude_refinement_label(
                        self.state[i] & REFINED != 0,
                        self.neighborhood(x, y) > 0,
                    );
                    let bit = src.get(label, &mut self.contexts);
                    self.mag[i] |= (bit as u32) << plane;
                    self.state[i] |= REFINED;
                }
            }
        }
    }

    fn decode_cleanup(&mut self, plane: u8, src: &mut Source) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);
            for x in 0..self.width {
                let mut y = stripe;
                while y < stripe_end {
                    let i = y * self.width + x;
                    if self.state[i] & (SIG | CODED) != 0 {
                        y += 1;
                        continue;
                    }

                    if y == stripe
                        && stripe_end - stripe == 4
                        && (0..4).all(|k| self.neighborhood(x, stripe + k) == 0)
                    {
                        let run_bit = src.get(CTX_RUN, &mut self.contexts);
                        if run_bit == 0 {
                            y = stripe + 4;
                            continue;
                        }
                        let r = ((src.get(CTX_UNIFORM, &mut self.contexts) << 1)
                            | src.get(CTX_UNIFORM, &mut self.contexts))
                            as usize;
                        let ry = stripe + r;
                        let ri = ry * self.width + x;
                        self.mag[ri] |= 1 << plane;
                        self.decode_sign(x, ry, ri, src);
                        self.state[ri] |= SIG;
                        y = ry + 1;
                        continue;
                    }

                    let (h, v, d) = self.neighbor_counts(x, y);
                    let bit = src.get(zero_coding_label(self.band, h, v, d), &mut self.contexts);
                    if bit == 1 {
                        self.mag[i] |= 1 << plane;
                        self.decode_sign(x, y, i, src);
                        self.state[i] |= SIG;
                    }
                    y += 1;
                }
            }
        }
    }

    fn coefficients(&self) -> Vec<i32> {
        self.mag
            .iter()
            .zip(self.state.iter())
            .map(|(&m, &s)| {
                let v = m as i32;
                if s & NEG != 0 { -v } else { v }
            })
            .collect()
    }
}

fn validate_dims(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 || width > 64 || height > 64 {
        return Err(J2kError::InvalidParameter("code-block dimensions must be 1..=64"));
    }
    Ok(())
}

/// Encode one code-block of quantized coefficients.
///
/// `bit_depth` is the magnitude budget; the difference between it and the
/// actual most significant plane becomes the zero-bit-plane count.
pub fn encode(
    coefficients: &[i32],
    width: usize,
    height: usize,
    band: Subband,
    bit_depth: u8,
    options: &CodingOptions,
) -> Result<EncodedTier1> {
    validate_dims(width, height)?;
    if !(1..=31).contains(&bit_depth) {
        return Err(J2kError::InvalidParameter("bit depth must be 1..=31"));
    }
    if coefficients.len() != width * height {
        return Err(J2kError::InvalidData {
            expected: width * height,
            actual: coefficients.len(),
        });
    }

    let max = coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
    let planes = (32 - max.leading_zeros()) as u8;
    if planes > bit_depth {
        return Err(J2kError::InvalidParameter("bit depth too small for coefficient magnitudes"));
    }
    if planes == 0 {
        return Ok(EncodedTier1 {
            data: Vec::new(),
            pass_count: 0,
            zero_bit_planes: bit_depth,
            termination_offsets: Vec::new(),
        });
    }

    let total = 3 * planes - 2;
    let top = planes - 1;
    let mut coder = BlockCoder::new(width, height, band);
    coder.load(coefficients);

    let mut data = Vec::new();
    let mut offsets = Vec::new();
    let mut sink: Option<Sink> = None;

    for idx in 0..total {
        let (kind, plane) = pass_layout(idx, top);
        let raw = pass_is_raw(options, kind, plane, top);
        let sink_ref = sink.get_or_insert_with(|| Sink::for_mode(raw));

        match kind {
            PassKind::SigProp => coder.encode_sig_prop(plane, sink_ref),
            PassKind::MagRef => coder.encode_mag_ref(plane, sink_ref),
            PassKind::Cleanup => {
                coder.encode_cleanup(plane, sink_ref);
                if options.segmentation_symbols {
                    for bit in [1, 0, 1, 0] {
                        sink_ref.put(bit, CTX_UNIFORM, &mut coder.contexts);
                    }
                }
                coder.clear_coded_flags();
            }
        }
        if options.reset_contexts {
            coder.contexts.reset();
        }

        if terminates_after(options, idx, total, top) {
            let bytes = sink.take().expect("active segment").finish();
            data.extend_from_slice(&bytes);
            offsets.push(data.len() as u32);
        }
    }

    Ok(EncodedTier1 {
        data,
        pass_count: total,
        zero_bit_planes: bit_depth - planes,
        termination_offsets: offsets,
    })
}

/// Decode one code-block payload back into coefficients.
///
/// Runs the declared passes until they complete or the payload runs dry;
/// in the latter case the output carries `truncated = true` and every pass
/// that completed remains valid.
#[allow(clippy::too_many_arguments)]
pub fn decode(
    payload: &[u8],
    width: usize,
    height: usize,
    band: Subband,
    bit_depth: u8,
    zero_bit_planes: u8,
    pass_count: u8,
    termination_offsets: &[u32],
    options: &CodingOptions,
) -> Result<DecodedBlock> {
    validate_dims(width, height)?;
    if !(1..=31).contains(&bit_depth) {
        return Err(J2kError::InvalidParameter("bit depth must be 1..=31"));
    }
    if zero_bit_planes > bit_depth {
        return Err(J2kError::DecodingError("zero bit-plane count exceeds bit depth"));
    }

    let size = width * height;
    if pass_count == 0 {
        return Ok(DecodedBlock {
            coefficients: vec![0; size],
            passes_decoded: 0,
            truncated: false,
        });
    }

    let planes = bit_depth - zero_bit_planes;
    if planes == 0 {
        return Err(J2kError::DecodingError("coding passes declared with no magnitude planes"));
    }
    if pass_count > 3 * planes - 2 {
        return Err(J2kError::DecodingError("pass count exceeds the bit-plane budget"));
    }

    let top = planes - 1;
    let mut coder = BlockCoder::new(width, height, band);

    let mut truncated = false;
    let mut passes_decoded = 0u8;
    let mut seg_start = 0usize;
    let mut seg_idx = 0usize;
    let mut idx = 0u8;

    'segments: while idx < pass_count {
        let (kind, plane) = pass_layout(idx, top);
        let raw = pass_is_raw(options, kind, plane, top);

        // The segment spans every pass up to the next termination point.
        let mut last = idx;
        while !terminates_after(options, last, pass_count, top) {
            last += 1;
        }

        let declared_end = if seg_idx < termination_offsets.len() {
            termination_offsets[seg_idx] as usize
        } else {
            payload.len()
        };
        if declared_end < seg_start {
            return Err(J2kError::DecodingError("termination offsets are not ascending"));
        }
        // Truncation is detected structurally: the offsets promise more bytes
        // than the payload delivers. Running into marker emulation at the
        // tail of a complete segment is normal flush behavior, never an
        // error.
        let short_segment = declared_end > payload.len();
        let seg_end = declared_end.min(payload.len());
        if short_segment {
            truncated = true;
            if seg_start >= payload.len() {
                break;
            }
        }

        let mut src = Source::for_mode(raw, &payload[seg_start..seg_end]);

        for pass in idx..=last {
            let (kind, plane) = pass_layout(pass, top);
            match kind {
                PassKind::SigProp => coder.decode_sig_prop(plane, &mut src),
                PassKind::MagRef => coder.decode_mag_ref(plane, &mut src),
                PassKind::Cleanup => {
                    coder.decode_cleanup(plane, &mut src);
                    if options.segmentation_symbols {
                        let mut symbol = 0u8;
                        for _ in 0..4 {
                            symbol = (symbol << 1) | src.get(CTX_UNIFORM, &mut coder.contexts);
                        }
                        if symbol != 0b1010 {
                            warn!("segmentation symbol mismatch after cleanup pass {pass}; stopping");
                            truncated = true;
                            break 'segments;
                        }
                    }
                    coder.clear_coded_flags();
                }
            }
            if options.reset_contexts {
                coder.contexts.reset();
            }
            passes_decoded = pass + 1;

            if short_segment && src.saw_end_of_data() {
                break 'segments;
            }
        }

        seg_start = seg_end;
        seg_idx += 1;
        idx = last + 1;
    }

    Ok(DecodedBlock {
        coefficients: coder.coefficients(),
        passes_decoded,
        truncated,
    })
}
