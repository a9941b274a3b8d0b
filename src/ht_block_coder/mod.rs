//! High-Throughput block coding (FBCOT, ISO/IEC 15444-15).
//!
//! One non-iterative cleanup pass replaces the legacy plane-by-plane walk.
//! The block is scanned in 4-sample column groups; three coordinated
//! sub-streams carry the result:
//!
//! - **MEL** codes the per-group significance decisions as adaptive runs,
//! - **VLC** codes each significant group's 4-bit pattern plus sign bits,
//! - **MagSgn** carries the magnitudes at the block's fixed bit width.
//!
//! The cleanup segment stores `(mel_len: u16, vlc_len: u16, magsgn_len: u32)`
//! big-endian, then the three streams back to back, so the decoder can split
//! without trusting anything outside the payload.
//!
//! The optional SigProp/MagRef passes restrict the cleanup to planes >= 1 and
//! carry the final plane raw, each as its own byte-aligned segment. Samples
//! of magnitude 1 with no significant neighbor sit below that threshold --
//! exactly the coefficients a quality-truncated legacy stream drops too.

pub mod mag_sgn;
pub mod mel;
pub mod vlc;

use crate::bit_io::{BitPacker, BitUnpacker};
use crate::error::{J2kError, Result};
use mag_sgn::{MagSgnDecoder, MagSgnEncoder};
use mel::{MelDecoder, MelEncoder};
use vlc::{VlcDecoder, VlcEncoder};

/// Encoded HT block: payload plus the numbers the packet layer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHtBlock {
    pub data: Vec<u8>,
    pub pass_count: u8,
    pub zero_bit_planes: u8,
    pub termination_offsets: Vec<u32>,
}

/// CAP segment payload announcing HT code-blocks: Pcap with bit 15 set plus
/// one Ccap16 word whose low bit flags mixed legacy+HT tiles.
pub fn cap_payload(mixed_mode: bool) -> Vec<u8> {
    let pcap: u32 = 1 << 15;
    let ccap: u16 = mixed_mode as u16;
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&pcap.to_be_bytes());
    out.extend_from_slice(&ccap.to_be_bytes());
    out
}

/// CPF segment payload: profile 0 is reversible, profile 1 irreversible.
pub fn cpf_payload(irreversible: bool) -> [u8; 2] {
    (irreversible as u16).to_be_bytes()
}

/// Iterate the block as stripe-column groups: `(x, y_top, group_len)`.
fn groups(width: usize, height: usize) -> impl Iterator<Item = (usize, usize, usize)> {
    (0..height).step_by(4).flat_map(move |stripe| {
        let len = 4.min(height - stripe);
        (0..width).map(move |x| (x, stripe, len))
    })
}

fn validate(coeff_len: usize, width: usize, height: usize, bit_depth: u8) -> Result<()> {
    if width == 0 || height == 0 || width > 64 || height > 64 {
        return Err(J2kError::InvalidParameter("code-block dimensions must be 1..=64"));
    }
    if !(1..=31).contains(&bit_depth) {
        return Err(J2kError::InvalidParameter("bit depth must be 1..=31"));
    }
    if coeff_len != width * height {
        return Err(J2kError::InvalidData {
            expected: width * height,
            actual: coeff_len,
        });
    }
    Ok(())
}

#[inline]
fn any_significant_neighbor(sigma: &[bool], width: usize, height: usize, x: usize, y: usize) -> bool {
    let (xi, yi) = (x as i64, y as i64);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (xi + dx, yi + dy);
            if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64
                && sigma[ny as usize * width + nx as usize]
            {
                return true;
            }
        }
    }
    false
}

/// Encode one code-block with the HT cleanup pass, optionally followed by
/// the SigProp and MagRef refinement passes.
pub fn encode(
    coefficients: &[i32],
    width: usize,
    height: usize,
    bit_depth: u8,
    refinement: bool,
) -> Result<EncodedHtBlock> {
    validate(coefficients.len(), width, height, bit_depth)?;

    let max = coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
    let planes = (32 - max.leading_zeros()) as u8;
    if planes > bit_depth {
        return Err(J2kError::InvalidParameter("bit depth too small for coefficient magnitudes"));
    }
    if planes == 0 {
        return Ok(EncodedHtBlock {
            data: Vec::new(),
            pass_count: 0,
            zero_bit_planes: bit_depth,
            termination_offsets: Vec::new(),
        });
    }

    // Refinement needs at least one plane left for the cleanup to code.
    let refine = refinement && planes > 1;
    let cleanup_width = planes - refine as u8;
    let shift = refine as u32;

    let mags: Vec<u32> = coefficients.iter().map(|c| c.unsigned_abs() >> shift).collect();

    let mut mel = MelEncoder::new();
    let mut vlc = VlcEncoder::new();
    let mut magsgn = MagSgnEncoder::new(cleanup_width);

    for (x, y0, len) in groups(width, height) {
        let mut rho = 0u8;
        for k in 0..len {
            if mags[(y0 + k) * width + x] != 0 {
                rho |= 1 << k;
            }
        }
        mel.encode(rho != 0);
        if rho != 0 {
            vlc.encode_pattern(rho);
            for k in 0..len {
                if rho & (1 << k) != 0 {
                    let i = (y0 + k) * width + x;
                    vlc.encode_sign(coefficients[i] < 0);
                    magsgn.encode(mags[i]);
                }
            }
        }
    }

    let mel_bytes = mel.finish();
    let vlc_bytes = vlc.finish();
    let magsgn_bytes = magsgn.finish();

    let mut data = Vec::with_capacity(8 + mel_bytes.len() + vlc_bytes.len() + magsgn_bytes.len());
    data.extend_from_slice(&(mel_bytes.len() as u16).to_be_bytes());
    data.extend_from_slice(&(vlc_bytes.len() as u16).to_be_bytes());
    data.extend_from_slice(&(magsgn_bytes.len() as u32).to_be_bytes());
    data.extend_from_slice(&mel_bytes);
    data.extend_from_slice(&vlc_bytes);
    data.extend_from_slice(&magsgn_bytes);

    let mut offsets = vec![data.len() as u32];
    let mut pass_count = 1u8;

    if refine {
        // Significance after cleanup; SigProp evolves its own copy.
        let cleanup_sigma: Vec<bool> = mags.iter().map(|&m| m != 0).collect();
        let mut sigma = cleanup_sigma.clone();

        let mut sig = BitPacker::new();
        for (x, y0, len) in groups(width, height) {
            for k in 0..len {
                let y = y0 + k;
                let i = y * width + x;
                if sigma[i] || !any_significant_neighbor(&sigma, width, height, x, y) {
                    continue;
                }
                let bit = (coefficients[i].unsigned_abs() & 1) as u8;
                sig.write_bit(bit);
                if bit == 1 {
                    sig.write_bit((coefficients[i] < 0) as u8);
                    sigma[i] = true;
                }
            }
        }
        data.extend_from_slice(&sig.finish());
        offsets.push(data.len() as u32);
        pass_count = 2;

        let mut refp = BitPacker::new();
        for (x, y0, len) in groups(width, height) {
            for k in 0..len {
                let i = (y0 + k) * width + x;
                if cleanup_sigma[i] {
                    refp.write_bit((coefficients[i].unsigned_abs() & 1) as u8);
                }
            }
        }
        data.extend_from_slice(&refp.finish());
        offsets.push(data.len() as u32);
        pass_count = 3;
    }

    Ok(EncodedHtBlock {
        data,
        pass_count,
        zero_bit_planes: bit_depth - planes,
        termination_offsets: offsets,
    })
}

/// Decode one HT code-block payload.
pub fn decode(
    payload: &[u8],
    width: usize,
    height: usize,
    bit_depth: u8,
    zero_bit_planes: u8,
    pass_count: u8,
    termination_offsets: &[u32],
) -> Result<Vec<i32>> {
    validate(width * height, width, height, bit_depth)?;
    if zero_bit_planes > bit_depth {
        return Err(J2kError::DecodingError("zero bit-plane count exceeds bit depth"));
    }

    let size = width * height;
    if pass_count == 0 {
        return Ok(vec![0; size]);
    }
    if pass_count > 3 || pass_count == 2 && termination_offsets.len() < 2 {
        return Err(J2kError::InvalidHtBitstream("impossible HT pass layout"));
    }

    let planes = bit_depth - zero_bit_planes;
    let refine = pass_count > 1;
    if planes == 0 || (refine && planes < 2) {
        return Err(J2kError::InvalidHtBitstream("pass layout inconsistent with plane count"));
    }
    let cleanup_width = planes - refine as u8;
    let shift = refine as u32;

    // Split the terminated segments.
    let seg_end = |idx: usize| -> Result<usize> {
        let end = if idx < termination_offsets.len() {
            termination_offsets[idx] as usize
        } else if idx == 0 {
            payload.len()
        } else {
            return Err(J2kError::InvalidHtBitstream("missing segment offsets"));
        };
        if end > payload.len() {
            return Err(J2kError::InvalidHtBitstream("segment offset beyond payload"));
        }
        Ok(end)
    };

    let cleanup_end = seg_end(0)?;
    let cleanup_seg = &payload[..cleanup_end];
    if cleanup_seg.len() < 8 {
        return Err(J2kError::InvalidHtBitstream("cleanup segment shorter than its header"));
    }
    let mel_len = u16::from_be_bytes([cleanup_seg[0], cleanup_seg[1]]) as usize;
    let vlc_len = u16::from_be_bytes([cleanup_seg[2], cleanup_seg[3]]) as usize;
    let magsgn_len =
        u32::from_be_bytes([cleanup_seg[4], cleanup_seg[5], cleanup_seg[6], cleanup_seg[7]]) as usize;
    if 8 + mel_len + vlc_len + magsgn_len != cleanup_seg.len() {
        return Err(J2kError::InvalidHtBitstream("length prefixes disagree with segment size"));
    }

    let mel_data = &cleanup_seg[8..8 + mel_len];
    let vlc_data = &cleanup_seg[8 + mel_len..8 + mel_len + vlc_len];
    let magsgn_data = &cleanup_seg[8 + mel_len + vlc_len..];

    let mut mel = MelDecoder::new(mel_data);
    let mut vlc = VlcDecoder::new(vlc_data);
    let mut magsgn = MagSgnDecoder::new(magsgn_data, cleanup_width);

    let mut mags = vec![0u32; size];
    let mut negative = vec![false; size];

    for (x, y0, len) in groups(width, height) {
        if !mel.decode() {
            continue;
        }
        let rho = vlc.decode_pattern()?;
        if rho == 0 || (rho >> len) != 0 {
            return Err(J2kError::InvalidHtBitstream("significance pattern addresses missing samples"));
        }
        for k in 0..len {
            if rho & (1 << k) != 0 {
                let i = (y0 + k) * width + x;
                negative[i] = vlc.decode_sign()?;
                mags[i] = magsgn.decode()? << shift;
            }
        }
    }

    if refine {
        let cleanup_sigma: Vec<bool> = mags.iter().map(|&m| m != 0).collect();
        let mut sigma = cleanup_sigma.clone();

        let sig_end = seg_end(1)?;
        if sig_end < cleanup_end {
            return Err(J2kError::InvalidHtBitstream("segment offsets are not ascending"));
        }
        let mut sig = BitUnpacker::new(&payload[cleanup_end..sig_end]);
        for (x, y0, len) in groups(width, height) {
            for k in 0..len {
                let y = y0 + k;
                let i = y * width + x;
                if sigma[i] || !any_significant_neighbor(&sigma, width, height, x, y) {
                    continue;
                }
                if sig.read_bit() == 1 {
                    negative[i] = sig.read_bit() == 1;
                    mags[i] = 1;
                    sigma[i] = true;
                }
            }
        }
        if sig.saw_end_of_data() {
            return Err(J2kError::InvalidHtBitstream("SigProp segment exhausted"));
        }

        if pass_count == 3 {
            let ref_end = seg_end(2)?;
            if ref_end < sig_end {
                return Err(J2kError::InvalidHtBitstream("segment offsets are not ascending"));
            }
            let mut refp = BitUnpacker::new(&payload[sig_end..ref_end]);
            for (x, y0, len) in groups(width, height) {
                for k in 0..len {
                    let i = (y0 + k) * width + x;
                    if cleanup_sigma[i] {
                        mags[i] |= refp.read_bit() as u32;
                    }
                }
            }
            if refp.saw_end_of_data() {
                return Err(J2kError::InvalidHtBitstream("MagRef segment exhausted"));
            }
        }
    }

    Ok(mags
        .iter()
        .zip(negative.iter())
        .map(|(&m, &neg)| if neg { -(m as i32) } else { m as i32 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[i32], w: usize, h: usize, depth: u8, refinement: bool) {
        let encoded = encode(data, w, h, depth, refinement).unwrap();
        let decoded = decode(
            &encoded.data,
            w,
            h,
            depth,
            encoded.zero_bit_planes,
            encoded.pass_count,
            &encoded.termination_offsets,
        )
        .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn all_zero_cleanup_block() {
        let data = vec![0i32; 64];
        let encoded = encode(&data, 8, 8, 8, false).unwrap();
        assert_eq!(encoded.pass_count, 0);
        assert_eq!(encoded.zero_bit_planes, 8);
        assert!(encoded.data.is_empty());

        let decoded = decode(&[], 8, 8, 8, 8, 0, &[]).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn sparse_block_round_trip() {
        let mut data = vec![0i32; 64];
        data[0] = 120;
        data[9] = -3;
        data[37] = 55;
        data[63] = -1;
        round_trip(&data, 8, 8, 8, false);
    }

    #[test]
    fn dense_block_round_trip() {
        let data: Vec<i32> = (0..1024).map(|i| ((i * 131) % 511) as i32 - 255).collect();
        round_trip(&data, 32, 32, 10, false);
    }

    #[test]
    fn partial_group_heights() {
        for h in [1usize, 2, 3, 5, 6, 7] {
            let data: Vec<i32> = (0..(6 * h)).map(|i| (i as i32 % 19) - 9).collect();
            round_trip(&data, 6, h, 8, false);
        }
    }

    #[test]
    fn refinement_passes_round_trip() {
        // Every non-zero sample has magnitude >= 2, so the final plane is
        // fully recoverable from the SigProp/MagRef segments.
        let data: Vec<i32> = (0..256)
            .map(|i| {
                let v = ((i * 37) % 97) as i32 - 48;
                if v.abs() < 2 { 0 } else { v }
            })
            .collect();
        let encoded = encode(&data, 16, 16, 8, true).unwrap();
        assert_eq!(encoded.pass_count, 3);
        assert_eq!(encoded.termination_offsets.len(), 3);
        let decoded = decode(
            &encoded.data,
            16,
            16,
            8,
            encoded.zero_bit_planes,
            encoded.pass_count,
            &encoded.termination_offsets,
        )
        .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn refinement_degrades_to_cleanup_for_single_plane() {
        let data = vec![1i32, 0, -1, 0];
        let encoded = encode(&data, 2, 2, 8, true).unwrap();
        assert_eq!(encoded.pass_count, 1);
        let decoded =
            decode(&encoded.data, 2, 2, 8, encoded.zero_bit_planes, 1, &encoded.termination_offsets)
                .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn tampered_length_prefix_is_rejected() {
        let data: Vec<i32> = (0..16).map(|i| i as i32 - 8).collect();
        let mut encoded = encode(&data, 4, 4, 8, false).unwrap();
        encoded.data[1] = encoded.data[1].wrapping_add(1);
        let err = decode(
            &encoded.data,
            4,
            4,
            8,
            encoded.zero_bit_planes,
            encoded.pass_count,
            &encoded.termination_offsets,
        )
        .unwrap_err();
        assert!(matches!(err, J2kError::InvalidHtBitstream(_)));
    }

    #[test]
    fn cap_and_cpf_payloads() {
        let cap = cap_payload(false);
        assert_eq!(cap.len(), 6);
        // Pcap bit 15 announces HT code-streams.
        let pcap = u32::from_be_bytes([cap[0], cap[1], cap[2], cap[3]]);
        assert_eq!(pcap & (1 << 15), 1 << 15);
        assert_eq!(&cap[4..], &[0, 0]);
        assert_eq!(cap_payload(true)[5], 1);

        assert_eq!(cpf_payload(false), [0, 0]);
        assert_eq!(cpf_payload(true), [0, 1]);
    }
}
