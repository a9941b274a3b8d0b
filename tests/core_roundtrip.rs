//! Cross-module scenarios for the compression core: the documented
//! invariants that tie the MQ coder, bit-plane coder, DWT, quantizer and ROI
//! processor together through the public API.

use j2kexp_rs::bit_plane_coder::{self, CodingOptions};
use j2kexp_rs::decomposition::{forward_multi, inverse_multi};
use j2kexp_rs::dwt::BoundaryExtension;
use j2kexp_rs::ht_block_coder;
use j2kexp_rs::mct;
use j2kexp_rs::mq_coder::{MqContext, MqDecoder, MqEncoder};
use j2kexp_rs::pipeline::{self, BlockPipelineOptions, CodingMode, EncoderConfig, RoiOptions};
use j2kexp_rs::quantization::{decode_step, dequantize_scalar, encode_step, quantize_scalar};
use j2kexp_rs::roi::{self, RoiRegion, RoiShape};
use j2kexp_rs::Subband;

/// S1: 1000 pseudo-random bits under one adaptive context compress to less
/// than n/8 + 16 bytes and decode back exactly.
#[test]
fn mq_sanity() {
    let mut state = 0x1234_5678u32;
    let bits: Vec<u8> = (0..1000)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 31) as u8
        })
        .collect();

    let mut enc = MqEncoder::new();
    let mut ctx = MqContext::default();
    for &b in &bits {
        enc.encode(b, &mut ctx);
    }
    let bytes = enc.finish();
    assert!(bytes.len() < 1000 / 8 + 16);

    let mut dec = MqDecoder::new(&bytes);
    let mut ctx = MqContext::default();
    for &b in &bits {
        assert_eq!(dec.decode(&mut ctx), b);
    }
}

/// S2: the 4x4 ramp block survives a 1-level 5/3 transform exactly.
#[test]
fn dwt53_4x4_round_trip() {
    let input: Vec<i32> = (1..=16).collect();
    let decomp = forward_multi(&input, 4, 4, 1, BoundaryExtension::Symmetric).unwrap();
    let output = inverse_multi(&decomp, BoundaryExtension::Symmetric);
    assert_eq!(input, output);
}

/// S3: the sparse diagonal block goes through the run-length path of the
/// cleanup pass and still round-trips exactly.
#[test]
fn bit_plane_rlc_round_trip() {
    let mut block = [0i32; 16];
    block[0] = 100;
    block[5] = -50;
    block[10] = 25;
    block[15] = -10;

    let options = CodingOptions::default();
    let encoded = bit_plane_coder::encode(&block, 4, 4, Subband::LL, 8, &options).unwrap();
    let decoded = bit_plane_coder::decode(
        &encoded.data,
        4,
        4,
        Subband::LL,
        8,
        encoded.zero_bit_planes,
        encoded.pass_count,
        &encoded.termination_offsets,
        &options,
    )
    .unwrap();
    assert!(!decoded.truncated);
    assert_eq!(decoded.coefficients, block);
}

/// S4: a parallel encode of a 128x128 image with three levels and 32x32
/// blocks is byte-identical to the sequential encode, for both block coders.
#[test]
fn parallel_equals_sequential() {
    let (w, h) = (128usize, 128usize);
    let samples: Vec<i32> = (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            (((x * x + 3 * y) % 255) as i32) - 127
        })
        .collect();

    for mode in [CodingMode::Legacy, CodingMode::Ht] {
        let make = |parallel: bool| {
            let config = EncoderConfig {
                levels: 3,
                block: BlockPipelineOptions {
                    mode,
                    nominal_block_size: 32,
                    parallel,
                    ..BlockPipelineOptions::default()
                },
                ..EncoderConfig::default()
            };
            pipeline::encode_image(&samples, w, h, &config).unwrap()
        };
        let seq = make(false);
        let par = make(true);
        assert_eq!(seq.tiles, par.tiles, "{mode:?} parallel output diverged");

        let decoded = pipeline::decode_image(&par, true).unwrap();
        assert_eq!(decoded, samples);
    }
}

/// S5: a rectangular ROI scales its coefficients by 2^5 and `remove`
/// recovers them.
#[test]
fn roi_scaling() {
    let regions = [RoiRegion {
        shape: RoiShape::Rect { x: 0, y: 0, width: 4, height: 4 },
        priority: 0,
    }];
    let mask = roi::rasterize(&regions, 8, 8).unwrap();
    let flat = mask.for_level(0, 8, 8);

    let original: Vec<i32> = (0..64).map(|i| (i as i32 % 7) - 3).collect();
    let mut coeffs = original.clone();
    roi::apply_shift(&mut coeffs, &flat, 5).unwrap();
    for (i, (&c, &o)) in coeffs.iter().zip(original.iter()).enumerate() {
        let (x, y) = (i % 8, i / 8);
        if x < 4 && y < 4 {
            assert_eq!(c, o * 32);
        } else {
            assert_eq!(c, o);
        }
    }
    roi::remove_shift(&mut coeffs, 5).unwrap();
    assert_eq!(coeffs, original);
}

/// S6: the (exponent, mantissa) codec stays within 1% across the dyadic
/// step sizes and maps zero to (0, 0) exactly.
#[test]
fn step_size_round_trip() {
    for step in [0.0625f32, 0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0] {
        let (e, m) = encode_step(step).unwrap();
        let back = decode_step(e, m);
        assert!(((back - step) / step).abs() <= 0.01, "{step} -> {back}");
    }
    assert_eq!(encode_step(0.0).unwrap(), (0, 0));
}

/// Scalar quantizer inverse property: re-quantizing a reconstruction gives
/// back the index.
#[test]
fn scalar_quantizer_inverse() {
    for q in -64..=64 {
        let r = dequantize_scalar(q, 0.75);
        assert_eq!(quantize_scalar(r, 0.75), q);
    }
}

/// An RCT'd color image through the reversible pipeline is lossless end to
/// end (the color layer owns the transform; the core must not break it).
#[test]
fn rct_through_reversible_pipeline() {
    let (w, h) = (32usize, 24usize);
    let plane = |seed: i32| -> Vec<i32> {
        (0..w * h).map(|i| ((i as i32 * seed) % 255) - 127).collect()
    };
    let (r0, g0, b0) = (plane(7), plane(13), plane(29));
    let (mut r, mut g, mut b) = (r0.clone(), g0.clone(), b0.clone());
    mct::forward_rct(&mut r, &mut g, &mut b).unwrap();

    let config = EncoderConfig { levels: 2, ..EncoderConfig::default() };
    for plane in [&mut r, &mut g, &mut b] {
        let encoded = pipeline::encode_image(plane, w, h, &config).unwrap();
        *plane = pipeline::decode_image(&encoded, false).unwrap();
    }

    mct::inverse_rct(&mut r, &mut g, &mut b).unwrap();
    assert_eq!((r, g, b), (r0, g0, b0));
}

/// HT cleanup metadata for an all-zero block: no passes, full zero-plane
/// count, all-zero decode.
#[test]
fn ht_zero_block_metadata() {
    let block = vec![0i32; 32 * 32];
    let encoded = ht_block_coder::encode(&block, 32, 32, 10, false).unwrap();
    assert_eq!(encoded.pass_count, 0);
    assert_eq!(encoded.zero_bit_planes, 10);

    let decoded = ht_block_coder::decode(&[], 32, 32, 10, 10, 0, &[]).unwrap();
    assert_eq!(decoded, block);
}

/// ROI through the full pipeline: MAXSHIFT scaling must not break the
/// lossless path.
#[test]
fn roi_through_pipeline_is_lossless() {
    let (w, h) = (48usize, 48usize);
    let samples: Vec<i32> = (0..w * h).map(|i| ((i * 11) % 200) as i32 - 100).collect();
    let config = EncoderConfig {
        levels: 2,
        roi: Some(RoiOptions {
            regions: vec![RoiRegion {
                shape: RoiShape::Ellipse { cx: 24.0, cy: 24.0, rx: 10.0, ry: 8.0 },
                priority: 3,
            }],
            shift: 12,
        }),
        ..EncoderConfig::default()
    };
    let encoded = pipeline::encode_image(&samples, w, h, &config).unwrap();
    let decoded = pipeline::decode_image(&encoded, false).unwrap();
    assert_eq!(decoded, samples);
}

/// The irreversible chain end to end: 9/7 decomposition, scalar
/// quantization with subband-derived steps, block coding, and back. The
/// reconstruction error stays within a few quantization steps.
#[test]
fn irreversible_chain_error_is_bounded() {
    use j2kexp_rs::decomposition::SubbandData;
    use j2kexp_rs::pipeline::{decode_subband, encode_subband};
    use j2kexp_rs::quantization::{QuantizerParams, StepDerivation};

    let (w, h) = (32usize, 32usize);
    let samples: Vec<f32> = (0..w * h)
        .map(|i| (((i % w) * 2 + (i / w) * 3) % 200) as f32 - 100.0)
        .collect();

    let levels = 2;
    let decomp = forward_multi(&samples, w, h, levels, BoundaryExtension::Symmetric).unwrap();
    let derivation = StepDerivation::new(0.25, false, levels).unwrap();
    let options = BlockPipelineOptions::default();

    // Quantize, entropy-code, decode and dequantize every subband.
    let mut recon = decomp.clone();
    let planes: Vec<SubbandData<f32>> = decomp
        .subbands()
        .map(|sub| {
            let step = if sub.band == Subband::LL {
                derivation.step_for(levels, Subband::LL).unwrap()
            } else {
                derivation.step_for(sub.level, sub.band).unwrap()
            };
            let quantizer = QuantizerParams::Scalar { step };
            let indices = quantizer.quantize(&sub.data).unwrap();

            let coded = SubbandData {
                band: sub.band,
                level: sub.level,
                width: sub.width,
                height: sub.height,
                data: indices,
            };
            let blocks = encode_subband(&coded, 31, &options).unwrap();
            let decoded = decode_subband(&blocks, sub.width, sub.height, &options.coding, false).unwrap();

            SubbandData {
                band: sub.band,
                level: sub.level,
                width: sub.width,
                height: sub.height,
                data: quantizer.dequantize(&decoded).unwrap(),
            }
        })
        .collect();

    let mut planes = planes.into_iter();
    recon.ll = planes.next().unwrap();
    for level in recon.levels.iter_mut().rev() {
        level.hl = planes.next().unwrap();
        level.lh = planes.next().unwrap();
        level.hh = planes.next().unwrap();
    }

    let output = inverse_multi(&recon, BoundaryExtension::Symmetric);
    let max_err = samples
        .iter()
        .zip(output.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(max_err < 10.0, "max reconstruction error {max_err}");
    // The chain is lossy but close: the gross shape must survive.
    assert!(max_err > 0.0);
}

/// Bypass and error-resilient termination both survive the full pipeline.
#[test]
fn termination_modes_through_pipeline() {
    let (w, h) = (40usize, 40usize);
    let samples: Vec<i32> = (0..w * h).map(|i| ((i * 31) % 255) as i32 - 127).collect();

    for coding in [
        CodingOptions { error_resilient: true, ..CodingOptions::default() },
        CodingOptions { bypass: true, bypass_msb_planes: 3, ..CodingOptions::default() },
        CodingOptions { segmentation_symbols: true, ..CodingOptions::default() },
    ] {
        let config = EncoderConfig {
            levels: 2,
            block: BlockPipelineOptions {
                coding: coding.clone(),
                nominal_block_size: 16,
                ..BlockPipelineOptions::default()
            },
            ..EncoderConfig::default()
        };
        let encoded = pipeline::encode_image(&samples, w, h, &config).unwrap();
        let decoded = pipeline::decode_image(&encoded, false).unwrap();
        assert_eq!(decoded, samples, "{coding:?}");
    }
}
