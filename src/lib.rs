/*!
# j2kexp-rs

`j2kexp-rs` is a pure Rust implementation of the JPEG 2000 compression core:
the numerical and bit-level machinery that turns pixel samples into
code-block payloads and back. It covers both the Part 1 (ISO/IEC 15444-1)
and High-Throughput Part 15 (ISO/IEC 15444-15) coding paths.

## Subsystems

- **Tier-1 (legacy)**: MQ arithmetic coder, EBCOT context modeling and
  bit-plane coding. Modules: `mq_coder`, `context_modeler`, `bit_plane_coder`.
- **HT (FBCOT)**: MEL run coder, VLC significance patterns, MagSgn magnitude
  stream. Module: `ht_block_coder`.
- **Wavelets**: reversible 5/3 and irreversible 9/7 lifting with symmetric,
  periodic and zero-padding extension; multi-level tiled decomposition.
  Modules: `dwt`, `decomposition`.
- **Quantization**: scalar/deadzone with subband gains and the
  (exponent, mantissa) step codec, plus trellis-coded quantization.
  Modules: `quantization`, `trellis`.
- **ROI**: MAXSHIFT region scaling. Module: `roi`.
- **Pipeline**: code-block partitioning, legacy/HT dispatch, parallel block
  coding with deterministic assembly. Module: `pipeline`.

Codestream framing (markers, packets, tag trees) and container boxes are the
caller's business: the core consumes and produces code-block payloads plus
the header numbers (`markers` holds the marker codes and the few segment
payloads whose contents are core-derived).

## Safety

Pure Rust, no `unsafe`. Malformed payloads degrade (truncation is data, not
a panic); only violated internal invariants abort.
*/

pub mod bit_io;
pub mod bit_plane_coder;
pub mod context_modeler;
pub mod decomposition;
pub mod dwt;
pub mod error;
pub mod ht_block_coder;
pub mod markers;
pub mod mct;
pub mod mq_coder;
pub mod pipeline;
pub mod quantization;
pub mod roi;
pub mod trellis;

pub use error::{J2kError, Result};
pub use pipeline::{CodingMode, EncodedBlock, EncodedImage, EncoderConfig};

/// Basic information about an image frame handed to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Width of the frame in pixels.
    pub width: u32,
    /// Height of the frame in pixels.
    pub height: u32,
    /// Bits per sample (2-16).
    pub bits_per_sample: u8,
    /// Number of components (e.g. 1 for grayscale, 3 for RGB).
    pub component_count: u8,
}

/// Subband orientation produced by one 2-D wavelet split.
///
/// LL exists only at the coarsest resolution level; the other three appear
/// at every level. The orientation selects the context-label family of the
/// bit-plane coder and the gain factor of the quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subband {
    #[default]
    LL,
    HL,
    LH,
    HH,
}
