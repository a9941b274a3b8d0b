use thiserror::Error;

/// Errors surfaced by the compression core.
///
/// Core operations never recover internally; they either complete or hand one
/// of these upward. Malformed entropy-coded data inside the MQ decoder is NOT
/// an error: the decoder degrades by synthesizing marker bytes, and the
/// bit-plane layer reports truncation as a flag on its output record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum J2kError {
    /// A configuration value failed its precondition (zero dimension,
    /// bit depth out of range, shift too large, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Components disagree on dimensions or subsampling where agreement
    /// is required.
    #[error("invalid component configuration: {0}")]
    InvalidComponentConfiguration(&'static str),

    /// An input buffer length is inconsistent with the declared dimensions.
    #[error("invalid data: buffer length {actual} does not match declared size {expected}")]
    InvalidData { expected: usize, actual: usize },

    /// A payload was structurally malformed (bad segment length, truncated
    /// marker segment, impossible pass layout).
    #[error("decoding error: {0}")]
    DecodingError(&'static str),

    /// The entropy-coded stream ended before all declared coding passes.
    /// Magnitudes decoded so far remain valid; see
    /// [`DecodedBlock::truncated`](crate::bit_plane_coder::DecodedBlock).
    #[error("payload truncated before all declared coding passes")]
    TruncatedPayload,

    /// A quantization step size was zero or negative.
    #[error("invalid quantization step size")]
    InvalidStepSize,

    /// An HT (FBCOT) sub-stream contained an invalid codeword or the
    /// length prefixes do not add up.
    #[error("invalid HT bitstream: {0}")]
    InvalidHtBitstream(&'static str),

    /// Reserved for stub surfaces only; the core operations never return it.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, J2kError>;
