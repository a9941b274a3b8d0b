//! MagSgn stream: magnitudes of the significant samples.
//!
//! The cleanup pass knows the block-wide magnitude bit budget `M`, so every
//! significant sample stores `|c| - 1` in exactly `M` bits. Signs travel in
//! the VLC stream next to the significance patterns; this stream is
//! magnitudes only, read forward from its start.

use crate::bit_io::{BitPacker, BitUnpacker};
use crate::error::{J2kError, Result};

pub struct MagSgnEncoder {
    pack: BitPacker,
    width: u8,
}

impl MagSgnEncoder {
    pub fn new(width: u8) -> Self {
        Self {
            pack: BitPacker::new(),
            width,
        }
    }

    /// Store one magnitude (>= 1).
    pub fn encode(&mut self, magnitude: u32) {
        debug_assert!(magnitude >= 1);
        self.pack.write_bits(magnitude - 1, self.width);
    }

    pub fn finish(self) -> Vec<u8> {
        self.pack.finish()
    }
}

pub struct MagSgnDecoder<'a> {
    src: BitUnpacker<'a>,
    width: u8,
}

impl<'a> MagSgnDecoder<'a> {
    pub fn new(data: &'a [u8], width: u8) -> Self {
        Self {
            src: BitUnpacker::new(data),
            width,
        }
    }

    pub fn decode(&mut self) -> Result<u32> {
        let v = self.src.read_bits(self.width);
        if self.src.saw_end_of_data() {
            return Err(J2kError::InvalidHtBitstream("MagSgn stream exhausted"));
        }
        Ok(v + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitudes_round_trip() {
        let mags = [1u32, 2, 3, 100, 255, 256, 77];
        let mut enc = MagSgnEncoder::new(9);
        for &m in &mags {
            enc.encode(m);
        }
        let bytes = enc.finish();

        let mut dec = MagSgnDecoder::new(&bytes, 9);
        for &m in &mags {
            assert_eq!(dec.decode().unwrap(), m);
        }
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut dec = MagSgnDecoder::new(&[0x00], 9);
        assert!(dec.decode().is_err());
    }
}
