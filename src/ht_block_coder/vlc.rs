//! VLC coding of group significance patterns.
//!
//! Each significant 4-sample group carries a 4-bit pattern `rho` (bit k set
//! means sample k of the group is significant) followed by one raw sign bit
//! per significant sample. The pattern uses a complete prefix-free code over
//! all 16 values (Kraft sum exactly 1), so pattern decoding never dead-ends
//! on arbitrary bits; structural damage surfaces through the length prefixes
//! instead.

use crate::bit_io::{BitPacker, BitUnpacker};
use crate::error::{J2kError, Result};

/// (code length, codeword) per pattern value. Single-sample patterns get the
/// short codes; the rarely-hit dense patterns take the 6-bit tail.
#[rustfmt::skip]
const VLC_TABLE: [(u8, u8); 16] = [
    (5, 0b11100),  // 0b0000 (unused by cleanup; kept for completeness)
    (3, 0b000),    // 0b0001
    (3, 0b001),    // 0b0010
    (4, 0b1000),   // 0b0011
    (3, 0b010),    // 0b0100
    (4, 0b1001),   // 0b0101
    (4, 0b1010),   // 0b0110
    (6, 0b111100), // 0b0111
    (3, 0b011),    // 0b1000
    (4, 0b1011),   // 0b1001
    (4, 0b1100),   // 0b1010
    (6, 0b111101), // 0b1011
    (4, 0b1101),   // 0b1100
    (6, 0b111110), // 0b1101
    (6, 0b111111), // 0b1110
    (5, 0b11101),  // 0b1111
];

pub struct VlcEncoder {
    pack: BitPacker,
}

impl Default for VlcEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VlcEncoder {
    pub fn new() -> Self {
        Self { pack: BitPacker::new() }
    }

    pub fn encode_pattern(&mut self, rho: u8) {
        let (len, code) = VLC_TABLE[(rho & 0xF) as usize];
        self.pack.write_bits(code as u32, len);
    }

    pub fn encode_sign(&mut self, negative: bool) {
        self.pack.write_bit(negative as u8);
    }

    pub fn finish(self) -> Vec<u8> {
        self.pack.finish()
    }
}

pub struct VlcDecoder<'a> {
    src: BitUnpacker<'a>,
}

impl<'a> VlcDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { src: BitUnpacker::new(data) }
    }

    pub fn decode_pattern(&mut self) -> Result<u8> {
        // Walk the canonical prefix classes: 3-bit codes start 0.., 4-bit
        // codes 10.., 5-bit codes 1110.., 6-bit codes 1111...
        let v3 = self.src.read_bits(3);
        let key = if v3 < 0b100 {
            (3u8, v3)
        } else {
            let v4 = (v3 << 1) | self.src.read_bit() as u32;
            if v4 <= 0b1101 {
                (4, v4)
            } else {
                let v5 = (v4 << 1) | self.src.read_bit() as u32;
                if v5 <= 0b11101 {
                    (5, v5)
                } else {
                    (6, (v5 << 1) | self.src.read_bit() as u32)
                }
            }
        };
        if self.src.saw_end_of_data() {
            return Err(J2kError::InvalidHtBitstream("VLC stream exhausted mid-pattern"));
        }
        VLC_TABLE
            .iter()
            .position(|&(len, code)| (len, code as u32) == key)
            .map(|rho| rho as u8)
            .ok_or(J2kError::InvalidHtBitstream("unmatched VLC codeword"))
    }

    pub fn decode_sign(&mut self) -> Result<bool> {
        let bit = self.src.read_bit();
        if self.src.saw_end_of_data() {
            return Err(J2kError::InvalidHtBitstream("VLC stream exhausted mid-sign"));
        }
        Ok(bit == 1)
    }
}
