//! MEL adaptive run-length coding (ISO/IEC 15444-15, the low-complexity
//! companion to the VLC/MagSgn streams).
//!
//! MEL codes the per-group "is anything here significant" decisions. Runs of
//! insignificant groups collapse into single bits through a 13-state
//! exponent ladder with hysteresis: a completed run of 2^E zeros emits one
//! 0-bit and climbs the ladder; a significant group emits a 1-bit followed by
//! E bits giving the interrupted run's length, and steps back down.

use crate::bit_io::{BitPacker, BitUnpacker};

/// Exponent ladder. State k codes runs of 2^MEL_E[k] insignificant groups.
const MEL_E: [u8; 13] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 4, 5];

const MAX_STATE: usize = MEL_E.len() - 1;

pub struct MelEncoder {
    pack: BitPacker,
    state: usize,
    run: u32,
}

impl Default for MelEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MelEncoder {
    pub fn new() -> Self {
        Self {
            pack: BitPacker::new(),
            state: 0,
            run: 0,
        }
    }

    /// Feed one group decision.
    pub fn encode(&mut self, significant: bool) {
        if significant {
            let e = MEL_E[self.state];
            self.pack.write_bit(1);
            self.pack.write_bits(self.run, e);
            self.run = 0;
            self.state = self.state.saturating_sub(1);
        } else {
            self.run += 1;
            if self.run == 1 << MEL_E[self.state] {
                self.pack.write_bit(0);
                self.run = 0;
                self.state = (self.state + 1).min(MAX_STATE);
            }
        }
    }

    /// Close the stream. A pending partial run is promoted to a full run
    /// symbol; the decoder over-produces trailing zero decisions, which the
    /// caller never asks for.
    pub fn finish(mut self) -> Vec<u8> {
        if self.run > 0 {
            self.pack.write_bit(0);
        }
        self.pack.finish()
    }
}

pub struct MelDecoder<'a> {
    src: BitUnpacker<'a>,
    state: usize,
    run: u32,
    one_pending: bool,
}

impl<'a> MelDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            src: BitUnpacker::new(data),
            state: 0,
            run: 0,
            one_pending: false,
        }
    }

    /// Produce the next group decision. Past the end of the stream this
    /// yields `false` forever (exhaustion reads zero bits, which decode as
    /// runs of insignificant groups).
    pub fn decode(&mut self) -> bool {
        loop {
            if self.run > 0 {
                self.run -= 1;
                return false;
            }
            if self.one_pending {
                self.one_pending = false;
                return true;
            }
            let e = MEL_E[self.state];
            if self.src.read_bit() == 0 {
                self.run = 1 << e;
                self.state = (self.state + 1).min(MAX_STATE);
            } else {
                self.run = self.src.read_bits(e);
                self.one_pending = true;
                self.state = self.state.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(events: &[bool]) {
        let mut enc = MelEncoder::new();
        for &e in events {
            enc.encode(e);
        }
        let bytes = enc.finish();

        let mut dec = MelDecoder::new(&bytes);
        for (i, &e) in events.iter().enumerate() {
            assert_eq!(dec.decode(), e, "event {i} mismatch");
        }
    }

    #[test]
    fn alternating_events() {
        let events: Vec<bool> = (0..64).map(|i| i % 2 == 0).collect();
        round_trip(&events);
    }

    #[test]
    fn long_zero_runs_climb_the_ladder() {
        let mut events = vec![false; 200];
        events[77] = true;
        events[199] = true;
        round_trip(&events);
    }

    #[test]
    fn dense_significance() {
        round_trip(&[true; 40]);
    }

    #[test]
    fn trailing_partial_run() {
        round_trip(&[true, false, false, false]);
    }

    #[test]
    fn compression_on_sparse_input() {
        let mut enc = MelEncoder::new();
        for _ in 0..1000 {
            enc.encode(false);
        }
        let bytes = enc.finish();
        // 1000 zero decisions should collapse to a few dozen run bits.
        assert!(bytes.len() < 16, "MEL failed to compress runs: {} bytes", bytes.len());
    }

    #[test]
    fn exhausted_stream_yields_zeros() {
        let mut dec = MelDecoder::new(&[]);
        for _ in 0..100 {
            assert!(!dec.decode());
        }
    }
}
