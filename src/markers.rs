//! Codestream marker codes and the segment payloads the core owns.
//!
//! Marker framing (length fields, segment ordering, tile-part bookkeeping)
//! belongs to the codestream layer and is out of scope here. The core only
//! knows the marker numbers it is asked about and produces the raw payload
//! bytes for the segments whose contents are core-derived: QCD step tables,
//! RGN shifts, and the Part-15 CAP/CPF capability words. All multi-byte
//! fields are big-endian.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// JPEG 2000 codestream markers (ISO/IEC 15444-1 Annex A, 15444-15 A.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum MarkerCode {
    /// SOC: Start of codestream.
    StartOfCodestream = 0xFF4F,

    /// CAP: Extended capabilities (Part 15 signals HT here).
    ExtendedCapabilities = 0xFF50,

    /// SIZ: Image and tile size.
    ImageAndTileSize = 0xFF51,

    /// COD: Coding style default.
    CodingStyleDefault = 0xFF52,

    /// COC: Coding style component.
    CodingStyleComponent = 0xFF53,

    /// CPF: Corresponding profile (Part 15).
    CorrespondingProfile = 0xFF59,

    /// QCD: Quantization default.
    QuantizationDefault = 0xFF5C,

    /// QCC: Quantization component.
    QuantizationComponent = 0xFF5D,

    /// RGN: Region of interest.
    RegionOfInterest = 0xFF5E,

    /// POC: Progression order change.
    ProgressionOrderChange = 0xFF5F,

    /// SOT: Start of tile-part.
    StartOfTilePart = 0xFF90,

    /// SOD: Start of data.
    StartOfData = 0xFF93,

    /// EOC: End of codestream.
    EndOfCodestream = 0xFFD9,
}

impl MarkerCode {
    /// Whether the marker introduces a length-prefixed segment.
    pub fn has_segment(self) -> bool {
        !matches!(
            self,
            MarkerCode::StartOfCodestream | MarkerCode::StartOfData | MarkerCode::EndOfCodestream
        )
    }
}

/// RGN segment payload for a single component: Srgn = 0 (implicit/MAXSHIFT),
/// SPrgn = the shift applied by the ROI processor.
pub fn rgn_payload(component: u8, shift: u8) -> [u8; 3] {
    [component, 0x00, shift]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trip() {
        let code: u16 = MarkerCode::QuantizationDefault.into();
        assert_eq!(code, 0xFF5C);
        assert_eq!(
            MarkerCode::try_from(0xFF90u16).unwrap(),
            MarkerCode::StartOfTilePart
        );
        assert!(MarkerCode::try_from(0xFF00u16).is_err());
    }

    #[test]
    fn segmentless_markers() {
        assert!(!MarkerCode::StartOfCodestream.has_segment());
        assert!(!MarkerCode::EndOfCodestream.has_segment());
        assert!(MarkerCode::ImageAndTileSize.has_segment());
    }
}
