//! Codec identification and the per-format dispatch table.
//!
//! ## Sync Words
//!
//! | Format      | Sync pattern             |
//! |-------------|--------------------------|
//! | MPEG audio  | `0xFFE` (11 bits)        |
//! | (E-)AC-3    | `0x0B77`                 |
//! | ADTS AAC    | `0xFFF` (12 bits)        |
//! | LATM AAC    | `0x56E` (11 bits)        |
//! | DTS         | `0x7FFE8001`             |
//!
//! ADTS shares its first 11 bits with MPEG audio; the MPEG fast check rejects
//! layer `00`, which is exactly what every ADTS header carries, so checking
//! MPEG first never shadows AAC.

use std::fmt::{Display, Formatter};

use log::trace;

use crate::structs::{ac3, adts, dts, latm, mpeg};
use crate::utils::errors::HeaderError;

/// Audio bitstream formats known to the synchronizer.
///
/// `Pcm` is never detected from the byte stream; it exists so callers that
/// also route uncompressed audio can share the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codec {
    #[default]
    None,
    Pcm,
    Mpeg,
    Ac3,
    Eac3,
    Aac,
    AacLatm,
    Dts,
}

/// Fast-check order. AC-3 stands for both AC-3 and E-AC-3.
pub const DETECTION_ORDER: [Codec; 5] = [
    Codec::Mpeg,
    Codec::Ac3,
    Codec::Aac,
    Codec::AacLatm,
    Codec::Dts,
];

/// Smallest number of bytes every fast check needs.
pub const FAST_CHECK_LEN: usize = 4;

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Pcm => "PCM",
            Codec::Mpeg => "MPEG audio",
            Codec::Ac3 => "AC-3",
            Codec::Eac3 => "E-AC-3",
            Codec::Aac => "AAC",
            Codec::AacLatm => "AAC-LATM",
            Codec::Dts => "DTS",
        }
    }

    pub fn is_detectable(&self) -> bool {
        !matches!(self, Codec::None | Codec::Pcm)
    }

    /// Cheap sync word test on the first four bytes of `p`.
    pub fn fast_check(&self, p: &[u8]) -> bool {
        if p.len() < FAST_CHECK_LEN {
            return false;
        }
        match self {
            Codec::Mpeg => mpeg::fast_check(p),
            Codec::Ac3 | Codec::Eac3 => ac3::fast_check(p),
            Codec::Aac => adts::fast_check(p),
            Codec::AacLatm => latm::fast_check(p),
            Codec::Dts => dts::fast_check(p),
            Codec::None | Codec::Pcm => false,
        }
    }

    /// Full header validation of the candidate at the start of `p`.
    ///
    /// `available` is the number of valid bytes from the candidate onward;
    /// `p` may extend past it into the zeroed padding of the frame buffer.
    pub fn full_check(&self, p: &[u8], available: usize) -> HeaderCheck {
        let (min_len, result) = match self {
            Codec::Mpeg => (mpeg::HEADER_LEN, mpeg::read_header as HeaderFn),
            Codec::Ac3 | Codec::Eac3 => (ac3::HEADER_LEN, ac3::read_header as HeaderFn),
            Codec::Aac => (adts::HEADER_LEN, adts::read_header as HeaderFn),
            Codec::AacLatm => (latm::HEADER_LEN, latm::read_header as HeaderFn),
            Codec::Dts => (dts::HEADER_LEN, dts::read_header as HeaderFn),
            Codec::None | Codec::Pcm => return HeaderCheck::Invalid,
        };

        if available < min_len || p.len() < min_len {
            // (E-)AC-3 can already be told apart once byte 5 is in.
            let codec = match self {
                Codec::Ac3 | Codec::Eac3 if available > 5 && ac3::is_eac3(p) => Codec::Eac3,
                Codec::Ac3 | Codec::Eac3 => Codec::Ac3,
                codec => *codec,
            };
            return HeaderCheck::Incomplete(codec);
        }

        match result(&p[..min_len]) {
            Ok(header) => HeaderCheck::Valid(header),
            Err(e) => {
                trace!("{} candidate rejected: {e}", self.name());
                HeaderCheck::Invalid
            }
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

type HeaderFn = fn(&[u8]) -> Result<FrameHeader, HeaderError>;

/// Returns the first codec in `order` whose fast check passes on `p`.
pub fn detect(p: &[u8], order: &[Codec]) -> Option<Codec> {
    order.iter().copied().find(|codec| codec.fast_check(p))
}

/// Outcome of a full header check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    /// A reserved or inconsistent field; the candidate is not a frame start.
    Invalid,
    /// The sync word matched but the fixed header is not complete yet.
    Incomplete(Codec),
    Valid(FrameHeader),
}

/// Codec parameters the output side configures itself for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamFormat {
    pub codec: Codec,
    pub channels: u32,
    pub sampling_rate: u32,
}

impl Display for StreamFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} ch, {} Hz",
            self.codec, self.channels, self.sampling_rate
        )
    }
}

/// Everything a full header check decodes from the sync header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub format: StreamFormat,
    /// Total frame length in bytes, header included.
    pub frame_size: usize,
    pub samples_per_frame: u32,
}

impl FrameHeader {
    pub fn codec(&self) -> Codec {
        self.format.codec
    }

    /// Guards against zero or truncated lengths, which would stall the scan
    /// on a frame that can never be consumed.
    pub(crate) fn ensure_min_size(self, header_len: usize) -> Result<Self, HeaderError> {
        if self.frame_size < header_len {
            return Err(HeaderError::FrameTooShort {
                codec: self.format.codec.name(),
                length: self.frame_size,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_priority() {
        // MPEG-1 layer III
        assert_eq!(detect(&[0xFF, 0xFB, 0x90, 0x00], &DETECTION_ORDER), Some(Codec::Mpeg));
        // ADTS, layer bits 00
        assert_eq!(detect(&[0xFF, 0xF1, 0x50, 0x80], &DETECTION_ORDER), Some(Codec::Aac));
        assert_eq!(detect(&[0x0B, 0x77, 0x00, 0x00], &DETECTION_ORDER), Some(Codec::Ac3));
        assert_eq!(detect(&[0x56, 0xE0, 0x10, 0x00], &DETECTION_ORDER), Some(Codec::AacLatm));
        assert_eq!(detect(&[0x7F, 0xFE, 0x80, 0x01], &DETECTION_ORDER), Some(Codec::Dts));
        assert_eq!(detect(&[0x00, 0x00, 0x01, 0xC0], &DETECTION_ORDER), None);
        assert_eq!(detect(&[0xFF, 0xFB, 0x90], &DETECTION_ORDER), None);
    }

    #[test]
    fn format_checks_accept_short_slices() {
        let checks: [fn(&[u8]) -> bool; 5] = [
            mpeg::fast_check,
            ac3::fast_check,
            adts::fast_check,
            latm::fast_check,
            dts::fast_check,
        ];
        let sync_starts: [&[u8]; 5] = [
            &[0xFF, 0xFB, 0x90],
            &[0x0B],
            &[0xFF, 0xF1],
            &[0x56],
            &[0x7F, 0xFE, 0x80],
        ];

        for check in checks {
            assert!(!check(&[]));
            for start in sync_starts {
                for len in 0..start.len() {
                    assert!(!check(&start[..len]));
                }
            }
        }
        assert!(ac3::fast_check(&[0x0B, 0x77]));
        assert!(!dts::fast_check(&[0x7F, 0xFE, 0x80]));
        assert!(!mpeg::fast_check(&[0xFF, 0xFB]));
        assert!(mpeg::fast_check(&[0xFF, 0xFB, 0x90]));
    }

    #[test]
    fn latm_can_be_left_out() {
        let without_latm = [Codec::Mpeg, Codec::Ac3, Codec::Aac, Codec::Dts];
        assert_eq!(detect(&[0x56, 0xE0, 0x10, 0x00], &without_latm), None);
    }

    #[test]
    fn short_header_is_incomplete() {
        let p = [0x0B, 0x77, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            Codec::Ac3.full_check(&p, 4),
            HeaderCheck::Incomplete(Codec::Ac3)
        );
        assert_eq!(Codec::None.full_check(&p, 6), HeaderCheck::Invalid);
    }
}
