//! MPEG-1, MPEG-2 and MPEG-2.5 audio (layers I, II and III).
//!
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//!
//! A 11  frame sync
//! B  2  version (00 = 2.5, 01 = reserved, 10 = 2, 11 = 1)
//! C  2  layer (00 = reserved, 01 = III, 10 = II, 11 = I)
//! D  1  protection bit
//! E  4  bitrate index
//! F  2  sampling rate index
//! G  1  padding
//! H  1  private bit
//! I  2  channel mode (11 = mono)
//! ```

use crate::structs::codec::{Codec, FrameHeader, StreamFormat};
use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 4;

/// Bitrates in kbit/s, indexed by `[version class][layer - 1][index]`.
///
/// Version class 0 is MPEG-1, class 1 covers MPEG-2 and MPEG-2.5.
const BITRATE_TABLE: [[[u16; 16]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

const SAMPLING_RATE_TABLE: [u32; 4] = [44100, 48000, 32000, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl Version {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b11 => Some(Version::Mpeg1),
            0b10 => Some(Version::Mpeg2),
            0b00 => Some(Version::Mpeg25),
            _ => None,
        }
    }

    fn class(self) -> usize {
        match self {
            Version::Mpeg1 => 0,
            Version::Mpeg2 | Version::Mpeg25 => 1,
        }
    }

    /// Right shift applied to the MPEG-1 sampling rate.
    fn rate_shift(self) -> u32 {
        match self {
            Version::Mpeg1 => 0,
            Version::Mpeg2 => 1,
            Version::Mpeg25 => 2,
        }
    }
}

pub fn fast_check(p: &[u8]) -> bool {
    let &[0xFF, b1, b2, ..] = p else {
        return false;
    };

    b1 & 0xE0 == 0xE0
        // version 01 is reserved
        && b1 & 0x18 != 0x08
        // layer 00 is reserved
        && b1 & 0x06 != 0
        && b2 & 0xF0 != 0xF0
        && b2 & 0x0C != 0x0C
}

pub fn read_header(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(11)?;
    let version_bits: u8 = reader.get_n(2)?;
    let layer_bits: u8 = reader.get_n(2)?;
    reader.skip_n(1)?;
    let bitrate_index: u8 = reader.get_n(4)?;
    let rate_index: u8 = reader.get_n(2)?;
    let padding: u32 = reader.get_n(1)?;
    reader.skip_n(1)?;
    let channel_mode: u8 = reader.get_n(2)?;

    let version = Version::from_bits(version_bits)
        .ok_or(HeaderError::MpegReservedVersion)?;
    // 01 = III, 10 = II, 11 = I; 00 is filtered by the fast check
    let layer = 4 - layer_bits.max(1) as usize;

    let base_rate = SAMPLING_RATE_TABLE[rate_index as usize];
    if base_rate == 0 {
        return Err(HeaderError::MpegReservedSamplingRate(rate_index));
    }
    let sampling_rate = base_rate >> version.rate_shift();

    let bitrate = BITRATE_TABLE[version.class()][layer - 1][bitrate_index as usize] as u32;
    if bitrate == 0 {
        return Err(HeaderError::MpegInvalidBitrate(bitrate_index));
    }

    let frame_size = match layer {
        1 => ((12000 * bitrate) / sampling_rate + padding) * 4,
        _ => (144000 * bitrate) / sampling_rate + padding,
    } as usize;

    let samples_per_frame = match (layer, version) {
        (1, _) => 384,
        (2, _) | (3, Version::Mpeg1) => 1152,
        _ => 576,
    };

    FrameHeader {
        format: StreamFormat {
            codec: Codec::Mpeg,
            channels: if channel_mode == 0b11 { 1 } else { 2 },
            sampling_rate,
        },
        frame_size,
        samples_per_frame,
    }
    .ensure_min_size(HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpeg1_layer3() -> anyhow::Result<()> {
        // 128 kbit/s, 44.1 kHz, joint stereo
        let header = read_header(&[0xFF, 0xFB, 0x90, 0x40])?;
        assert_eq!(header.codec(), Codec::Mpeg);
        assert_eq!(header.frame_size, 417);
        assert_eq!(header.format.channels, 2);
        assert_eq!(header.format.sampling_rate, 44100);
        assert_eq!(header.samples_per_frame, 1152);

        // padded, mono
        let header = read_header(&[0xFF, 0xFB, 0x92, 0xC0])?;
        assert_eq!(header.frame_size, 418);
        assert_eq!(header.format.channels, 1);
        Ok(())
    }

    #[test]
    fn mpeg1_layer2_and_layer1() -> anyhow::Result<()> {
        // layer II, 192 kbit/s, 48 kHz
        let header = read_header(&[0xFF, 0xFD, 0xA4, 0x00])?;
        assert_eq!(header.frame_size, 576);
        assert_eq!(header.format.sampling_rate, 48000);

        // layer I, 32 kbit/s, 32 kHz
        let header = read_header(&[0xFF, 0xFF, 0x18, 0x00])?;
        assert_eq!(header.frame_size, 48);
        assert_eq!(header.samples_per_frame, 384);
        Ok(())
    }

    #[test]
    fn lower_sampling_rate_versions() -> anyhow::Result<()> {
        // MPEG-2 layer III, 64 kbit/s, 24 kHz
        let header = read_header(&[0xFF, 0xF3, 0x84, 0x00])?;
        assert_eq!(header.format.sampling_rate, 24000);
        assert_eq!(header.frame_size, 144000 * 64 / 24000);
        assert_eq!(header.samples_per_frame, 576);

        // MPEG-2.5 layer III, 32 kbit/s, 12 kHz
        let header = read_header(&[0xFF, 0xE3, 0x44, 0x00])?;
        assert_eq!(header.format.sampling_rate, 12000);
        Ok(())
    }

    #[test]
    fn rejects_free_format_bitrate() {
        assert!(!fast_check(&[0xFF, 0xFB, 0xF0, 0x00]));
        assert!(read_header(&[0xFF, 0xFB, 0x00, 0x00]).is_err());
    }
}
