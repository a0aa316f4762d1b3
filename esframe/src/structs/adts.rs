//! ADTS (Audio Data Transport Stream) framed AAC.
//!
//! ```text
//! AAAAAAAA AAAABCCD EEFFFFGH HHIJKLMM MMMMMMMM MMMOOOOO OOOOOOPP
//!
//! A 12  sync word 0xFFF
//! B  1  MPEG version (0 = MPEG-4, 1 = MPEG-2)
//! C  2  layer, always 0
//! D  1  protection absent
//! E  2  profile
//! F  4  sampling frequency index (15 is invalid)
//! G  1  private bit
//! H  3  channel configuration
//! I  1  originality
//! J  1  home
//! K  1  copyright id bit
//! L  1  copyright id start
//! M 13  frame length, header included
//! O 11  buffer fullness
//! P  2  raw data blocks in frame minus one
//! ```

use crate::structs::codec::{Codec, FrameHeader, StreamFormat};
use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 7;

const SAMPLES_PER_RAW_BLOCK: u32 = 1024;

/// MPEG-4 sampling frequencies; zero entries are reserved.
pub const SAMPLING_RATE_TABLE: [u32; 16] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
    0, 0,
];

/// Channels per channel configuration. Configuration 0 defers to an
/// in-band program config element, which a sync header cannot resolve.
const CHANNEL_CONFIG_TABLE: [u32; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

pub fn fast_check(p: &[u8]) -> bool {
    // remaining sync bits plus layer 00
    matches!(p, &[0xFF, b1, b2, ..] if b1 & 0xF6 == 0xF0 && b2 & 0x3C != 0x3C)
}

pub fn read_header(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(18)?;
    let rate_index: u8 = reader.get_n(4)?;
    reader.skip_n(1)?;
    let channel_config: u8 = reader.get_n(3)?;
    reader.skip_n(4)?;
    let frame_length: u16 = reader.get_n(13)?;
    reader.skip_n(11)?;
    let raw_blocks: u32 = reader.get_n(2)?;

    let sampling_rate = SAMPLING_RATE_TABLE[rate_index as usize];
    if sampling_rate == 0 {
        return Err(HeaderError::AdtsReservedSamplingRate(rate_index));
    }

    let channels = CHANNEL_CONFIG_TABLE[channel_config as usize];
    if channels == 0 {
        return Err(HeaderError::AdtsInvalidChannelConfig(channel_config));
    }

    FrameHeader {
        format: StreamFormat {
            codec: Codec::Aac,
            channels,
            sampling_rate,
        },
        frame_size: frame_length as usize,
        samples_per_frame: (raw_blocks + 1) * SAMPLES_PER_RAW_BLOCK,
    }
    .ensure_min_size(HEADER_LEN)
}
