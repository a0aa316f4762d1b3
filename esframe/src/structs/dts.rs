//! DTS coherent acoustics core frames.
//!
//! ```text
//! AAAAAAAA AAAAAAAA AAAAAAAA AAAAAAAA BCCCCCDE EEEEEEFF FFFFFFFF FFFFGGGG
//! GGHHHHII IIIJKLMN OOOPQRRS
//!
//! A 32  sync word 0x7FFE8001
//! B  1  frame type
//! C  5  deficit sample count
//! D  1  CRC present
//! E  7  number of PCM sample blocks minus one
//! F 14  primary frame size minus one
//! G  6  audio channel arrangement
//! H  4  core audio sampling frequency
//! I  5  transmission bit rate
//! J  1  embedded downmix
//! K  1  embedded dynamic range
//! L  1  embedded time stamp
//! M  1  auxiliary data
//! N  1  HDCD
//! O  3  extension audio descriptor
//! P  1  extended coding
//! Q  1  audio sync word insertion
//! R  2  low frequency effects
//! S  1  predictor history
//! ```

use crate::structs::codec::{Codec, FrameHeader, StreamFormat};
use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 11;

const SAMPLES_PER_BLOCK: u32 = 32;

const SAMPLING_RATE_TABLE: [u32; 16] = [
    0, 8000, 16000, 32000, 64000, 0, 11025, 22050, 44100, 88200, 0, 12000, 24000, 48000, 96000,
    0,
];

/// Channels per audio channel arrangement, LFE excluded. Zero marks
/// arrangements the output path cannot map (dual mono and above 5 channels).
fn arrangement_channels(amode: u8) -> u32 {
    match amode {
        // mono
        0x00 => 1,
        // L, R / sum-difference / Lt, Rt
        0x02..=0x04 => 2,
        // L, R, C / L, R, S
        0x05 | 0x06 => 3,
        // L, R, SL, SR
        0x08 => 4,
        // L, C, R, SL, SR
        0x09 => 5,
        _ => 0,
    }
}

pub fn fast_check(p: &[u8]) -> bool {
    p.starts_with(&[0x7F, 0xFE, 0x80, 0x01])
}

pub fn read_header(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(32)?;
    reader.skip_n(7)?;
    let blocks: u32 = reader.get_n(7)?;
    let frame_size: u16 = reader.get_n(14)?;
    let amode: u8 = reader.get_n(6)?;
    let sfreq: u8 = reader.get_n(4)?;
    reader.skip_n(15)?;
    let lff: u8 = reader.get_n(2)?;

    let sampling_rate = SAMPLING_RATE_TABLE[sfreq as usize];
    if sampling_rate == 0 {
        return Err(HeaderError::DtsReservedSamplingRate(sfreq));
    }

    let channels = arrangement_channels(amode);
    if channels == 0 {
        return Err(HeaderError::DtsInvalidChannelArrangement(amode));
    }

    FrameHeader {
        format: StreamFormat {
            codec: Codec::Dts,
            channels: channels + (lff != 0) as u32,
            sampling_rate,
        },
        frame_size: frame_size as usize + 1,
        samples_per_frame: (blocks + 1) * SAMPLES_PER_BLOCK,
    }
    .ensure_min_size(HEADER_LEN)
}
