//! LOAS/LATM framed AAC (`AudioSyncStream`).
//!
//! ```text
//! AAAAAAAA AAABBBBB BBBBBBBB
//!
//! A 11  sync word 0x2B7
//! B 13  audioMuxLengthBytes, payload length after this header
//! ```
//!
//! The channel layout and sampling rate live in the `StreamMuxConfig`
//! inside the payload, which this detector does not parse. Every LATM
//! stream is reported as stereo at 48 kHz; other layouts are left for the
//! downstream decoder to discover.

use crate::structs::codec::{Codec, FrameHeader, StreamFormat};
use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 3;

pub const ASSUMED_CHANNELS: u32 = 2;
pub const ASSUMED_SAMPLING_RATE: u32 = 48000;

const SAMPLES_PER_FRAME: u32 = 1024;

pub fn fast_check(p: &[u8]) -> bool {
    matches!(p, &[0x56, b1, ..] if b1 & 0xE0 == 0xE0)
}

pub fn read_header(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(11)?;
    let mux_length: u16 = reader.get_n(13)?;

    Ok(FrameHeader {
        format: StreamFormat {
            codec: Codec::AacLatm,
            channels: ASSUMED_CHANNELS,
            sampling_rate: ASSUMED_SAMPLING_RATE,
        },
        frame_size: mux_length as usize + HEADER_LEN,
        samples_per_frame: SAMPLES_PER_FRAME,
    })
}

#[test]
fn latm_length_includes_header() -> anyhow::Result<()> {
    let header = read_header(&[0x56, 0xE1, 0x23])?;
    assert_eq!(header.codec(), Codec::AacLatm);
    assert_eq!(header.frame_size, 0x123 + 3);
    assert_eq!(header.format.channels, 2);
    assert_eq!(header.format.sampling_rate, 48000);

    assert!(!fast_check(&[0x56, 0xC0, 0x00, 0x00]));
    Ok(())
}
