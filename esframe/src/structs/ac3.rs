//! AC-3 (ATSC A/52) and Enhanced AC-3 sync frames.
//!
//! Both share the `0x0B77` sync word. Byte 5 carries the bitstream ID in its
//! upper five bits for either syntax; IDs above 10 mean Enhanced AC-3.
//!
//! ```text
//! AC-3    AAAAAAAA AAAAAAAA BBBBBBBB BBBBBBBB CCDDDDDD EEEEEFFF GGGxxxxx
//!
//! A 16  sync word
//! B 16  crc1
//! C  2  fscod
//! D  6  frmsizecod
//! E  5  bsid
//! F  3  bsmod
//! G  3  acmod, followed by the optional mix levels and lfeon
//!
//! E-AC-3  AAAAAAAA AAAAAAAA BBCCCDDD DDDDDDDD EEFFGGGH IIIIIxxx
//!
//! A 16  sync word
//! B  2  strmtyp
//! C  3  substreamid
//! D 11  frmsiz, frame size in 16-bit words minus one
//! E  2  fscod
//! F  2  fscod2 when fscod is 3, numblkscod otherwise
//! G  3  acmod
//! H  1  lfeon
//! I  5  bsid
//! ```

use crate::structs::codec::{Codec, FrameHeader, StreamFormat};
use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 7;

/// Highest bitstream ID still decoded with the AC-3 syntax.
const MAX_AC3_BSID: u8 = 10;

const SAMPLES_PER_BLOCK: u32 = 256;

const SAMPLING_RATE_TABLE: [u32; 4] = [48000, 44100, 32000, 0];

const NUM_BLOCKS_TABLE: [u32; 4] = [1, 2, 3, 6];

/// Full-bandwidth channels per acmod, LFE excluded.
const ACMOD_CHANNELS: [u32; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

/// Frame sizes in 16-bit words from ATSC A/52 table 5.18,
/// indexed by `[frmsizecod][fscod]`.
const FRAME_SIZE_TABLE: [[u16; 3]; 38] = [
    [64, 69, 96],
    [64, 70, 96],
    [80, 87, 120],
    [80, 88, 120],
    [96, 104, 144],
    [96, 105, 144],
    [112, 121, 168],
    [112, 122, 168],
    [128, 139, 192],
    [128, 140, 192],
    [160, 174, 240],
    [160, 175, 240],
    [192, 208, 288],
    [192, 209, 288],
    [224, 243, 336],
    [224, 244, 336],
    [256, 278, 384],
    [256, 279, 384],
    [320, 348, 480],
    [320, 349, 480],
    [384, 417, 576],
    [384, 418, 576],
    [448, 487, 672],
    [448, 488, 672],
    [512, 557, 768],
    [512, 558, 768],
    [640, 696, 960],
    [640, 697, 960],
    [768, 835, 1152],
    [768, 836, 1152],
    [896, 975, 1344],
    [896, 976, 1344],
    [1024, 1114, 1536],
    [1024, 1115, 1536],
    [1152, 1253, 1728],
    [1152, 1254, 1728],
    [1280, 1393, 1920],
    [1280, 1394, 1920],
];

pub fn fast_check(p: &[u8]) -> bool {
    p.starts_with(&[0x0B, 0x77])
}

/// Byte 5 holds `bsid << 3` plus three low bits of other fields.
pub fn is_eac3(p: &[u8]) -> bool {
    p.get(5).is_some_and(|&b| b > MAX_AC3_BSID << 3)
}

pub fn read_header(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    if is_eac3(p) {
        read_eac3(p)
    } else {
        read_ac3(p)
    }
}

fn read_ac3(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(32)?;
    let fscod: u8 = reader.get_n(2)?;
    let frmsizecod: u8 = reader.get_n(6)?;
    reader.skip_n(8)?;
    let acmod: u8 = reader.get_n(3)?;

    if fscod == 0x03 {
        return Err(HeaderError::Ac3ReservedSamplingRate);
    }
    if frmsizecod as usize >= FRAME_SIZE_TABLE.len() {
        return Err(HeaderError::Ac3InvalidFrameSizeCode(frmsizecod));
    }

    // cmixlev
    if acmod & 0x01 != 0 && acmod != 0x01 {
        reader.skip_n(2)?;
    }
    // surmixlev
    if acmod & 0x04 != 0 {
        reader.skip_n(2)?;
    }
    // dsurmod
    if acmod == 0x02 {
        reader.skip_n(2)?;
    }
    let lfeon = reader.get()?;

    FrameHeader {
        format: StreamFormat {
            codec: Codec::Ac3,
            channels: ACMOD_CHANNELS[acmod as usize] + lfeon as u32,
            sampling_rate: SAMPLING_RATE_TABLE[fscod as usize],
        },
        frame_size: FRAME_SIZE_TABLE[frmsizecod as usize][fscod as usize] as usize * 2,
        samples_per_frame: 6 * SAMPLES_PER_BLOCK,
    }
    .ensure_min_size(HEADER_LEN)
}

fn read_eac3(p: &[u8]) -> Result<FrameHeader, HeaderError> {
    let mut reader = HeaderReader::from_slice(p);

    reader.skip_n(16)?;
    reader.skip_n(5)?;
    let frmsiz: u16 = reader.get_n(11)?;
    let fscod: u8 = reader.get_n(2)?;
    let fscod2_numblkscod: u8 = reader.get_n(2)?;
    let acmod: u8 = reader.get_n(3)?;
    let lfeon = reader.get()?;

    let (sampling_rate, blocks) = if fscod == 0x03 {
        if fscod2_numblkscod == 0x03 {
            return Err(HeaderError::Eac3ReservedSamplingRate);
        }
        // reduced sampling rates always carry six blocks
        (SAMPLING_RATE_TABLE[fscod2_numblkscod as usize] / 2, 6)
    } else {
        (
            SAMPLING_RATE_TABLE[fscod as usize],
            NUM_BLOCKS_TABLE[fscod2_numblkscod as usize],
        )
    };

    FrameHeader {
        format: StreamFormat {
            codec: Codec::Eac3,
            channels: ACMOD_CHANNELS[acmod as usize] + lfeon as u32,
            sampling_rate,
        },
        frame_size: (frmsiz as usize + 1) * 2,
        samples_per_frame: blocks * SAMPLES_PER_BLOCK,
    }
    .ensure_min_size(HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ac3_five_one() -> anyhow::Result<()> {
        // 48 kHz, frmsizecod 28, bsid 8, acmod 7 with LFE
        let header = read_header(&[0x0B, 0x77, 0x00, 0x00, 0x1C, 0x40, 0xE1])?;
        assert_eq!(header.codec(), Codec::Ac3);
        assert_eq!(header.frame_size, 1536);
        assert_eq!(header.format.channels, 6);
        assert_eq!(header.format.sampling_rate, 48000);
        assert_eq!(header.samples_per_frame, 1536);
        Ok(())
    }

    #[test]
    fn ac3_lfe_position_follows_acmod() -> anyhow::Result<()> {
        // acmod 2 skips dsurmod only, lfeon lands on bit 53
        let header = read_header(&[0x0B, 0x77, 0x00, 0x00, 0x48, 0x40, 0x44])?;
        assert_eq!(header.format.channels, 3);
        assert_eq!(header.format.sampling_rate, 44100);
        // frmsizecod 8 at 44.1 kHz
        assert_eq!(header.frame_size, 139 * 2);

        let header = read_header(&[0x0B, 0x77, 0x00, 0x00, 0x48, 0x40, 0x40])?;
        assert_eq!(header.format.channels, 2);
        Ok(())
    }

    #[test]
    fn ac3_reserved_fields() {
        assert!(read_header(&[0x0B, 0x77, 0x00, 0x00, 0xC0, 0x40, 0x40]).is_err());
        assert!(read_header(&[0x0B, 0x77, 0x00, 0x00, 0x26, 0x40, 0x40]).is_err());
    }

    #[test]
    fn eac3_frame_size_field() -> anyhow::Result<()> {
        // frmsiz 383, 48 kHz, six blocks, acmod 7 with LFE, bsid 16
        let header = read_header(&[0x0B, 0x77, 0x01, 0x7F, 0x3F, 0x80, 0x00])?;
        assert_eq!(header.codec(), Codec::Eac3);
        assert_eq!(header.frame_size, 768);
        assert_eq!(header.format.channels, 6);
        assert_eq!(header.format.sampling_rate, 48000);
        assert_eq!(header.samples_per_frame, 1536);
        Ok(())
    }

    #[test]
    fn eac3_reduced_sampling_rate() -> anyhow::Result<()> {
        let header = read_header(&[0x0B, 0x77, 0x00, 0xFF, 0xD4, 0x80, 0x00])?;
        assert_eq!(header.format.sampling_rate, 22050);
        assert_eq!(header.format.channels, 2);
        assert_eq!(header.frame_size, 512);

        assert!(read_header(&[0x0B, 0x77, 0x00, 0xFF, 0xF4, 0x80, 0x00]).is_err());
        Ok(())
    }

    #[test]
    fn bsid_threshold() {
        assert!(!is_eac3(&[0x0B, 0x77, 0, 0, 0, 0x50, 0]));
        assert!(is_eac3(&[0x0B, 0x77, 0, 0, 0, 0x51, 0]));
        assert!(!is_eac3(&[0x0B, 0x77, 0, 0, 0]));
    }
}
