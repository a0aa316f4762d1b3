//! Packetized elementary stream (PES) unpacking.
//!
//! Audio reaches the synchronizer as PES payloads. Only the fields needed to
//! recover the payload and its presentation timestamp are decoded:
//!
//! ```text
//! 00 00 01 | stream_id | packet_length(16) | 10xxxxxx | PTS_DTS_flags(2) xxxxxx |
//! header_data_length | [PTS: 0010/0011 PTS[32..30] 1 | PTS[29..15] 1 | PTS[14..0] 1] ...
//! ```

use log::{debug, error, trace};

use crate::utils::errors::PesError;
use crate::utils::timing::PTS_MASK;

pub const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Start code, stream id and packet length.
pub const BASIC_HEADER_LEN: usize = 6;

const PROGRAM_STREAM_MAP: u8 = 0xBC;
const PADDING_STREAM: u8 = 0xBE;
const PRIVATE_STREAM_2: u8 = 0xBF;
const ECM_STREAM: u8 = 0xF0;
const EMM_STREAM: u8 = 0xF1;
const DSMCC_STREAM: u8 = 0xF2;
const H222_1_TYPE_E: u8 = 0xF8;
const PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;

/// Whether packets of this stream carry the optional PES header.
pub fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        PROGRAM_STREAM_MAP
            | PADDING_STREAM
            | PRIVATE_STREAM_2
            | ECM_STREAM
            | EMM_STREAM
            | DSMCC_STREAM
            | H222_1_TYPE_E
            | PROGRAM_STREAM_DIRECTORY
    )
}

/// Whether the stream id denotes MPEG audio or private stream 1, the
/// carrier for AC-3, E-AC-3 and DTS in broadcast streams.
pub fn is_audio_stream(stream_id: u8) -> bool {
    matches!(stream_id, 0xC0..=0xDF | 0xBD)
}

/// A borrowed view of one complete PES packet.
#[derive(Debug, Clone, Copy)]
pub struct PesPacket<'a> {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub payload: &'a [u8],
}

impl<'a> PesPacket<'a> {
    /// Parses a complete packet. Trailing bytes past `packet_length` are ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self, PesError> {
        if data.len() < BASIC_HEADER_LEN {
            return Err(PesError::InsufficientData(data.len()));
        }
        if data[..3] != START_CODE {
            return Err(PesError::InvalidStartCode);
        }

        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]) as usize;
        if packet_length == 0 {
            return Err(PesError::MissingLength(stream_id));
        }

        let end = BASIC_HEADER_LEN + packet_length;
        if data.len() < end {
            return Err(PesError::InsufficientData(data.len()));
        }

        if !has_optional_header(stream_id) {
            return Ok(Self {
                stream_id,
                pts: None,
                payload: &data[BASIC_HEADER_LEN..end],
            });
        }

        if end < BASIC_HEADER_LEN + 3 {
            return Err(PesError::InsufficientData(end));
        }

        let pts_dts_flags = data[7] >> 6;
        let header_data_length = data[8] as usize;
        let payload_offset = BASIC_HEADER_LEN + 3 + header_data_length;
        if payload_offset > end {
            return Err(PesError::HeaderTooLong {
                header: payload_offset,
                packet: end,
            });
        }

        let pts = if pts_dts_flags & 0b10 != 0 && header_data_length >= 5 {
            Some(read_timestamp(&data[9..14])?)
        } else {
            None
        };

        Ok(Self {
            stream_id,
            pts,
            payload: &data[payload_offset..end],
        })
    }

    pub fn packet_len(data: &[u8]) -> Option<usize> {
        (data.len() >= BASIC_HEADER_LEN)
            .then(|| BASIC_HEADER_LEN + u16::from_be_bytes([data[4], data[5]]) as usize)
    }
}

/// Decodes a 33-bit timestamp spread over five bytes with marker bits.
pub fn read_timestamp(p: &[u8]) -> Result<u64, PesError> {
    if p.len() < 5 {
        return Err(PesError::InsufficientData(p.len()));
    }
    if p[0] & 0x01 == 0 || p[2] & 0x01 == 0 || p[4] & 0x01 == 0 {
        return Err(PesError::InvalidPtsMarker);
    }

    let pts = ((p[0] as u64 >> 1) & 0x07) << 30
        | (p[1] as u64) << 22
        | (p[2] as u64 >> 1) << 15
        | (p[3] as u64) << 7
        | (p[4] as u64 >> 1);

    Ok(pts & PTS_MASK)
}

/// An owned payload split out of a PES stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesPayload {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub data: Vec<u8>,
}

/// Splits a byte stream of back-to-back PES packets.
///
/// Garbage between packets is skipped up to the next start code. Payloads
/// preceding the first timestamped packet are dropped: the output clock
/// cannot start without a reference.
#[derive(Debug)]
pub struct PesReader {
    buffer: Vec<u8>,
    stream_id: Option<u8>,
    started: bool,
    require_initial_pts: bool,
    dropped_packets: usize,
}

impl Default for PesReader {
    fn default() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            stream_id: None,
            started: false,
            require_initial_pts: true,
            dropped_packets: 0,
        }
    }
}

impl PesReader {
    /// Only yields packets of `stream_id`; other streams are skipped.
    /// Without it every audio stream passes, see [`is_audio_stream`].
    pub fn with_stream_id(mut self, stream_id: u8) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Whether payloads before the first timestamped packet are dropped.
    pub fn require_initial_pts(mut self, required: bool) -> Self {
        self.require_initial_pts = required;
        self
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn dropped_packets(&self) -> usize {
        self.dropped_packets
    }

    /// Drops everything before the next start code, keeping a possible
    /// partial start code at the tail.
    fn resync(&mut self) {
        let found = self
            .buffer
            .windows(START_CODE.len())
            .position(|w| w == START_CODE);

        let skip = match found {
            Some(pos) => pos,
            None => self.buffer.len().saturating_sub(START_CODE.len() - 1),
        };

        if skip > 0 {
            debug!("PES reader skipped {skip} bytes");
            self.buffer.drain(..skip);
        }
    }
}

impl Iterator for PesReader {
    type Item = Result<PesPayload, PesError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.resync();

            let total = PesPacket::packet_len(&self.buffer)?;
            if total == BASIC_HEADER_LEN {
                let stream_id = self.buffer[3];
                self.buffer.drain(..START_CODE.len());
                self.dropped_packets += 1;

                let err = PesError::MissingLength(stream_id);
                error!("{err}");
                return Some(Err(err));
            }

            if self.buffer.len() < total {
                return None;
            }

            let result = PesPacket::parse(&self.buffer[..total]).map(|packet| PesPayload {
                stream_id: packet.stream_id,
                pts: packet.pts,
                data: packet.payload.to_vec(),
            });
            self.buffer.drain(..total);

            let payload = match result {
                Ok(payload) => payload,
                Err(e) => {
                    self.dropped_packets += 1;
                    return Some(Err(e));
                }
            };

            let wanted = match self.stream_id {
                Some(id) => id == payload.stream_id,
                None => is_audio_stream(payload.stream_id),
            };
            if !wanted {
                trace!("Skipping PES packet of stream {:#04X}", payload.stream_id);
                continue;
            }

            if !self.started {
                if self.require_initial_pts && payload.pts.is_none() {
                    debug!("Dropping PES payload without PTS before stream start");
                    self.dropped_packets += 1;
                    continue;
                }
                self.started = true;
            }

            return Some(Ok(payload));
        }
    }
}

#[cfg(test)]
pub(crate) fn build_packet(stream_id: u8, pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    let header_data: Vec<u8> = match pts {
        Some(pts) => vec![
            0x21 | ((pts >> 29) & 0x0E) as u8,
            (pts >> 22) as u8,
            0x01 | ((pts >> 14) & 0xFE) as u8,
            (pts >> 7) as u8,
            0x01 | ((pts << 1) & 0xFE) as u8,
        ],
        None => Vec::new(),
    };

    let mut packet = START_CODE.to_vec();
    packet.push(stream_id);
    packet.extend(((3 + header_data.len() + payload.len()) as u16).to_be_bytes());
    packet.push(0x80);
    packet.push(if pts.is_some() { 0x80 } else { 0x00 });
    packet.push(header_data.len() as u8);
    packet.extend(header_data);
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_packet_with_pts() -> anyhow::Result<()> {
        let pts = 0x1_2345_6789;
        let data = build_packet(0xC0, Some(pts), &[0xAA, 0xBB, 0xCC]);

        let packet = PesPacket::parse(&data)?;
        assert_eq!(packet.stream_id, 0xC0);
        assert_eq!(packet.pts, Some(pts));
        assert_eq!(packet.payload, [0xAA, 0xBB, 0xCC]);
        Ok(())
    }

    #[test]
    fn parse_rejects_unbounded_packets() {
        let mut data = build_packet(0xC0, None, &[0xAA]);
        data[4] = 0;
        data[5] = 0;
        assert!(matches!(
            PesPacket::parse(&data),
            Err(PesError::MissingLength(0xC0))
        ));
        assert!(matches!(
            PesPacket::parse(&[0x00, 0x00, 0x02, 0xC0, 0x00, 0x01, 0x00]),
            Err(PesError::InvalidStartCode)
        ));
    }

    #[test]
    fn reader_splits_and_resyncs() {
        let mut stream = vec![0x12, 0x34];
        stream.extend(build_packet(0xC0, None, &[1]));
        stream.extend(build_packet(0xC0, Some(9000), &[2, 3]));
        stream.extend(build_packet(0xE0, Some(9000), &[4]));
        stream.extend(build_packet(0xC0, None, &[5]));

        let mut reader = PesReader::default().with_stream_id(0xC0);
        // split inside the second packet
        reader.push_bytes(&stream[..20]);
        let early: Vec<_> = reader.by_ref().collect();
        assert!(early.is_empty());

        reader.push_bytes(&stream[20..]);
        let payloads: Vec<_> = reader.by_ref().filter_map(Result::ok).collect();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].pts, Some(9000));
        assert_eq!(payloads[0].data, [2, 3]);
        assert_eq!(payloads[1].pts, None);
        assert_eq!(payloads[1].data, [5]);
        assert_eq!(reader.dropped_packets(), 1);

        // without a stream id only audio streams pass
        let mut stream = build_packet(0xE0, Some(0), &[0x47; 8]);
        stream.extend(build_packet(0xBD, Some(3600), &[6]));
        stream.extend(build_packet(0xE0, None, &[0x47; 8]));
        stream.extend(build_packet(0xC1, None, &[7]));

        let mut reader = PesReader::default();
        reader.push_bytes(&stream);
        let payloads: Vec<_> = reader.by_ref().filter_map(Result::ok).collect();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].stream_id, 0xBD);
        assert_eq!(payloads[0].pts, Some(3600));
        assert_eq!(payloads[1].stream_id, 0xC1);
        assert_eq!(payloads[1].data, [7]);
        assert_eq!(reader.dropped_packets(), 0);
    }

    #[test]
    fn initial_pts_can_be_optional() {
        let mut stream = build_packet(0xC0, None, &[1]);
        stream.extend(build_packet(0xC0, Some(9000), &[2]));

        let mut reader = PesReader::default().require_initial_pts(false);
        reader.push_bytes(&stream);
        let payloads: Vec<_> = reader.by_ref().filter_map(Result::ok).collect();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].pts, None);
        assert_eq!(payloads[0].data, [1]);
        assert_eq!(reader.dropped_packets(), 0);
    }
}
