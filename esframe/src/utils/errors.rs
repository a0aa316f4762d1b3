#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Reasons a full header check rejects a candidate frame start.
///
/// These never reach the caller of the extractor; the scan logs them at
/// trace level and moves on to the next offset.
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("MPEG audio: reserved version")]
    MpegReservedVersion,

    #[error("MPEG audio: reserved sampling rate index {0}")]
    MpegReservedSamplingRate(u8),

    #[error("MPEG audio: free or reserved bitrate index {0}")]
    MpegInvalidBitrate(u8),

    #[error("AC-3: reserved fscod")]
    Ac3ReservedSamplingRate,

    #[error("AC-3: frmsizecod {0} out of range")]
    Ac3InvalidFrameSizeCode(u8),

    #[error("E-AC-3: reserved fscod and fscod2")]
    Eac3ReservedSamplingRate,

    #[error("ADTS: reserved sampling frequency index {0}")]
    AdtsReservedSamplingRate(u8),

    #[error("ADTS: unsupported channel configuration {0}")]
    AdtsInvalidChannelConfig(u8),

    #[error("DTS: reserved core sampling frequency {0}")]
    DtsReservedSamplingRate(u8),

    #[error("DTS: unsupported audio channel arrangement {0:#04X}")]
    DtsInvalidChannelArrangement(u8),

    #[error("{codec}: frame length {length} is shorter than its own header")]
    FrameTooShort { codec: &'static str, length: usize },

    #[error("Header read failed: {0}")]
    Read(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PesError {
    #[error("Insufficient data for PES header: {0} bytes")]
    InsufficientData(usize),

    #[error("Missing PES start code prefix")]
    InvalidStartCode,

    #[error("PES packet without length field dropped (stream id {0:#04X})")]
    MissingLength(u8),

    #[error("PES header data length {header} exceeds packet length {packet}")]
    HeaderTooLong { header: usize, packet: usize },

    #[error("PTS marker bits not set")]
    InvalidPtsMarker,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeLoopError {
    #[error("Failed to decode {codec} frame of {size} bytes: {source}")]
    DecodeFailed {
        codec: &'static str,
        size: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Decoder consumed no data from a {0} byte frame")]
    NothingConsumed(usize),

    #[error("Render rejected channel layout: {channels} channels at {sampling_rate} Hz")]
    UnsupportedLayout { channels: u32, sampling_rate: u32 },
}
