use crate::structs::codec::{Codec, DETECTION_ORDER};

/// Byte staging between packet reception and frame synchronization.
///
/// Provides the [`FrameBuffer`](buffer::FrameBuffer): fixed-capacity storage
/// with a zeroed padding tail and the queue mapping byte ranges to PTS values.
pub mod buffer;

/// Frame boundary detection.
///
/// Provides the [`Extractor`](extract::Extractor), which locates the first
/// valid frame among the buffered bytes and exposes it as a
/// [`FrameView`](extract::FrameView) or an owned [`Frame`](extract::Frame).
pub mod extract;

/// Thread-safe access for one producer and one consumer.
///
/// Provides the [`SharedExtractor`](shared::SharedExtractor).
pub mod shared;

/// The consumer side: feeding frames to a decoder or a pass-through render.
///
/// Provides the [`DecodeLoop`](decode::DecodeLoop) driven by the
/// [`AudioDecoder`](decode::AudioDecoder) and [`AudioRender`](decode::AudioRender)
/// collaborators.
pub mod decode;

/// Default buffer size, padding included. Holds several of the largest
/// (DTS and E-AC-3) frames.
pub const DEFAULT_CAPACITY: usize = 256 * 1024;

/// Zeroed bytes kept after the last valid byte. Header checks may read
/// this far past the logical end of the data.
pub const PADDING: usize = 64;

/// Producers should stop writing once free space drops to this level.
pub const POLL_THRESHOLD: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Total buffer capacity in bytes, padding included.
    pub capacity: usize,
    /// Detect LOAS/LATM AAC. Its 11-bit sync word is weak and the detector
    /// assumes stereo at 48 kHz, so streams known not to carry LATM may
    /// turn it off.
    pub latm: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            latm: true,
        }
    }
}

impl ExtractorConfig {
    /// Fast-check priority order under this configuration.
    pub fn detection_order(&self) -> Vec<Codec> {
        DETECTION_ORDER
            .iter()
            .copied()
            .filter(|codec| self.latm || *codec != Codec::AacLatm)
            .collect()
    }
}

#[test]
fn detection_order_honours_latm_switch() {
    let config = ExtractorConfig::default();
    assert_eq!(config.detection_order(), DETECTION_ORDER);

    let config = ExtractorConfig {
        latm: false,
        ..Default::default()
    };
    assert_eq!(
        config.detection_order(),
        [Codec::Mpeg, Codec::Ac3, Codec::Aac, Codec::Dts]
    );
}
