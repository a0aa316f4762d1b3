use log::{debug, trace};

use crate::process::ExtractorConfig;
use crate::process::buffer::FrameBuffer;
use crate::structs::codec::{Codec, FAST_CHECK_LEN, HeaderCheck, StreamFormat, detect};
use crate::utils::buffer_pool::FramePool;
use crate::utils::timing::samples_to_ticks;

/// Synchronizes to audio frames in an arbitrarily chunked byte stream.
///
/// Bytes and their PTS go in through [`append`](Self::append). The first
/// complete, valid frame in the buffer is located lazily the first time any
/// accessor is called after a mutation, and exposed through
/// [`current_frame`](Self::current_frame) until the consumer discards it
/// with [`shrink`](Self::shrink).
///
/// # Example
///
/// ```rust,no_run
/// use esframe::process::extract::Extractor;
///
/// let mut extractor = Extractor::default();
/// let data = std::fs::read("stream.ac3")?;
///
/// for chunk in data.chunks(2048) {
///     if !extractor.append(chunk, None) {
///         break;
///     }
///
///     while let Some(frame) = extractor.current_frame() {
///         println!("{} frame, {} bytes", frame.info.format.codec, frame.data.len());
///         let consumed = frame.data.len();
///         extractor.shrink(consumed, false);
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Resynchronization
///
/// Candidates are tried byte by byte. A header that decodes to a plausible
/// frame is only accepted when another sync word follows at the predicted
/// end of the frame, or when the buffer does not reach that far yet. Bytes
/// before the accepted frame are dropped, their timestamps are kept for the
/// frame that follows.
#[derive(Debug)]
pub struct Extractor {
    buffer: FrameBuffer,
    detection_order: Vec<Codec>,
    info: FrameInfo,
    parsed: bool,
    last_format: Option<StreamFormat>,
    frame_pool: FramePool,
    skipped_bytes: u64,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            buffer: FrameBuffer::new(config.capacity),
            detection_order: config.detection_order(),
            info: FrameInfo::default(),
            // an empty buffer holds no frame
            parsed: true,
            last_format: None,
            frame_pool: FramePool::default(),
            skipped_bytes: 0,
        }
    }

    /// Appends a chunk of elementary stream data starting at `pts`.
    ///
    /// Returns `false` without side effects when there is not enough
    /// [`free_space`](Self::free_space).
    pub fn append(&mut self, bytes: &[u8], pts: Option<u64>) -> bool {
        let appended = self.buffer.append(bytes, pts);
        if appended {
            self.parsed = false;
        }
        appended
    }

    /// Discards `length` bytes from the front, usually the frame just consumed.
    pub fn shrink(&mut self, length: usize, retain_pts: bool) {
        if length >= self.buffer.len() {
            self.reset();
            return;
        }
        self.buffer.shrink(length, retain_pts);
        self.parsed = false;
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
        self.info = FrameInfo::default();
        self.parsed = true;
    }

    pub fn codec(&mut self) -> Codec {
        self.info().format.codec
    }

    pub fn channels(&mut self) -> u32 {
        self.info().format.channels
    }

    pub fn sampling_rate(&mut self) -> u32 {
        self.info().format.sampling_rate
    }

    /// Length of the current frame, 0 while no complete frame is buffered.
    pub fn frame_size(&mut self) -> usize {
        self.info().frame_size
    }

    pub fn is_empty(&mut self) -> bool {
        self.frame_size() == 0
    }

    pub fn format(&mut self) -> StreamFormat {
        self.info().format
    }

    /// Parameters of the detected frame.
    ///
    /// The format may already be known while `frame_size` is still 0, which
    /// lets the output side configure itself before the first full frame.
    pub fn info(&mut self) -> FrameInfo {
        if !self.parsed {
            self.parse();
        }
        self.info
    }

    pub fn front_pts(&self) -> Option<u64> {
        self.buffer.front_pts()
    }

    pub fn free_space(&self) -> usize {
        self.buffer.free_space()
    }

    /// Buffered bytes, including any not yet recognized as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Total bytes dropped while searching for frame starts.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// The current frame, borrowed until the next mutation.
    pub fn current_frame(&mut self) -> Option<FrameView<'_>> {
        let info = self.info();
        if info.frame_size == 0 {
            return None;
        }

        Some(FrameView {
            data: &self.buffer.as_slice()[..info.frame_size],
            pts: self.buffer.front_pts(),
            info,
        })
    }

    /// A copy of the current frame that outlives the next mutation.
    pub fn to_frame(&mut self) -> Option<Frame> {
        let info = self.info();
        if info.frame_size == 0 {
            return None;
        }

        Some(Frame {
            pts: self.buffer.front_pts(),
            info,
            data: self
                .frame_pool
                .acquire_copy(&self.buffer.as_slice()[..info.frame_size]),
        })
    }

    /// Hands the storage of a consumed frame back for reuse.
    pub fn recycle(&self, frame: Frame) {
        self.frame_pool.release(frame.data);
    }

    fn parse(&mut self) {
        let size = self.buffer.len();
        let mut offset = 0;
        let mut found = None;

        while size - offset >= FAST_CHECK_LEN {
            let p = self.buffer.padded(offset);
            let available = size - offset;

            if let Some(candidate) = detect(p, &self.detection_order) {
                match candidate.full_check(p, available) {
                    HeaderCheck::Valid(header) => {
                        let next = header.frame_size;
                        if available < next + FAST_CHECK_LEN
                            || detect(&p[next..], &self.detection_order).is_some()
                        {
                            found = Some(FrameInfo {
                                format: header.format,
                                frame_size: if next > available { 0 } else { next },
                                samples_per_frame: header.samples_per_frame,
                            });
                            break;
                        }
                        trace!(
                            "{} header at offset {offset} not followed by a sync word at +{next}",
                            header.codec()
                        );
                    }
                    HeaderCheck::Incomplete(codec) => {
                        found = Some(FrameInfo {
                            format: StreamFormat {
                                codec,
                                ..Default::default()
                            },
                            ..Default::default()
                        });
                        break;
                    }
                    HeaderCheck::Invalid => {}
                }
            }

            offset += 1;
        }

        if offset > 0 {
            debug!("Skipped {offset} of {size} buffered bytes");
            self.skipped_bytes += offset as u64;
            self.buffer.shrink(offset, true);
        }

        self.info = found.unwrap_or_default();
        self.parsed = true;

        if self.info.format.sampling_rate != 0 && self.last_format != Some(self.info.format) {
            debug!("Detected {}", self.info.format);
            self.last_format = Some(self.info.format);
        }
    }
}

/// Stream parameters and length of the detected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub format: StreamFormat,
    /// 0 while the frame is incomplete or no frame was found.
    pub frame_size: usize,
    pub samples_per_frame: u32,
}

impl FrameInfo {
    pub fn duration_ticks(&self) -> u64 {
        samples_to_ticks(self.samples_per_frame, self.format.sampling_rate)
    }
}

/// The current frame, borrowed from the [`Extractor`].
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub pts: Option<u64>,
    pub info: FrameInfo,
}

/// An owned copy of one complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Timestamp of the chunk this frame starts, if the frame starts it.
    pub pts: Option<u64>,
    pub info: FrameInfo,
    pub data: Vec<u8>,
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Frame {
    pub fn format(&self) -> StreamFormat {
        self.info.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::PADDING;

    const MPEG_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
    const MPEG_FRAME_SIZE: usize = 417;

    /// 48 kHz stereo ADTS, 256 byte frames.
    const ADTS_HEADER: [u8; 7] = [0xFF, 0xF1, 0x4C, 0x80, 0x20, 0x1F, 0xFC];

    fn frame(header: &[u8], size: usize) -> Vec<u8> {
        let mut data = header.to_vec();
        data.resize(size, 0);
        data
    }

    fn noise(len: usize) -> Vec<u8> {
        [0x12, 0x34, 0x21, 0x43].iter().copied().cycle().take(len).collect()
    }

    #[test]
    fn empty_after_reset() {
        let mut extractor = Extractor::default();
        assert!(extractor.is_empty());
        assert_eq!(extractor.codec(), Codec::None);

        extractor.append(&frame(&MPEG_HEADER, MPEG_FRAME_SIZE), Some(1));
        assert!(!extractor.is_empty());

        extractor.reset();
        assert!(extractor.is_empty());
        assert_eq!(extractor.codec(), Codec::None);
        assert_eq!(extractor.buffered(), 0);
        assert_eq!(extractor.front_pts(), None);
    }

    #[test]
    fn resync_after_noise() {
        const NOISE: usize = 37;

        let mut data = noise(NOISE);
        data.extend(frame(&MPEG_HEADER, MPEG_FRAME_SIZE));
        data.extend(frame(&MPEG_HEADER, 100));

        let mut extractor = Extractor::default();
        assert!(extractor.append(&data, Some(4500)));

        assert_eq!(extractor.codec(), Codec::Mpeg);
        assert_eq!(extractor.frame_size(), MPEG_FRAME_SIZE);
        assert_eq!(extractor.channels(), 2);
        assert_eq!(extractor.sampling_rate(), 44100);
        assert_eq!(extractor.buffered(), data.len() - NOISE);
        assert_eq!(extractor.skipped_bytes(), NOISE as u64);
        // skipping keeps the timestamp
        assert_eq!(extractor.front_pts(), Some(4500));

        let view = extractor.current_frame().unwrap();
        assert_eq!(view.data[..4], MPEG_HEADER);
        assert_eq!(view.data.len(), MPEG_FRAME_SIZE);
    }

    #[test]
    fn ac3_and_eac3_disambiguation() {
        // byte 5 = 0x40, bsid 8
        let ac3 = [0x0B, 0x77, 0x00, 0x00, 0x1C, 0x40, 0xE1];
        let mut extractor = Extractor::default();
        let mut data = frame(&ac3, 1536);
        data.extend_from_slice(&ac3);
        extractor.append(&data, None);

        assert_eq!(extractor.codec(), Codec::Ac3);
        assert_eq!(extractor.frame_size(), 1536);
        assert_eq!(extractor.channels(), 6);

        // same prefix, byte 5 = 0x80, bsid 16; frame size now from frmsiz
        let eac3 = [0x0B, 0x77, 0x01, 0x7F, 0x3F, 0x80, 0x00];
        let mut extractor = Extractor::default();
        let mut data = frame(&eac3, 768);
        data.extend_from_slice(&eac3);
        extractor.append(&data, None);

        assert_eq!(extractor.codec(), Codec::Eac3);
        assert_eq!(extractor.frame_size(), 768);
    }

    #[test]
    fn partial_frame_waits_for_data() {
        let full = frame(&ADTS_HEADER, 256);
        let mut extractor = Extractor::default();

        extractor.append(&full[..3], Some(90));
        assert_eq!(extractor.frame_size(), 0);
        assert!(extractor.is_empty());
        // nothing discarded, the bytes may still start a frame
        assert_eq!(extractor.buffered(), 3);

        extractor.append(&full[3..5], None);
        assert_eq!(extractor.codec(), Codec::Aac);
        assert_eq!(extractor.frame_size(), 0);
        assert_eq!(extractor.buffered(), 5);

        extractor.append(&full[5..100], None);
        assert_eq!(extractor.codec(), Codec::Aac);
        assert_eq!(extractor.channels(), 2);
        assert_eq!(extractor.sampling_rate(), 48000);
        assert!(extractor.is_empty());

        extractor.append(&full[100..], None);
        assert_eq!(extractor.frame_size(), 256);
        assert_eq!(extractor.front_pts(), Some(90));
    }

    #[test]
    fn unconfirmed_header_is_skipped() {
        // plausible MPEG header whose successor is missing
        let mut data = frame(&MPEG_HEADER, 600);
        let real_start = data.len();
        data.extend(frame(&ADTS_HEADER, 256));
        data.extend_from_slice(&ADTS_HEADER);

        let mut extractor = Extractor::default();
        extractor.append(&data, None);

        assert_eq!(extractor.codec(), Codec::Aac);
        assert_eq!(extractor.frame_size(), 256);
        assert_eq!(extractor.skipped_bytes(), real_start as u64);
    }

    #[test]
    fn garbage_only() {
        let mut extractor = Extractor::default();
        extractor.append(&noise(1000), Some(1));

        assert!(extractor.is_empty());
        assert_eq!(extractor.codec(), Codec::None);
        // the tail may still be the start of a sync word
        assert_eq!(extractor.buffered(), FAST_CHECK_LEN - 1);
    }

    #[test]
    fn consume_frames_in_sequence() {
        let mut extractor = Extractor::default();
        let dts = [
            0x7F, 0xFE, 0x80, 0x01, 0xFC, 0x3C, 0x7D, 0xC2, 0x74, 0x00, 0x04,
        ];
        let one = frame(&dts, 2013);

        // PES-sized chunks cutting through the frames
        let mut stream = one.repeat(3);
        stream.extend_from_slice(&dts);
        for (i, chunk) in stream.chunks(1500).enumerate() {
            assert!(extractor.append(chunk, Some(i as u64 * 1000)));
        }

        let mut frames = Vec::new();
        while let Some(frame) = extractor.to_frame() {
            extractor.shrink(frame.len(), false);
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.format().codec == Codec::Dts));
        assert!(frames.iter().all(|f| f.format().channels == 6));
        assert_eq!(frames[0].pts, Some(0));
        // frame 1 starts inside chunk 1, whose PTS was cleared
        assert_eq!(frames[1].pts, None);
        assert_eq!(frames[0].info.duration_ticks(), 960);
        assert_eq!(extractor.buffered(), dts.len());
    }

    #[test]
    fn latm_detection_is_configurable() {
        let latm = [0x56, 0xE0, 0x7D];
        let mut data = frame(&latm, 0x7D + 3);
        data.extend_from_slice(&[0x56, 0xE0, 0x7D, 0x00]);

        let mut extractor = Extractor::default();
        extractor.append(&data, None);
        assert_eq!(extractor.codec(), Codec::AacLatm);
        assert_eq!(extractor.frame_size(), 0x7D + 3);

        let mut extractor = Extractor::new(ExtractorConfig {
            latm: false,
            ..Default::default()
        });
        extractor.append(&data, None);
        assert_eq!(extractor.codec(), Codec::None);
    }

    #[test]
    fn rejected_append_leaves_state() {
        let mut extractor = Extractor::new(ExtractorConfig {
            capacity: 1024,
            ..Default::default()
        });
        let data = frame(&ADTS_HEADER, 256);
        assert!(extractor.append(&data, None));
        assert_eq!(extractor.frame_size(), 256);

        let free = extractor.free_space();
        assert_eq!(free, 1024 - 256 - PADDING);
        assert!(!extractor.append(&vec![0; free + 1], None));
        assert_eq!(extractor.buffered(), 256);
        assert_eq!(extractor.frame_size(), 256);
    }

    #[test]
    fn recycled_frames_are_reused() {
        let mut extractor = Extractor::default();
        let mut data = frame(&ADTS_HEADER, 256).repeat(2);
        data.extend_from_slice(&ADTS_HEADER);
        extractor.append(&data, None);

        let first = extractor.to_frame().unwrap();
        let ptr = first.data.as_ptr();
        extractor.shrink(first.len(), false);
        extractor.recycle(first);

        let second = extractor.to_frame().unwrap();
        assert_eq!(second.data.as_ptr(), ptr);
        assert_eq!(second.as_ref()[..7], ADTS_HEADER);
    }
}
