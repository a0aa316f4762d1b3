use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{Level, debug, info};

use crate::log_or_err;
use crate::process::extract::Frame;
use crate::process::shared::SharedExtractor;
use crate::structs::codec::StreamFormat;
use crate::utils::errors::DecodeLoopError;
use crate::utils::timing::PtsTracker;

/// Longest single sleep of [`LoopHandle::reset`] between checks.
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Turns compressed frames into audio for an [`AudioRender`].
pub trait AudioDecoder {
    /// Decodes one frame. `consumed` in the result tells the loop how many
    /// bytes to discard from the stream; 0 counts as a failure.
    fn decode(&mut self, frame: &Frame) -> Result<DecodedAudio>;

    /// Drops internal state, called before frames of a different codec.
    fn flush(&mut self);
}

/// Output side of the loop, either playing decoded audio or passing the
/// compressed frames through unchanged.
pub trait AudioRender {
    /// Configures the output. `false` means the layout cannot be played.
    fn set_format(&mut self, format: StreamFormat) -> bool;

    /// Whether frames bypass the decoder.
    fn is_passthrough(&self) -> bool;

    /// Whether the output can accept another frame or decoded block now.
    fn ready(&self) -> bool;

    /// Writes a compressed frame, returns the bytes accepted. 0 means the
    /// output is full and the frame is offered again later.
    fn write_frame(&mut self, frame: &Frame) -> Result<usize>;

    /// Writes decoded audio, `false` when it has to be offered again later.
    fn write_decoded(&mut self, audio: &DecodedAudio) -> Result<bool>;

    /// Discards queued output.
    fn flush(&mut self);
}

/// Output of one [`AudioDecoder::decode`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedAudio {
    pub consumed: usize,
    /// Filled in by the loop from the source frame.
    pub pts: Option<u64>,
    pub samples: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeLoopConfig {
    /// Longest sleep while waiting for data or for the render.
    pub poll_interval: Duration,
    /// Decode failures at or above this level are returned as errors.
    pub fail_level: Level,
}

impl Default for DecodeLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            fail_level: Level::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeLoopStats {
    pub frames_delivered: u64,
    pub decode_failures: u64,
    pub resets: u64,
    pub format_changes: u64,
}

/// What a single [`DecodeLoop::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame went to the render or the decoder.
    Delivered { bytes: usize },
    /// Pending decoded audio was accepted by the render.
    Rendered,
    /// The stream was dropped and synchronization starts over.
    Reset,
    /// Nothing to do; the loop slept up to the poll interval.
    Waiting,
    Stopped,
}

/// Control side of a [`DecodeLoop`], usable from any thread.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    shared: SharedExtractor,
    reset_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Asks the loop to drop everything buffered before the next frame.
    ///
    /// Returns at once; bytes written before the loop gets to the request
    /// are dropped with the rest. Use [`reset`](Self::reset) when a new
    /// stream follows right away.
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
        self.shared.notify();
    }

    /// Requests a reset and waits until the loop has applied it, so bytes
    /// written afterwards start the new stream.
    ///
    /// Returns `false` if the loop did not get to it within `timeout`; the
    /// request then stays pending. A stopped loop has its buffer dropped
    /// right here.
    pub fn reset(&self, timeout: Duration) -> bool {
        self.request_reset();

        let deadline = Instant::now() + timeout;
        while self.reset_requested.load(Ordering::SeqCst) {
            if !self.is_running() {
                self.shared.reset();
                self.reset_requested.store(false, Ordering::SeqCst);
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.shared.wait((deadline - now).min(RESET_POLL_INTERVAL));
        }
        true
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shared.notify();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn reset_pending(&self) -> bool {
        self.reset_requested.load(Ordering::SeqCst)
    }

    fn reset_done(&self) {
        self.reset_requested.store(false, Ordering::SeqCst);
        self.shared.notify();
    }
}

/// Consumer side: moves frames from a [`SharedExtractor`] to a decoder or
/// straight to the render.
///
/// Each [`step`](Self::step) first honours a pending reset, then
/// reconfigures the render when the detected format differs from the last
/// configured one, delivers at most one frame and offers pending decoded
/// audio to the render. When none of that was possible it sleeps on the
/// extractor for up to [`DecodeLoopConfig::poll_interval`], so a reset or
/// shutdown request is seen promptly.
///
/// A frame the decoder rejects means the frame boundaries can no longer be
/// trusted, so the whole buffer is dropped and synchronization starts over.
#[derive(Debug)]
pub struct DecodeLoop<D, R> {
    shared: SharedExtractor,
    decoder: D,
    render: R,
    config: DecodeLoopConfig,
    handle: LoopHandle,
    configured: Option<StreamFormat>,
    leftover: Option<DecodedAudio>,
    pts_tracker: PtsTracker,
    stats: DecodeLoopStats,
}

impl<D: AudioDecoder, R: AudioRender> DecodeLoop<D, R> {
    pub fn new(shared: SharedExtractor, decoder: D, render: R, config: DecodeLoopConfig) -> Self {
        let handle = LoopHandle {
            shared: shared.clone(),
            reset_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
        };

        Self {
            shared,
            decoder,
            render,
            config,
            handle,
            configured: None,
            leftover: None,
            pts_tracker: PtsTracker::default(),
            stats: DecodeLoopStats::default(),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn shared(&self) -> &SharedExtractor {
        &self.shared
    }

    pub fn stats(&self) -> DecodeLoopStats {
        self.stats
    }

    /// The format the render was last configured for.
    pub fn configured_format(&self) -> Option<StreamFormat> {
        self.configured
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    pub fn render_mut(&mut self) -> &mut R {
        &mut self.render
    }

    pub fn into_parts(self) -> (D, R) {
        (self.decoder, self.render)
    }

    /// Steps until [`LoopHandle::shutdown`] is called.
    pub fn run(&mut self) -> Result<DecodeLoopStats> {
        while self.step()? != Step::Stopped {}

        info!(
            "Decode loop stopped: {} frames, {} decode failures, {} resets",
            self.stats.frames_delivered, self.stats.decode_failures, self.stats.resets
        );
        Ok(self.stats)
    }

    pub fn step(&mut self) -> Result<Step> {
        if !self.handle.is_running() {
            return Ok(Step::Stopped);
        }

        if self.handle.reset_pending() {
            debug!("Reset requested");
            self.reset();
            // cleared only now, a waiting producer must not write before
            self.handle.reset_done();
            return Ok(Step::Reset);
        }

        let mut step = Step::Waiting;
        let mut blocked = false;

        if self.leftover.is_none() {
            if !self.configure()? {
                return Ok(Step::Reset);
            }

            step = if self.render.is_passthrough() {
                let accepted = if self.render.ready() {
                    self.pass_through()?
                } else {
                    None
                };
                match accepted {
                    Some(step) => step,
                    None => {
                        blocked = true;
                        Step::Waiting
                    }
                }
            } else {
                self.decode()?
            };

            if step == Step::Reset {
                return Ok(step);
            }
        }

        if let Some(audio) = self.leftover.take() {
            if self.render.ready() && self.render.write_decoded(&audio)? {
                if step == Step::Waiting {
                    step = Step::Rendered;
                }
            } else {
                self.leftover = Some(audio);
                blocked = true;
            }
        }

        if step == Step::Waiting {
            if blocked {
                self.shared.wait(self.config.poll_interval);
            } else {
                self.shared.wait_for_data(self.config.poll_interval);
            }
        }

        Ok(step)
    }

    /// Returns `false` when the render rejected the format and the stream
    /// was dropped.
    fn configure(&mut self) -> Result<bool> {
        let format = self.shared.info().format;
        if !format.codec.is_detectable()
            || format.sampling_rate == 0
            || self.configured == Some(format)
        {
            return Ok(true);
        }

        match self.configured {
            Some(previous) => {
                info!("Format changed: {previous} -> {format}");
                if previous.codec != format.codec {
                    self.decoder.flush();
                }
            }
            None => info!("Stream format: {format}"),
        }
        self.stats.format_changes += 1;

        if !self.render.set_format(format) {
            self.configured = None;
            self.reset();
            log_or_err!(
                self.config,
                Level::Warn,
                DecodeLoopError::UnsupportedLayout {
                    channels: format.channels,
                    sampling_rate: format.sampling_rate,
                }
            );
            return Ok(false);
        }

        self.configured = Some(format);
        Ok(true)
    }

    /// `None` when the render took nothing; the frame stays buffered and
    /// is offered again.
    fn pass_through(&mut self) -> Result<Option<Step>> {
        let Some(mut frame) = self.shared.current_frame() else {
            return Ok(Some(Step::Waiting));
        };
        let tracker = self.pts_tracker;
        frame.pts = self
            .pts_tracker
            .update(frame.pts, frame.info.duration_ticks());

        let written = self.render.write_frame(&frame)?.min(frame.len());
        self.shared.recycle(frame);
        if written == 0 {
            self.pts_tracker = tracker;
            return Ok(None);
        }

        self.shared.acknowledge_consumed(written, false);
        self.stats.frames_delivered += 1;
        Ok(Some(Step::Delivered { bytes: written }))
    }

    fn decode(&mut self) -> Result<Step> {
        let Some(mut frame) = self.shared.current_frame() else {
            return Ok(Step::Waiting);
        };
        frame.pts = self
            .pts_tracker
            .update(frame.pts, frame.info.duration_ticks());

        let size = frame.len();
        let result = self.decoder.decode(&frame);
        let codec = frame.format().codec;
        let pts = frame.pts;
        self.shared.recycle(frame);

        match result {
            Ok(mut audio) if audio.consumed > 0 => {
                let consumed = audio.consumed.min(size);
                self.shared.acknowledge_consumed(consumed, false);
                audio.pts = pts;
                self.leftover = Some(audio);
                self.stats.frames_delivered += 1;
                Ok(Step::Delivered { bytes: consumed })
            }
            Ok(_) => self.fail(DecodeLoopError::NothingConsumed(size)),
            Err(source) => self.fail(DecodeLoopError::DecodeFailed {
                codec: codec.name(),
                size,
                source: source.into(),
            }),
        }
    }

    fn fail(&mut self, err: DecodeLoopError) -> Result<Step> {
        self.stats.decode_failures += 1;
        self.reset();
        log_or_err!(self.config, Level::Warn, err);
        Ok(Step::Reset)
    }

    fn reset(&mut self) {
        self.shared.reset();
        self.render.flush();
        self.leftover = None;
        self.pts_tracker.reset();
        self.stats.resets += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::process::ExtractorConfig;
    use crate::structs::codec::Codec;

    /// 48 kHz stereo ADTS, 256 byte frames of 1024 samples.
    const ADTS_HEADER: [u8; 7] = [0xFF, 0xF1, 0x4C, 0x80, 0x20, 0x1F, 0xFC];
    /// 48 kHz 5.1 AC-3, 1536 byte frames.
    const AC3_HEADER: [u8; 7] = [0x0B, 0x77, 0x00, 0x00, 0x1C, 0x40, 0xE1];

    fn frames(header: &[u8], size: usize, count: usize) -> Vec<u8> {
        let mut frame = header.to_vec();
        frame.resize(size, 0);
        frame.repeat(count)
    }

    #[derive(Debug, Default)]
    struct MockDecoder {
        decoded: usize,
        fail_at: Option<usize>,
        flushes: usize,
    }

    impl AudioDecoder for MockDecoder {
        fn decode(&mut self, frame: &Frame) -> Result<DecodedAudio> {
            if self.fail_at == Some(self.decoded) {
                anyhow::bail!("corrupt frame");
            }
            self.decoded += 1;
            Ok(DecodedAudio {
                consumed: frame.len(),
                pts: None,
                samples: frame.info.samples_per_frame,
                data: vec![0; 16],
            })
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[derive(Debug)]
    struct MockRender {
        passthrough: bool,
        ready: bool,
        max_channels: u32,
        formats: Vec<StreamFormat>,
        frames: Vec<(Option<u64>, usize)>,
        decoded: Vec<Option<u64>>,
        flushes: usize,
        refuse_writes: usize,
    }

    impl MockRender {
        fn new(passthrough: bool) -> Self {
            Self {
                passthrough,
                ready: true,
                max_channels: 8,
                formats: Vec::new(),
                frames: Vec::new(),
                decoded: Vec::new(),
                flushes: 0,
                refuse_writes: 0,
            }
        }
    }

    impl AudioRender for MockRender {
        fn set_format(&mut self, format: StreamFormat) -> bool {
            self.formats.push(format);
            format.channels <= self.max_channels
        }

        fn is_passthrough(&self) -> bool {
            self.passthrough
        }

        fn ready(&self) -> bool {
            self.ready
        }

        fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
            if self.refuse_writes > 0 {
                self.refuse_writes -= 1;
                return Ok(0);
            }
            self.frames.push((frame.pts, frame.len()));
            Ok(frame.len())
        }

        fn write_decoded(&mut self, audio: &DecodedAudio) -> Result<bool> {
            self.decoded.push(audio.pts);
            Ok(true)
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    fn test_config() -> DecodeLoopConfig {
        DecodeLoopConfig {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn new_loop(
        decoder: MockDecoder,
        render: MockRender,
    ) -> DecodeLoop<MockDecoder, MockRender> {
        let shared = SharedExtractor::new(ExtractorConfig::default());
        DecodeLoop::new(shared, decoder, render, test_config())
    }

    #[test]
    fn passthrough_delivers_frames() -> Result<()> {
        let mut decode_loop = new_loop(MockDecoder::default(), MockRender::new(true));
        let mut data = frames(&ADTS_HEADER, 256, 3);
        data.extend_from_slice(&ADTS_HEADER);
        assert!(decode_loop.shared().write(&data, Some(1000)));

        for _ in 0..3 {
            assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });
        }
        assert_eq!(decode_loop.step()?, Step::Waiting);

        let render = decode_loop.render();
        assert_eq!(render.formats.len(), 1);
        assert_eq!(render.formats[0].codec, Codec::Aac);
        // one PTS per chunk, the rest extrapolated at 1920 ticks per frame
        assert_eq!(
            render.frames,
            [(Some(1000), 256), (Some(2920), 256), (Some(4840), 256)]
        );
        assert_eq!(decode_loop.shared().lock().buffered(), ADTS_HEADER.len());
        assert_eq!(decode_loop.stats().frames_delivered, 3);
        Ok(())
    }

    #[test]
    fn decode_failure_resets_stream() -> Result<()> {
        let decoder = MockDecoder {
            fail_at: Some(1),
            ..Default::default()
        };
        let mut decode_loop = new_loop(decoder, MockRender::new(false));
        decode_loop
            .shared()
            .write(&frames(&ADTS_HEADER, 256, 4), Some(0));

        assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });
        assert_eq!(decode_loop.step()?, Step::Reset);

        assert_eq!(decode_loop.shared().lock().buffered(), 0);
        assert_eq!(decode_loop.shared().info().format.codec, Codec::None);
        let stats = decode_loop.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.resets, 1);
        assert_eq!(decode_loop.render().flushes, 1);
        assert_eq!(decode_loop.render().decoded, [Some(0)]);
        Ok(())
    }

    #[test]
    fn strict_mode_returns_decode_failures() {
        let decoder = MockDecoder {
            fail_at: Some(0),
            ..Default::default()
        };
        let shared = SharedExtractor::default();
        let config = DecodeLoopConfig {
            fail_level: Level::Warn,
            ..test_config()
        };
        let mut decode_loop = DecodeLoop::new(shared, decoder, MockRender::new(false), config);
        decode_loop
            .shared()
            .write(&frames(&ADTS_HEADER, 256, 2), None);

        assert!(decode_loop.step().is_err());
        // the stream is dropped either way
        assert_eq!(decode_loop.shared().lock().buffered(), 0);
    }

    #[test]
    fn codec_change_reconfigures() -> Result<()> {
        let mut decode_loop = new_loop(MockDecoder::default(), MockRender::new(false));
        let mut data = frames(&ADTS_HEADER, 256, 2);
        data.extend(frames(&AC3_HEADER, 1536, 2));
        decode_loop.shared().write(&data, None);

        for _ in 0..4 {
            assert!(matches!(decode_loop.step()?, Step::Delivered { .. }));
        }

        let formats = &decode_loop.render().formats;
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].codec, Codec::Aac);
        assert_eq!(formats[1].codec, Codec::Ac3);
        assert_eq!(formats[1].channels, 6);
        assert_eq!(decode_loop.decoder().flushes, 1);
        assert_eq!(decode_loop.stats().format_changes, 2);
        Ok(())
    }

    #[test]
    fn unsupported_layout_drops_stream() -> Result<()> {
        let mut render = MockRender::new(true);
        render.max_channels = 2;
        let mut decode_loop = new_loop(MockDecoder::default(), render);
        decode_loop
            .shared()
            .write(&frames(&AC3_HEADER, 1536, 2), None);

        assert_eq!(decode_loop.step()?, Step::Reset);
        assert!(decode_loop.render().frames.is_empty());
        assert_eq!(decode_loop.configured_format(), None);
        assert_eq!(decode_loop.shared().lock().buffered(), 0);
        Ok(())
    }

    #[test]
    fn reset_request_takes_priority() -> Result<()> {
        let mut decode_loop = new_loop(MockDecoder::default(), MockRender::new(true));
        decode_loop
            .shared()
            .write(&frames(&ADTS_HEADER, 256, 3), None);

        decode_loop.handle().request_reset();
        assert_eq!(decode_loop.step()?, Step::Reset);
        assert!(decode_loop.render().frames.is_empty());
        assert_eq!(decode_loop.render().flushes, 1);
        assert_eq!(decode_loop.step()?, Step::Waiting);
        Ok(())
    }

    #[test]
    fn full_render_keeps_frame_buffered() -> Result<()> {
        let mut render = MockRender::new(true);
        render.refuse_writes = 1;
        let mut decode_loop = new_loop(MockDecoder::default(), render);
        let mut data = frames(&ADTS_HEADER, 256, 3);
        data.extend_from_slice(&ADTS_HEADER);
        decode_loop.shared().write(&data, Some(1000));

        assert!(matches!(decode_loop.step()?, Step::Delivered { .. }));
        // second frame refused, nothing dropped
        assert_eq!(decode_loop.step()?, Step::Waiting);
        assert_eq!(decode_loop.shared().lock().buffered(), 2 * 256 + ADTS_HEADER.len());

        assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });
        assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });

        let stats = decode_loop.stats();
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.resets, 0);
        assert_eq!(decode_loop.render().flushes, 0);
        assert_eq!(
            decode_loop.render().frames,
            [(Some(1000), 256), (Some(2920), 256), (Some(4840), 256)]
        );
        Ok(())
    }

    #[test]
    fn new_stream_survives_blocking_reset() -> Result<()> {
        let shared = SharedExtractor::default();
        let mut render = MockRender::new(true);
        // keeps every frame in the buffer until the reset
        render.ready = false;
        let mut decode_loop =
            DecodeLoop::new(shared.clone(), MockDecoder::default(), render, test_config());
        let handle = decode_loop.handle();

        shared.write(&frames(&AC3_HEADER, 1536, 2), Some(0));
        let consumer = thread::spawn(move || -> Result<_> {
            decode_loop.run()?;
            Ok(decode_loop)
        });

        assert!(handle.reset(Duration::from_secs(5)));
        let mut data = frames(&ADTS_HEADER, 256, 2);
        data.extend_from_slice(&ADTS_HEADER);
        assert!(shared.write(&data, Some(9000)));
        assert_eq!(shared.lock().buffered(), data.len());
        assert_eq!(shared.front_pts(), Some(9000));

        handle.shutdown();
        let decode_loop = consumer
            .join()
            .map_err(|_| anyhow::anyhow!("decode loop panicked"))??;
        assert_eq!(decode_loop.stats().resets, 1);
        assert_eq!(decode_loop.render().flushes, 1);
        assert_eq!(shared.lock().buffered(), data.len());
        Ok(())
    }

    #[test]
    fn reset_of_stopped_loop_drops_buffer() {
        let decode_loop = new_loop(MockDecoder::default(), MockRender::new(true));
        let handle = decode_loop.handle();
        decode_loop
            .shared()
            .write(&frames(&ADTS_HEADER, 256, 2), None);

        handle.shutdown();
        assert!(handle.reset(Duration::from_millis(10)));
        assert_eq!(decode_loop.shared().lock().buffered(), 0);
    }

    #[test]
    fn decoded_audio_waits_for_render() -> Result<()> {
        let mut render = MockRender::new(false);
        render.ready = false;
        let mut decode_loop = new_loop(MockDecoder::default(), render);
        let mut data = frames(&ADTS_HEADER, 256, 2);
        data.extend_from_slice(&ADTS_HEADER);
        decode_loop.shared().write(&data, Some(0));

        assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });
        // no second decode while the first block is pending
        assert_eq!(decode_loop.step()?, Step::Waiting);
        assert_eq!(decode_loop.decoder().decoded, 1);

        decode_loop.render_mut().ready = true;
        assert_eq!(decode_loop.step()?, Step::Rendered);
        assert_eq!(decode_loop.step()?, Step::Delivered { bytes: 256 });
        assert_eq!(decode_loop.render().decoded, [Some(0), Some(1920)]);
        Ok(())
    }

    #[test]
    fn run_until_shutdown() -> Result<()> {
        const FRAMES: usize = 50;

        let shared = SharedExtractor::default();
        let mut data = frames(&ADTS_HEADER, 256, FRAMES);
        data.extend_from_slice(&ADTS_HEADER);

        let mut decode_loop = DecodeLoop::new(
            shared.clone(),
            MockDecoder::default(),
            MockRender::new(true),
            test_config(),
        );
        let handle = decode_loop.handle();
        let consumer = thread::spawn(move || decode_loop.run());

        for chunk in data.chunks(1000) {
            assert!(shared.write(chunk, None));
        }

        for _ in 0..5000 {
            if shared.lock().buffered() == ADTS_HEADER.len() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        handle.shutdown();
        assert!(!handle.is_running());

        let stats = consumer
            .join()
            .map_err(|_| anyhow::anyhow!("decode loop panicked"))??;
        assert_eq!(stats.frames_delivered, FRAMES as u64);
        assert_eq!(stats.decode_failures, 0);
        Ok(())
    }
}
