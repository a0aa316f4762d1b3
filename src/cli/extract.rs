use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar};

use super::command::{Cli, ExtractArgs};
use super::progress::{create_progress_bar, estimate_total_frames};
use super::scan::{extractor_config, payload_reader};
use crate::timestamp::{pts_str, time_str};
use esframe::process::POLL_THRESHOLD;
use esframe::process::decode::{
    AudioDecoder, AudioRender, DecodeLoop, DecodeLoopConfig, DecodeLoopStats, DecodedAudio,
    LoopHandle,
};
use esframe::process::extract::Frame;
use esframe::process::shared::SharedExtractor;
use esframe::structs::codec::{HeaderCheck, StreamFormat};
use esframe::utils::timing::ticks_to_seconds;

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Extracting frames: {} (strict mode: {}, verify: {})",
        args.stream.input.display(),
        cli.strict,
        args.verify
    );

    let config = extractor_config(&args.stream)?;
    let mut reader = payload_reader(&args.stream, cli)?;

    let should_estimate = !args.no_estimate_progress && !reader.is_pipe() && multi.is_some();
    let total_frames = if should_estimate {
        Some(estimate_total_frames(&args.stream, cli)?)
    } else {
        if reader.is_pipe() {
            log::debug!("Skipping progress estimation for pipe input");
        } else if args.no_estimate_progress {
            log::debug!("Progress estimation disabled by --no-estimate-progress flag");
        }
        None
    };

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_frames)?),
        None => None,
    };

    let output: Option<Box<dyn Write + Send>> = match &args.output_path {
        Some(path) if path.to_string_lossy() == "-" => Some(Box::new(io::stdout())),
        Some(path) => {
            log::info!("Creating output file: {}", path.display());
            Some(Box::new(File::create(path)?))
        }
        None => None,
    };

    let shared = SharedExtractor::new(config);
    let loop_config = DecodeLoopConfig {
        fail_level: cli.fail_level(),
        ..Default::default()
    };
    let render = FrameWriter::new(output, !args.verify, pb.clone());
    let mut decode_loop = DecodeLoop::new(shared.clone(), HeaderVerifier, render, loop_config);
    let handle = decode_loop.handle();

    let start_time = std::time::Instant::now();

    let consumer = {
        let handle = handle.clone();
        thread::spawn(move || -> Result<(DecodeLoopStats, FrameWriter)> {
            let result = decode_loop.run();
            // unblocks the producer if the loop failed
            handle.shutdown();
            let stats = result?;
            let (_, render) = decode_loop.into_parts();
            Ok((stats, render))
        })
    };

    let produced = reader.process_payloads(|data, pts| {
        Ok(write_with_backpressure(&shared, &handle, data, pts, loop_config.poll_interval))
    });

    // let the consumer drain what is left, then stop it
    while handle.is_running() && shared.info().frame_size != 0 {
        thread::sleep(loop_config.poll_interval);
    }
    handle.shutdown();

    let (stats, mut render) = match consumer.join() {
        Ok(result) => result?,
        Err(_) => bail!("Decode loop thread panicked"),
    };
    let bytes_read = produced?;
    render.finish()?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    log::info!(
        "Wrote {} frames ({} bytes, {}) from {bytes_read} input bytes in {elapsed:.3}s",
        render.frames,
        render.bytes,
        time_str(ticks_to_seconds(render.duration_ticks))
    );
    log::info!(
        "Skipped {} bytes, {} decode failures, {} resets, {} PES packets dropped",
        shared.skipped_bytes(),
        stats.decode_failures,
        stats.resets,
        reader.dropped_packets()
    );

    Ok(())
}

/// Appends `data`, waiting for the consumer whenever the buffer is short
/// of space. Payloads larger than the poll threshold go in several parts;
/// only the first part carries `pts`. Returns `false` once the consumer
/// has stopped.
fn write_with_backpressure(
    shared: &SharedExtractor,
    handle: &LoopHandle,
    data: &[u8],
    mut pts: Option<u64>,
    interval: Duration,
) -> bool {
    for part in data.chunks(POLL_THRESHOLD) {
        while !shared.poll() || !shared.write(part, pts) {
            if !handle.is_running() {
                return false;
            }
            shared.wait_for_space(POLL_THRESHOLD + 1, interval);
        }
        pts = None;
    }
    true
}

/// Re-reads the header of every frame; a frame whose header no longer
/// decodes to its own length is reported as a decode failure.
struct HeaderVerifier;

impl AudioDecoder for HeaderVerifier {
    fn decode(&mut self, frame: &Frame) -> Result<DecodedAudio> {
        let codec = frame.format().codec;
        match codec.full_check(&frame.data, frame.len()) {
            HeaderCheck::Valid(header) if header.frame_size == frame.len() => Ok(DecodedAudio {
                consumed: frame.len(),
                pts: None,
                samples: header.samples_per_frame,
                data: frame.data.clone(),
            }),
            HeaderCheck::Valid(header) => bail!(
                "{codec} header announces {} bytes, frame has {}",
                header.frame_size,
                frame.len()
            ),
            _ => bail!("{codec} header no longer valid"),
        }
    }

    fn flush(&mut self) {}
}

/// Writes frames back to back, optionally after verification.
struct FrameWriter {
    output: Option<BufWriter<Box<dyn Write + Send>>>,
    passthrough: bool,
    pb: Option<ProgressBar>,
    format: Option<StreamFormat>,
    frames: u64,
    bytes: u64,
    duration_ticks: u64,
}

impl FrameWriter {
    fn new(output: Option<Box<dyn Write + Send>>, passthrough: bool, pb: Option<ProgressBar>) -> Self {
        Self {
            output: output.map(BufWriter::new),
            passthrough,
            pb,
            format: None,
            frames: 0,
            bytes: 0,
            duration_ticks: 0,
        }
    }

    fn write(&mut self, data: &[u8], pts: Option<u64>, duration_ticks: u64) -> Result<()> {
        if let Some(output) = &mut self.output {
            output.write_all(data)?;
        }

        self.frames += 1;
        self.bytes += data.len() as u64;
        self.duration_ticks += duration_ticks;

        if let Some(pb) = &self.pb {
            pb.set_position(self.frames);
            if self.frames.is_multiple_of(100) {
                pb.set_message(format!("PTS {}", pts_str(pts)));
            }
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(output) = &mut self.output {
            output.flush()?;
        }
        Ok(())
    }
}

impl AudioRender for FrameWriter {
    fn set_format(&mut self, format: StreamFormat) -> bool {
        if let Some(pb) = &self.pb {
            pb.set_message(format.to_string());
        }
        self.format = Some(format);
        true
    }

    fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    fn ready(&self) -> bool {
        true
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.write(&frame.data, frame.pts, frame.info.duration_ticks())?;
        Ok(frame.len())
    }

    fn write_decoded(&mut self, audio: &DecodedAudio) -> Result<bool> {
        let sampling_rate = self.format.map_or(0, |format| format.sampling_rate);
        let duration = esframe::utils::timing::samples_to_ticks(audio.samples, sampling_rate);
        self.write(&audio.data, audio.pts, duration)?;
        Ok(true)
    }

    fn flush(&mut self) {
        log::debug!("Output resynchronizing after {} frames", self.frames);
    }
}
