use std::fs::File;
use std::io::BufWriter;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs, InputFormat};
use super::scan::{extractor_config, feed, payload_reader};
use crate::timestamp::{pts_str, time_str};
use esframe::process::extract::{Extractor, FrameInfo, FrameView};
use esframe::structs::codec::StreamFormat;
use esframe::utils::timing::{PtsTracker, pts_delta, ticks_to_seconds};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing stream: {}", args.stream.input.display());

    let summary = analyze_stream(args, cli, multi)?;

    if summary.segments.is_empty() {
        println!("No audio frames found in the input.");
        println!("This doesn't appear to be a supported elementary stream.");
    } else {
        display_summary(&summary);
    }

    if let Some(path) = &args.report {
        log::info!("Writing report: {}", path.display());
        let writer = BufWriter::new(File::create(path)?);
        serde_yaml_ng::to_writer(writer, &summary)?;
    }

    Ok(())
}

fn analyze_stream(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<Summary> {
    let mut reader = payload_reader(&args.stream, cli)?;
    let mut extractor = Extractor::new(extractor_config(&args.stream)?);
    let mut context = AnalysisContext {
        list_frames: args.list_frames,
        ..Default::default()
    };

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing frames...");
        context.pb = Some(pb);
    }

    let bytes_read = reader.process_payloads(|data, pts| {
        feed(&mut extractor, data, pts, |frame| {
            context.process_frame(frame);
            Ok(())
        })?;
        Ok(true)
    })?;

    if let Some(pb) = context.pb.take() {
        pb.finish_and_clear();
    }

    let trailing = extractor.buffered();
    if trailing > 0 {
        log::debug!("{trailing} bytes left over at end of input");
    }

    Ok(Summary {
        input: args.stream.input.display().to_string(),
        input_format: match args.stream.input_format {
            InputFormat::Es => "es",
            InputFormat::Pes => "pes",
        },
        bytes: bytes_read,
        frames: context.frame_count,
        skipped_bytes: extractor.skipped_bytes(),
        trailing_bytes: trailing,
        dropped_packets: reader.dropped_packets(),
        first_pts: context.first_pts,
        last_pts: context.last_pts,
        duration_seconds: ticks_to_seconds(context.duration_ticks),
        segments: context.segments,
    })
}

#[derive(Default)]
struct AnalysisContext {
    list_frames: bool,
    frame_count: u64,
    first_pts: Option<u64>,
    last_pts: Option<u64>,
    duration_ticks: u64,
    tracker: PtsTracker,
    segments: Vec<Segment>,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn process_frame(&mut self, frame: FrameView<'_>) {
        let info = frame.info;
        let pts = self.tracker.update(frame.pts, info.duration_ticks());

        if self.first_pts.is_none() {
            self.first_pts = frame.pts;
        }
        if frame.pts.is_some() {
            self.last_pts = frame.pts;
        }

        match self.segments.last_mut() {
            Some(segment) if segment.format() == info.format => segment.add(&info, frame.data.len()),
            previous => {
                if let Some(previous) = previous {
                    log::info!(
                        "Format change at frame {}: {} -> {}",
                        self.frame_count,
                        previous.format(),
                        info.format
                    );
                }
                let mut segment = Segment::new(&info, self.frame_count, pts);
                segment.add(&info, frame.data.len());
                self.segments.push(segment);
            }
        }

        if self.list_frames {
            let line = format!(
                "{:>8}  {:>12}  {:<28}  {:>5} bytes",
                self.frame_count,
                pts_str(pts),
                info.format.to_string(),
                frame.data.len()
            );
            match &self.pb {
                Some(pb) => pb.suspend(|| println!("{line}")),
                None => println!("{line}"),
            }
        }

        self.duration_ticks += info.duration_ticks();
        self.frame_count += 1;

        if self.frame_count.is_multiple_of(100) {
            if let Some(ref pb) = self.pb {
                pb.set_message(format!("Analyzing frames...       {}", self.frame_count));
                pb.tick();
            }
        }
    }
}

/// Run of consecutive frames sharing one format.
#[derive(Debug, Serialize)]
struct Segment {
    codec: &'static str,
    channels: u32,
    sampling_rate: u32,
    samples_per_frame: u32,
    first_frame: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_pts: Option<u64>,
    frames: u64,
    bytes: u64,
    #[serde(skip)]
    format: StreamFormat,
}

impl Segment {
    fn new(info: &FrameInfo, first_frame: u64, first_pts: Option<u64>) -> Self {
        Self {
            codec: info.format.codec.name(),
            channels: info.format.channels,
            sampling_rate: info.format.sampling_rate,
            samples_per_frame: info.samples_per_frame,
            first_frame,
            first_pts,
            frames: 0,
            bytes: 0,
            format: info.format,
        }
    }

    fn format(&self) -> StreamFormat {
        self.format
    }

    fn add(&mut self, info: &FrameInfo, size: usize) {
        self.frames += 1;
        self.bytes += size as u64;
        // E-AC-3 and DTS may vary the block count between frames
        self.samples_per_frame = self.samples_per_frame.max(info.samples_per_frame);
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    input: String,
    input_format: &'static str,
    bytes: u64,
    frames: u64,
    skipped_bytes: u64,
    trailing_bytes: usize,
    dropped_packets: usize,
    first_pts: Option<u64>,
    last_pts: Option<u64>,
    duration_seconds: f64,
    segments: Vec<Segment>,
}

fn display_summary(summary: &Summary) {
    println!();
    println!("Stream Information");
    println!("==================");
    println!();

    for (index, segment) in summary.segments.iter().enumerate() {
        println!("  Segment {index}");
        println!("    Codec                   {}", segment.codec);
        println!("    Channels                {}", segment.channels);
        println!("    Sampling rate           {} Hz", segment.sampling_rate);
        println!("    Samples per frame       {}", segment.samples_per_frame);
        println!("    First frame             {}", segment.first_frame);
        println!("    Start                   {}", pts_str(segment.first_pts));
        println!("    Frames                  {}", segment.frames);
        println!();
    }

    println!("Analysis Summary");
    println!("  Frames processed          {}", summary.frames);

    let size_mb = summary.bytes as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        summary.bytes
    );
    println!("  Bytes skipped             {}", summary.skipped_bytes);
    if summary.dropped_packets > 0 {
        println!("  PES packets dropped       {}", summary.dropped_packets);
    }

    println!(
        "  Duration                  {}",
        time_str(summary.duration_seconds)
    );

    if let (Some(first), Some(last)) = (summary.first_pts, summary.last_pts) {
        println!(
            "  PTS span                  {}",
            time_str(ticks_to_seconds(pts_delta(first, last)))
        );
    }

    if summary.duration_seconds > 0.0 {
        let audio_bytes: u64 = summary.segments.iter().map(|s| s.bytes).sum();
        let avg_data_rate_kbps = (audio_bytes as f64 * 8.0) / (summary.duration_seconds * 1000.0);
        println!("  Average data rate         {avg_data_rate_kbps:.1} kbps");
    }

    println!();
}
