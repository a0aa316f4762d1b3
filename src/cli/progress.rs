use anyhow::Result;
use esframe::process::extract::Extractor;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, StreamArgs};
use super::scan::{extractor_config, feed, payload_reader};

/// Runs the synchronizer over the whole input without keeping any frame.
pub fn estimate_total_frames(args: &StreamArgs, cli: &Cli) -> Result<u64> {
    log::info!("Counting frames for progress estimation");
    let count_start = std::time::Instant::now();

    let mut reader = payload_reader(args, cli)?;
    let mut extractor = Extractor::new(extractor_config(args)?);
    let mut frames = 0u64;

    let bytes_read = reader.process_payloads(|data, pts| {
        feed(&mut extractor, data, pts, |_| {
            frames += 1;
            Ok(())
        })?;
        Ok(true)
    })?;

    let count_elapsed = count_start.elapsed();
    let read_speed_mbps = if count_elapsed.as_secs_f64() > 0.0 {
        (bytes_read as f64) / 1_000_000.0 / count_elapsed.as_secs_f64()
    } else {
        0.0
    };

    log::info!(
        "Found {frames} frames in {:.3}s ({:.1} MB/s, {} bytes)",
        count_elapsed.as_secs_f64(),
        read_speed_mbps,
        bytes_read
    );

    Ok(frames)
}

pub fn create_progress_bar(
    multi: &MultiProgress,
    total_frames: Option<u64>,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_frames {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("waiting for the first frame");
    Ok(pb)
}
