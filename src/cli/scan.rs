use anyhow::{Result, ensure};
use esframe::process::ExtractorConfig;
use esframe::process::extract::{Extractor, FrameView};
use esframe::structs::pes::PesReader;

use super::command::{Cli, StreamArgs};
use crate::input::PayloadReader;

/// Smallest frame buffer the commands accept; large enough for any
/// supported frame plus a full input chunk.
pub const MIN_CAPACITY: usize = 64 * 1024;

pub fn extractor_config(args: &StreamArgs) -> Result<ExtractorConfig> {
    ensure!(
        args.capacity >= MIN_CAPACITY,
        "Frame buffer capacity must be at least {MIN_CAPACITY} bytes, got {}",
        args.capacity
    );

    Ok(ExtractorConfig {
        capacity: args.capacity,
        latm: !args.no_latm,
    })
}

pub fn pes_reader(args: &StreamArgs) -> PesReader {
    let reader = PesReader::default().require_initial_pts(!args.no_require_pts);
    match args.stream_id {
        Some(id) => reader.with_stream_id(id),
        None => reader,
    }
}

pub fn payload_reader(args: &StreamArgs, cli: &Cli) -> Result<PayloadReader> {
    PayloadReader::new(
        &args.input,
        args.input_format,
        pes_reader(args),
        cli.fail_level(),
    )
}

/// Appends `data` and hands every frame that becomes complete to
/// `on_frame` before discarding it.
pub fn feed<F>(
    extractor: &mut Extractor,
    mut data: &[u8],
    mut pts: Option<u64>,
    mut on_frame: F,
) -> Result<()>
where
    F: FnMut(FrameView<'_>) -> Result<()>,
{
    while !data.is_empty() {
        let len = data.len().min(extractor.free_space());
        ensure!(len > 0, "Frame buffer has no free space");
        ensure!(
            extractor.append(&data[..len], pts),
            "Frame buffer rejected {len} bytes"
        );
        data = &data[len..];
        // the remainder no longer starts where the PTS applies
        pts = None;

        while let Some(frame) = extractor.current_frame() {
            let size = frame.data.len();
            on_frame(frame)?;
            extractor.shrink(size, false);
        }
    }

    Ok(())
}
