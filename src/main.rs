use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::extract::cmd_extract;
use cli::info::cmd_info;

mod cli;
mod input;
pub(crate) mod timestamp;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                let line = json_line(
                    &buf.timestamp().to_string(),
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                );
                writeln!(buf, "{line}")
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    match cli.command {
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
        Commands::Extract(ref args) => cmd_extract(args, &cli, pb)?,
    }

    Ok(())
}

fn json_line(ts: &str, level: log::Level, target: &str, msg: &str) -> serde_json::Value {
    serde_json::json!({
        "ts": ts,
        "lvl": level.as_str(),
        "target": target,
        "msg": msg,
    })
}

#[test]
fn json_log_lines_escape_messages() -> Result<()> {
    let msg = "bad \"frame\"\n\tat\\offset \u{1}";
    let line = json_line("2026-01-01T00:00:00Z", log::Level::Warn, "esframe", msg).to_string();

    assert!(!line.contains('\n'));
    let parsed: serde_json::Value = serde_json::from_str(&line)?;
    assert_eq!(parsed["msg"], msg);
    assert_eq!(parsed["lvl"], "WARN");
    Ok(())
}
