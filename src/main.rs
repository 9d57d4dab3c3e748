use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use ffmpeg_transcode::JobConfig;

#[derive(Debug, Parser)]
#[command(
    name    = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about   = "Run one transcode job described by a JSON file",
    long_about = None,
)]
struct Cli {
    /// Job description (input, options, outputs and their streams).
    #[arg(value_name = "JOB")]
    job: PathBuf,

    /// Raise log verbosity; repeat for trace output.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Stop at end of input without flushing decoders and encoders.
    #[arg(long)]
    no_drain: bool,

    /// Print the job summary to stdout as JSON.
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();
    // RUST_LOG still wins over the flag
    builder.parse_default_env();
    builder.init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut job = JobConfig::load(&cli.job)
        .with_context(|| format!("loading job {}", cli.job.display()))?;
    if cli.no_drain {
        job.options.drain_on_eof = false;
    }

    let mut transcoder =
        ffmpeg_transcode::ffmpeg::build_job(&job).context("setting up transcode")?;
    let summary = transcoder
        .run()
        .with_context(|| format!("transcoding {}", job.input))?;

    log::info!(
        "done: {} packets read, {} written, {} audio bytes dropped",
        summary.packets_read,
        summary.packets_written,
        summary.audio_bytes_dropped
    );
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
