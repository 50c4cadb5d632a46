use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vidloom::{
    EncoderConfig, ExportConfig, FileSink, InMemoryEncoder, MuxerConfig, PreparedAssetStore,
    Timeline, WebmMuxer, export,
};

#[derive(Parser, Debug)]
#[command(name = "vidloom", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a timeline JSON to a WebM file.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input timeline JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output WebM path.
    #[arg(long)]
    out: PathBuf,

    /// Codec name used in the WebM codec id.
    #[arg(long, default_value = "vp8")]
    codec: String,

    /// Target bitrate in bits per second, if the encoder supports it.
    #[arg(long)]
    bitrate: Option<u32>,

    /// Start of the exported window on the timeline, in microseconds.
    #[arg(long, default_value_t = 0)]
    start_us: u64,

    /// Length of the exported window in microseconds (default: the rest of
    /// the timeline after --start-us).
    #[arg(long)]
    length_us: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
    }
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read timeline '{}'", args.in_path.display()))?;
    let timeline: Timeline = serde_json::from_str(&json)
        .with_context(|| format!("parse timeline '{}'", args.in_path.display()))?;
    timeline.validate()?;

    let assets_root = args
        .in_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."));
    let store = PreparedAssetStore::prepare_timeline(&timeline, assets_root)?;

    let mut enc_cfg = EncoderConfig::new(&args.codec, timeline.canvas.width, timeline.canvas.height);
    enc_cfg.bitrate = args.bitrate;
    let mut encoder = InMemoryEncoder::new(enc_cfg.clone())?;

    let sink = FileSink::create(&args.out)?;
    let mut muxer = WebmMuxer::new(
        MuxerConfig::new(
            enc_cfg.codec_id(),
            timeline.canvas.width,
            timeline.canvas.height,
        ),
        sink,
    )?;

    let length_us = args
        .length_us
        .unwrap_or_else(|| timeline.duration_us.saturating_sub(args.start_us));
    let cfg = ExportConfig::from_timeline(&timeline).with_window(args.start_us, length_us);

    let mut progress = |done: u64, total: u64| eprintln!("rendered {done}/{total} frames");
    let stats = export(
        &cfg,
        &timeline,
        &store,
        &mut encoder,
        &mut muxer,
        Some(&mut progress),
    )?;

    eprintln!(
        "wrote {} ({} frames, {} clusters, {:.0}ms)",
        args.out.display(),
        stats.frames_rendered,
        stats.clusters_written,
        stats.duration_ms
    );
    Ok(())
}
