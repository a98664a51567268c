use std::io::Write;
use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use converter::{
    cancel_pair, scan, select_encoder, BatchEvent, BatchOrchestrator, ConvertConfig,
    FfmpegEngine,
};
use log::{error, info, warn};

/// Environment variable naming an optional JSON or TOML config file
const CONFIG_ENV: &str = "FHDCONV_CONFIG";

/// Convert every MP4 in a directory to 1920x1080 with GPU acceleration when available
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the MP4 files
    #[arg(default_value = ".")]
    input_dir: PathBuf,

    /// Where converted files go (default: <INPUT_DIR>/converted)
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger - use RUST_LOG env var or default to info level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let cfg = ConvertConfig::load_config(config_path.as_deref())
        .context("Failed to load configuration")?;

    info!("🎬 MP4 to {}x{} Converter with GPU Acceleration", cfg.target_width, cfg.target_height);
    info!("{}", "=".repeat(50));

    let engine = FfmpegEngine::new(&cfg);
    if let Err(e) = engine.verify_tools().await {
        error!("❌ FFmpeg and/or FFprobe not found!");
        error!("Please install FFmpeg first: https://ffmpeg.org/download.html");
        return Err(e).context("External media tools are unavailable");
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| cfg.default_output_dir(&args.input_dir));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping...");
            cancel_handle.cancel();
        }
    });

    let orchestrator = BatchOrchestrator::new(&engine, &cfg, output_dir, cancel.clone());

    let jobs = orchestrator
        .discover(&args.input_dir, scan::filesystem_folds_case())
        .with_context(|| format!("Failed to scan {}", args.input_dir.display()))?;
    if jobs.is_empty() {
        info!("No MP4 files found in the specified directory.");
        return Ok(());
    }

    let encoder = select_encoder(
        &engine,
        &cfg.encoder_candidates,
        cfg.capability_probe_timeout(),
        &cancel,
    )
    .await;

    // The carriage-return progress line has to be ended before the job's
    // outcome is logged
    let mut line_open = false;
    let mut render = |event: BatchEvent<'_>| match event {
        BatchEvent::Progress { update, .. } => {
            print!("\r🔄 Progress: {:.1}% - {:.1} fps", update.percent, update.fps);
            let _ = std::io::stdout().flush();
            line_open = true;
        }
        BatchEvent::EncodeFinished { .. } => {
            if line_open {
                println!();
                line_open = false;
            }
        }
    };
    let summary = orchestrator.run(jobs, encoder, &mut render).await;

    summary.log();
    info!(
        "🎬 All conversions completed at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}
