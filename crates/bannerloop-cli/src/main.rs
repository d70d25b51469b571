//! BannerLoop CLI
//!
//! Headless driver for the BannerLoop engine: inspect media files and
//! generate reverse assets without the preview UI.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bannerloop_core::core::ffmpeg::{detect_system_ffmpeg, FFmpegRunner, ReverseEncoder};
use bannerloop_core::core::jobs::{TranscodePipeline, TranscodePipelineConfig};
use bannerloop_core::core::settings::EngineSettings;
use bannerloop_core::events::{EventBus, PipelinePhase};

#[derive(Parser)]
#[command(
    name = "bannerloop-cli",
    version,
    about = "Headless BannerLoop driver: probe media and generate reverse assets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report the detected FFmpeg installation
    Doctor,
    /// Print media information as JSON
    Probe {
        /// Media file to inspect
        file: PathBuf,
    },
    /// Generate a time-reversed copy of a clip
    Reverse {
        /// Source clip
        input: PathBuf,
        /// Output path; defaults to reverse_<name> next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Doctor => doctor(),
        Command::Probe { file } => probe(file).await,
        Command::Reverse { input, output } => reverse(input, output).await,
    }
}

fn doctor() -> anyhow::Result<()> {
    let info = detect_system_ffmpeg()
        .context("FFmpeg was not found; install it or add it to PATH")?;

    println!("ffmpeg  : {}", info.ffmpeg_path.display());
    println!("ffprobe : {}", info.ffprobe_path.display());
    println!("version : {}", info.version);
    Ok(())
}

async fn probe(file: PathBuf) -> anyhow::Result<()> {
    let info = detect_system_ffmpeg()
        .context("FFmpeg was not found; install it or add it to PATH")?;
    let runner = FFmpegRunner::new(info);

    let media = runner
        .probe(&file)
        .await
        .with_context(|| format!("failed to probe {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&media)?);
    Ok(())
}

async fn reverse(input: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let input = input
        .canonicalize()
        .with_context(|| format!("input not found: {}", input.display()))?;
    let output = output.unwrap_or_else(|| default_output_path(&input));

    let info = detect_system_ffmpeg()
        .context("FFmpeg was not found; install it or add it to PATH")?;
    let runner = FFmpegRunner::new(info);

    let settings = EngineSettings::default_path()
        .map(|path| EngineSettings::load(&path))
        .unwrap_or_default();

    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        "starting reverse transcode"
    );

    let bus = EventBus::new();
    let mut events = bus.take_ui_receiver().expect("fresh bus has a UI receiver");
    let pipeline = TranscodePipeline::new(
        Arc::new(runner),
        bus,
        TranscodePipelineConfig {
            max_concurrent: settings.effective_concurrency(),
            settings: settings.transcode.clone(),
        },
    );

    pipeline.submit("cli", &input, &output)?;

    while let Some(event) = events.recv().await {
        match event.phase {
            PipelinePhase::Started => {
                println!("reversing {}", input.display());
            }
            PipelinePhase::Progress => {
                print!("\r{:5.1}%", event.percent.unwrap_or(0.0));
                std::io::stdout().flush().ok();
            }
            PipelinePhase::Completed => {
                println!("\rdone: {}", output.display());
                return Ok(());
            }
            PipelinePhase::Failed => {
                println!();
                bail!(
                    "reverse transcode failed: {}",
                    event.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    bail!("pipeline event stream ended unexpectedly")
}

fn default_output_path(input: &std::path::Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip.mp4".to_string());
    input.with_file_name(format!("reverse_{name}"))
}
