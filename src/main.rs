use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediascrub::acquire::YtDlpSource;
use mediascrub::cli::{Cli, Command};
use mediascrub::config::Config;
use mediascrub::pipeline::{self, Collaborators};
use mediascrub::redact::client::AzureDeidClient;
use mediascrub::redact::stage::redact_document;
use mediascrub::storage::AzureBlobStore;
use mediascrub::transcribe::api::AzureSpeechApi;
use mediascrub::transcribe::job::JobController;
use mediascrub::transcribe::transcript::extract_transcript;
use mediascrub::video::detect::load_detector;
use mediascrub::video::mux::FfmpegMuxer;
use mediascrub::video::stage::{FfmpegRedactor, VideoRedactor};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (config, config_path) = Config::load_with_path(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("Interrupt received, shutting down");
            cancel.store(true, Ordering::Relaxed);
        })
        .context("failed to install interrupt handler")?;
    }

    match cli.command {
        Command::Run { url } => run_pipeline(&config, &url, cancel),
        Command::Blur { input, output } => blur_only(&config, &input, output, cancel),
        Command::Redact {
            input,
            output,
            from_json,
        } => redact_only(&config, &input, output, from_json),
        Command::InitConfig { path } => init_config(path),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediascrub=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_pipeline(config: &Config, url: &str, cancel: Arc<AtomicBool>) -> Result<()> {
    let detector = load_detector(&config.video)?;
    let speech = AzureSpeechApi::from_config(&config.speech)?;

    let collaborators = Collaborators {
        source: Box::new(YtDlpSource::new(
            &config.acquisition,
            config.video.ffmpeg_path.clone(),
        )),
        store: Box::new(AzureBlobStore::from_config(&config.storage)?),
        controller: JobController::new(
            Box::new(speech),
            Duration::from_secs(config.speech.poll_interval_secs),
            config.speech.locale.clone(),
        ),
        deid: Box::new(AzureDeidClient::from_config(&config.deid)?),
        redactor: Box::new(FfmpegRedactor::new(config.video.clone(), detector)),
        muxer: Box::new(FfmpegMuxer::new(config.video.ffmpeg_path.clone())),
    };

    let result = pipeline::run(collaborators, config, url, cancel)?;

    println!("Final video: {}", result.final_video.display());
    if let Some(path) = &result.transcript_path {
        println!("Transcript: {}", path.display());
    }
    if let Some(path) = &result.redacted_transcript_path {
        println!("Redacted transcript: {}", path.display());
    }
    println!(
        "Frames processed: {}, regions blurred: {}",
        result.video_stats.frames, result.video_stats.regions_blurred
    );
    if result.is_partial() {
        println!("Completed with {} warning(s):", result.warnings.len());
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

fn blur_only(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| sibling_path(input, "_blurred", "mp4"));
    let detector = load_detector(&config.video)?;
    let mut redactor = FfmpegRedactor::new(config.video.clone(), detector);
    let stats = redactor.redact(input, &output, &cancel)?;

    println!("Blurred video: {}", output.display());
    println!(
        "Frames processed: {}, regions blurred: {}",
        stats.frames, stats.regions_blurred
    );
    if stats.detection_failures > 0 {
        println!(
            "Warning: detection failed on {} frame(s); those passed through unredacted",
            stats.detection_failures
        );
    }
    Ok(())
}

fn redact_only(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    from_json: bool,
) -> Result<()> {
    let output = output.unwrap_or_else(|| sibling_path(input, "_redacted", "txt"));
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let text = if from_json {
        let document: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", input.display()))?;
        extract_transcript(&document)
            .context("could not extract a transcript from the result document")?
            .text()
    } else {
        raw
    };

    let api = AzureDeidClient::from_config(&config.deid)?;
    let outcome = redact_document(&api, &text, config.deid.chunk_size);
    std::fs::write(&output, &outcome.text)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Redacted text: {}", output.display());
    for warning in outcome.warnings() {
        println!("Warning: {}", warning);
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("mediascrub.toml"));
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file {}", path.display());
    }
    std::fs::write(&path, Config::generate_default_commented())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// `<stem><suffix>.<ext>` beside the input file.
fn sibling_path(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}
