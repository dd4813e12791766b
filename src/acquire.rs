use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::config::AcquisitionConfig;

/// Local media produced by acquisition: the source video and a mono 16 kHz
/// WAV extracted from it. Immutable once produced; owned by the coordinator.
#[derive(Debug, Clone)]
pub struct MediaBundle {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
}

/// Media acquisition collaborator: turns a remote URL into local files.
pub trait MediaSource: Send {
    fn acquire(&self, url: &str, work_dir: &Path) -> Result<MediaBundle>;
}

/// Fetches the source video with yt-dlp, then extracts the audio track with
/// ffmpeg as 16 kHz mono PCM for the speech service.
pub struct YtDlpSource {
    yt_dlp_path: String,
    ffmpeg_path: String,
    format: String,
}

const MEDIA_STEM: &str = "source_media";

impl YtDlpSource {
    pub fn new(config: &AcquisitionConfig, ffmpeg_path: String) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            ffmpeg_path,
            format: config.format.clone(),
        }
    }

    fn download_video(&self, url: &str, work_dir: &Path) -> Result<PathBuf> {
        let template = work_dir.join(format!("{}.%(ext)s", MEDIA_STEM));
        let output = Command::new(&self.yt_dlp_path)
            .args(["-f", &self.format, "--no-progress", "-o"])
            .arg(&template)
            .arg(url)
            .output()
            .with_context(|| format!("failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp exited with {}: {}", output.status, stderr.trim());
        }

        // yt-dlp substitutes the real extension, so locate the result.
        find_downloaded_video(work_dir)
            .context("download completed but no video file was found in the work directory")
    }

    fn extract_audio(&self, video: &Path, work_dir: &Path) -> Result<PathBuf> {
        let audio_path = work_dir.join(format!("{}.wav", MEDIA_STEM));
        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-i"])
            .arg(video)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(&audio_path)
            .output()
            .with_context(|| format!("failed to run {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "ffmpeg audio extraction exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        // Sanity-check the WAV and log its duration.
        let reader = hound::WavReader::open(&audio_path)
            .context("extracted audio is not a readable WAV file")?;
        let spec = reader.spec();
        if spec.sample_rate != 16000 || spec.channels != 1 {
            anyhow::bail!(
                "extracted audio has unexpected format: {} Hz, {} channel(s)",
                spec.sample_rate,
                spec.channels
            );
        }
        let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;
        tracing::info!(
            "Audio extracted: {} ({:.1}s)",
            audio_path.display(),
            duration_secs
        );

        Ok(audio_path)
    }
}

impl MediaSource for YtDlpSource {
    fn acquire(&self, url: &str, work_dir: &Path) -> Result<MediaBundle> {
        tracing::info!("Downloading media from {}", url);
        let video_path = self.download_video(url, work_dir)?;
        tracing::info!("Video downloaded: {}", video_path.display());

        let audio_path = self.extract_audio(&video_path, work_dir)?;
        Ok(MediaBundle {
            video_path,
            audio_path,
        })
    }
}

/// Locate the downloaded video: the lexicographically last file with the
/// expected stem that is not the extracted WAV.
fn find_downloaded_video(work_dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(work_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().starts_with(MEDIA_STEM))
                .unwrap_or(false)
                && p.extension().map(|e| e != "wav").unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.pop()
}
