use std::path::Path;
use std::process::Command;

use anyhow::Result;

/// Combines the blurred silent video with the original audio into one
/// container. The video stream is copied untouched (no generation loss on
/// the redacted frames); only the audio is re-encoded into the container's
/// audio codec.
pub trait Muxer: Send {
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

pub struct FfmpegMuxer {
    ffmpeg_path: String,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }
}

impl Muxer for FfmpegMuxer {
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-i"])
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c:v", "copy", "-c:a", "aac"])
            .arg(output)
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("ffmpeg mux exited with {}: {}", result.status, stderr.trim());
        }
        Ok(())
    }
}
