use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::VideoError;

/// Geometry and timing of a video stream, read before decoding starts.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate as the exact rational reported by the container, e.g.
    /// "30000/1001". Passed through to the encoder unchanged so output
    /// timing matches input timing.
    pub frame_rate: String,
    pub fps: f64,
    /// Total frames when the container reports them, otherwise estimated
    /// from duration. Used only for ETA reporting.
    pub total_frames: Option<u64>,
}

impl VideoInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe the first video stream with ffprobe. Any failure here means the
/// input cannot be decoded and is reported as [`VideoError::OpenFailed`].
pub fn probe(ffprobe_path: &str, input: &Path) -> Result<VideoInfo, VideoError> {
    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(input)
        .output()
        .map_err(|e| VideoError::OpenFailed(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::OpenFailed(format!(
            "ffprobe exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| VideoError::OpenFailed(format!("unparseable ffprobe output: {}", e)))?;

    parse_probe(parsed)
}

fn parse_probe(parsed: ProbeOutput) -> Result<VideoInfo, VideoError> {
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| VideoError::OpenFailed("no video stream found".to_string()))?;

    let width = stream
        .width
        .ok_or_else(|| VideoError::OpenFailed("video stream has no width".to_string()))?;
    let height = stream
        .height
        .ok_or_else(|| VideoError::OpenFailed("video stream has no height".to_string()))?;

    let frame_rate = stream
        .r_frame_rate
        .clone()
        .ok_or_else(|| VideoError::OpenFailed("video stream has no frame rate".to_string()))?;
    let fps = parse_rate(&frame_rate)
        .ok_or_else(|| VideoError::OpenFailed(format!("bad frame rate: {}", frame_rate)))?;

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| {
            // Containers without a frame count (e.g. some MKVs) still report
            // a duration; estimate for ETA purposes.
            let duration = parsed
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|s| s.parse::<f64>().ok())?;
            Some((duration * fps).round() as u64)
        });

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        fps,
        total_frames,
    })
}

/// Parse an ffprobe rational rate such as "30000/1001" or "25/1".
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
