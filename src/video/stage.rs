//! Frame-by-frame video redaction: decode, detect, obfuscate, re-encode.
//!
//! Decoding and encoding are delegated to ffmpeg child processes over
//! rawvideo pipes; every frame passes through this process exactly once, in
//! order, so the output has one-to-one frame correspondence with the input.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::RgbImage;

use crate::config::VideoConfig;
use crate::error::VideoError;
use crate::video::blur::blur_regions;
use crate::video::detect::{luminance, FaceDetector};
use crate::video::probe::{probe, VideoInfo};

/// Counters reported by a completed redaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoStats {
    pub frames: u64,
    pub regions_blurred: u64,
    /// Frames where detection errored and the frame passed through with zero
    /// regions.
    pub detection_failures: u64,
}

/// The local video redaction stage.
pub trait VideoRedactor {
    /// Verify the input can be decoded. Called by the coordinator before any
    /// remote work starts, so an unreadable video fails the run early.
    fn probe(&mut self, input: &Path) -> Result<VideoInfo, VideoError>;

    /// Blur detected regions in every frame of `input`, writing a silent
    /// video to `output` with identical geometry, frame rate, and frame
    /// count.
    fn redact(
        &mut self,
        input: &Path,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<VideoStats, VideoError>;
}

pub struct FfmpegRedactor {
    config: VideoConfig,
    detector: Box<dyn FaceDetector>,
}

impl FfmpegRedactor {
    pub fn new(config: VideoConfig, detector: Box<dyn FaceDetector>) -> Self {
        Self { config, detector }
    }

    fn spawn_decoder(&self, input: &Path) -> Result<Child, VideoError> {
        Command::new(&self.config.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(input)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::OpenFailed(format!("failed to spawn ffmpeg decoder: {}", e)))
    }

    fn spawn_encoder(&self, info: &VideoInfo, output: &Path) -> Result<Child, VideoError> {
        Command::new(&self.config.ffmpeg_path)
            .args([
                "-v",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", info.width, info.height),
                "-r",
                &info.frame_rate,
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::Encode(format!("failed to spawn ffmpeg encoder: {}", e)))
    }
}

impl VideoRedactor for FfmpegRedactor {
    fn probe(&mut self, input: &Path) -> Result<VideoInfo, VideoError> {
        probe(&self.config.ffprobe_path, input)
    }

    fn redact(
        &mut self,
        input: &Path,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<VideoStats, VideoError> {
        let info = probe(&self.config.ffprobe_path, input)?;
        tracing::info!(
            "Redacting video: {}x{} @ {} ({} frames expected)",
            info.width,
            info.height,
            info.frame_rate,
            info.total_frames
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );

        let mut decoder = self.spawn_decoder(input)?;
        let mut encoder = match self.spawn_encoder(&info, output) {
            Ok(child) => child,
            Err(e) => {
                let _ = decoder.kill();
                let _ = decoder.wait();
                return Err(e);
            }
        };

        let result = match (decoder.stdout.take(), encoder.stdin.take()) {
            (Some(stdout), Some(stdin)) => run_frame_loop(
                &self.config,
                self.detector.as_mut(),
                &info,
                stdout,
                stdin,
                cancel,
            ),
            (None, _) => Err(VideoError::OpenFailed(
                "decoder stdout unavailable".to_string(),
            )),
            (_, None) => Err(VideoError::Encode("encoder stdin unavailable".to_string())),
        };

        if result.is_err() {
            let _ = decoder.kill();
            let _ = encoder.kill();
        }
        let decoder_status = decoder.wait();
        let encoder_status = encoder.wait();

        let stats = result?;

        match decoder_status {
            Ok(status) if !status.success() => {
                return Err(VideoError::Frame {
                    frame: stats.frames,
                    message: format!("decoder exited with {}", status),
                });
            }
            Err(e) => {
                return Err(VideoError::Frame {
                    frame: stats.frames,
                    message: format!("decoder wait failed: {}", e),
                });
            }
            _ => {}
        }
        match encoder_status {
            Ok(status) if !status.success() => {
                return Err(VideoError::Encode(format!("encoder exited with {}", status)));
            }
            Err(e) => {
                return Err(VideoError::Encode(format!("encoder wait failed: {}", e)));
            }
            _ => {}
        }

        tracing::info!(
            "Video redaction complete: {} frames, {} regions blurred, {} detection failures",
            stats.frames,
            stats.regions_blurred,
            stats.detection_failures
        );
        Ok(stats)
    }
}

fn run_frame_loop(
    config: &VideoConfig,
    detector: &mut dyn FaceDetector,
    info: &VideoInfo,
    input: impl Read,
    output: impl Write,
    cancel: &AtomicBool,
) -> Result<VideoStats, VideoError> {
    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);

    let frame_len = info.frame_bytes();
    let mut buf = vec![0u8; frame_len];
    let mut stats = VideoStats::default();

    let interval = config.progress_interval_frames.max(1);
    let start = Instant::now();
    let mut window_start = start;
    let mut window_frames: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(VideoError::Cancelled);
        }

        match read_frame(&mut reader, &mut buf) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => {
                if stats.frames == 0 {
                    return Err(VideoError::OpenFailed(format!("decode failed: {}", e)));
                }
                return Err(VideoError::Frame {
                    frame: stats.frames,
                    message: format!("decode failed: {}", e),
                });
            }
        }

        let mut frame = RgbImage::from_raw(info.width, info.height, std::mem::take(&mut buf))
            .ok_or_else(|| VideoError::Frame {
                frame: stats.frames,
                message: "frame buffer size mismatch".to_string(),
            })?;

        let luma = luminance(&frame);
        let regions = match detector.detect(&luma, info.width, info.height) {
            Ok(regions) => regions,
            Err(e) => {
                if config.abort_on_detection_error {
                    return Err(VideoError::Frame {
                        frame: stats.frames,
                        message: format!("face detection failed: {:#}", e),
                    });
                }
                // Default policy: the frame passes through unredacted and
                // the failure is counted.
                tracing::warn!(
                    "Face detection failed on frame {}, passing through: {:#}",
                    stats.frames,
                    e
                );
                stats.detection_failures += 1;
                Vec::new()
            }
        };

        if !regions.is_empty() {
            stats.regions_blurred += regions.len() as u64;
            blur_regions(&mut frame, &regions, config.blur_sigma);
        }

        let data = frame.into_raw();
        writer
            .write_all(&data)
            .map_err(|e| VideoError::Encode(format!("write failed: {}", e)))?;
        buf = data;

        stats.frames += 1;
        window_frames += 1;
        if stats.frames % interval == 0 {
            let window_secs = window_start.elapsed().as_secs_f64();
            let fps = if window_secs > 0.0 {
                window_frames as f64 / window_secs
            } else {
                0.0
            };
            log_progress(stats.frames, info.total_frames, fps);
            window_start = Instant::now();
            window_frames = 0;
        }
    }

    writer
        .flush()
        .map_err(|e| VideoError::Encode(format!("flush failed: {}", e)))?;
    drop(writer); // close encoder stdin so it can finalize the container

    if stats.frames == 0 {
        return Err(VideoError::OpenFailed("no frames decoded".to_string()));
    }
    Ok(stats)
}

/// Fill `buf` with exactly one frame. Returns `Ok(false)` on a clean end of
/// stream; a partial frame is an error.
fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("truncated frame: {} of {} bytes", filled, buf.len()),
            ));
        }
        filled += n;
    }
    Ok(true)
}

fn log_progress(frames: u64, total: Option<u64>, fps: f64) {
    match total {
        Some(total) if fps > 0.0 && total > frames => {
            let eta_secs = (total - frames) as f64 / fps;
            tracing::info!(
                "Processed {}/{} frames ({:.1} fps, ETA {}m {}s)",
                frames,
                total,
                fps,
                (eta_secs / 60.0) as u64,
                (eta_secs % 60.0) as u64
            );
        }
        Some(total) => {
            tracing::info!("Processed {}/{} frames ({:.1} fps)", frames, total, fps);
        }
        None => {
            tracing::info!("Processed {} frames ({:.1} fps)", frames, fps);
        }
    }
}
