use anyhow::{Context, Result};
use image::RgbImage;
use rustface::ImageData;

use crate::config::VideoConfig;

/// Axis-aligned detected region within one frame. Detection is stateless per
/// frame; regions carry no identity or continuity across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Clip the region to frame bounds. Returns `None` if nothing remains.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceRegion> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(FaceRegion {
            x: self.x,
            y: self.y,
            width,
            height,
        })
    }
}

/// Per-frame, stateless face detector over a luminance-only view of the
/// frame.
pub trait FaceDetector {
    fn detect(&mut self, luma: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>>;
}

/// SeetaFace frontal upright face detector.
pub struct SeetaFaceDetector {
    inner: Box<dyn rustface::Detector>,
}

impl SeetaFaceDetector {
    pub fn from_config(config: &VideoConfig) -> Result<Self> {
        let model_path = config.model_path.to_string_lossy();
        let mut inner = rustface::create_detector(model_path.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "failed to load face detection model {}: {}",
                config.model_path.display(),
                e
            )
        })?;
        inner.set_min_face_size(config.min_face_size);
        inner.set_score_thresh(config.score_thresh);
        inner.set_pyramid_scale_factor(config.pyramid_scale_factor);
        inner.set_slide_window_step(4, 4);
        Ok(Self { inner })
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&mut self, luma: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>> {
        if luma.len() != width as usize * height as usize {
            anyhow::bail!(
                "luminance buffer is {} bytes, expected {}",
                luma.len(),
                width as usize * height as usize
            );
        }
        let mut image = ImageData::new(luma, width, height);
        let faces = self.inner.detect(&mut image);

        let mut regions = Vec::with_capacity(faces.len());
        for face in faces {
            let bbox = face.bbox();
            let region = FaceRegion {
                x: bbox.x().max(0) as u32,
                y: bbox.y().max(0) as u32,
                width: bbox.width(),
                height: bbox.height(),
            };
            if let Some(clamped) = region.clamp_to(width, height) {
                regions.push(clamped);
            }
        }
        Ok(regions)
    }
}

impl std::fmt::Debug for SeetaFaceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeetaFaceDetector").finish_non_exhaustive()
    }
}

/// BT.601 luminance of an RGB frame, the view the detector runs over.
pub fn luminance(frame: &RgbImage) -> Vec<u8> {
    frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
        })
        .collect()
}

/// Missing model files should fail construction, not detection.
pub fn load_detector(config: &VideoConfig) -> Result<Box<dyn FaceDetector>> {
    if !config.model_path.exists() {
        anyhow::bail!(
            "face detection model not found: {}",
            config.model_path.display()
        );
    }
    let detector = SeetaFaceDetector::from_config(config)
        .context("failed to initialize face detector")?;
    Ok(Box::new(detector))
}
