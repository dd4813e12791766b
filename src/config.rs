use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub acquisition: AcquisitionConfig,
    pub speech: SpeechConfig,
    pub storage: StorageConfig,
    pub deid: DeidConfig,
    pub video: VideoConfig,
    pub pipeline: PipelinePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub keep_intermediate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub yt_dlp_path: String,
    pub format: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub region: String,
    pub api_key: String,
    pub locale: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("region", &self.region)
            .field("api_key", &"[REDACTED]")
            .field("locale", &self.locale)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub account: String,
    pub access_key: String,
    pub container: String,
    /// How long the staged audio URL stays readable. The remote transcription
    /// job holds the URL for its whole lifetime, so this needs to be hours.
    pub sas_validity_hours: u64,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account", &self.account)
            .field("access_key", &"[REDACTED]")
            .field("container", &self.container)
            .field("sas_validity_hours", &self.sas_validity_hours)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeidConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Maximum characters per redaction request. The service negotiates no
    /// chunk size, so splitting is a client concern.
    pub chunk_size: usize,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for DeidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeidConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("chunk_size", &self.chunk_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// SeetaFace model file for the frontal face detector.
    pub model_path: PathBuf,
    /// Smallest detectable face dimension in pixels.
    pub min_face_size: u32,
    /// Detector score threshold; higher means fewer false positives.
    pub score_thresh: f64,
    /// Image pyramid scale factor between detection passes.
    pub pyramid_scale_factor: f32,
    /// Gaussian sigma applied to detected regions. Large relative to
    /// min_face_size so the blur cannot be undone by sharpening.
    pub blur_sigma: f32,
    /// Log a progress line every this many frames.
    pub progress_interval_frames: u64,
    /// If true, a per-frame detection error aborts the stage. Default is to
    /// pass the frame through with zero detections: an unredacted frame is
    /// preferable to aborting a multi-minute job.
    pub abort_on_detection_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinePolicy {
    /// When true, upload/submission/transcription failures abort the run
    /// instead of degrading to a transcript-absent result.
    pub require_transcript: bool,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            acquisition: AcquisitionConfig::default(),
            speech: SpeechConfig::default(),
            storage: StorageConfig::default(),
            deid: DeidConfig::default(),
            video: VideoConfig::default(),
            pipeline: PipelinePolicy::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let directory = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediascrub")
            .join("runs");
        Self {
            directory,
            keep_intermediate: false,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            format: "best[ext=mp4]/best".to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            api_key: String::new(),
            locale: "en-US".to_string(),
            poll_interval_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            access_key: String::new(),
            container: "audio-uploads".to_string(),
            sas_validity_hours: 24,
        }
    }
}

impl Default for DeidConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            chunk_size: 5000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            model_path: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            min_face_size: 30,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            blur_sigma: 30.0,
            progress_interval_frames: 500,
            abort_on_detection_error: false,
        }
    }
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            require_transcript: false,
        }
    }
}

// --- Config loading ---

impl Config {
    /// Load config and return the resolved file path (if any).
    pub fn load_with_path(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // 1. Check explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(p.to_path_buf())));
        }

        // 2. Check beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            let beside_exe = exe_path.parent().map(|p| p.join("mediascrub.toml"));
            if let Some(p) = beside_exe {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config: Config = toml::from_str(&content)?;
                    return Ok((config, Some(p)));
                }
            }
        }

        // 3. Check platform config directory (e.g. ~/.config/mediascrub/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let platform_config = config_dir.join("mediascrub").join("config.toml");
            if platform_config.exists() {
                let content = std::fs::read_to_string(&platform_config)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(platform_config)));
            }
        }

        // 4. Fall back to defaults
        tracing::info!("No config file found, using defaults");
        Ok((Config::default(), None))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_path(path).map(|(config, _)| config)
    }

    /// Generate a default config file with all fields and inline documentation.
    pub fn generate_default_commented() -> String {
        let default_output_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediascrub")
            .join("runs");
        let output_dir_str = default_output_dir.to_string_lossy().replace('\\', "\\\\");

        format!(
            r#"# mediascrub configuration
# Edit this file to customize acquisition, transcription, redaction, and
# video processing settings.

[output]
# Directory where pipeline artifacts are written (transcripts, videos).
directory = "{output_dir}"
# Keep intermediate files (extracted audio, silent blurred video).
keep_intermediate = false

[acquisition]
# Path to the yt-dlp executable used to fetch the source media.
yt_dlp_path = "yt-dlp"
# yt-dlp format selector for the video download.
format = "best[ext=mp4]/best"

[speech]
# Azure Speech region for the batch transcription API (e.g. "eastus").
# region = "eastus"
# API key (or set MEDIASCRUB_SPEECH_KEY environment variable).
# api_key = ""
# Recognition locale.
locale = "en-US"
# Seconds between job status polls. The poll loop never spins faster.
poll_interval_secs = 10
# Per-request timeout for speech API calls.
request_timeout_secs = 30

[storage]
# Storage account used to stage the extracted audio for the speech service.
# account = "mystorageaccount"
# Account access key (or set MEDIASCRUB_STORAGE_KEY environment variable).
# access_key = ""
# Blob container for staged audio.
container = "audio-uploads"
# Hours the staged audio URL stays readable. Must cover the whole
# transcription job lifetime.
sas_validity_hours = 24

[deid]
# De-identification service endpoint.
# endpoint = "https://my-deid.api.deid.azure.com"
# API key (or set MEDIASCRUB_DEID_KEY environment variable).
# api_key = ""
# Maximum characters per redaction request. The service negotiates no chunk
# size, so the client splits and recombines.
chunk_size = 5000
# Per-request timeout for redaction calls.
request_timeout_secs = 30

[video]
# Paths to the ffmpeg/ffprobe executables.
ffmpeg_path = "ffmpeg"
ffprobe_path = "ffprobe"
# SeetaFace frontal face detection model file.
model_path = "seeta_fd_frontal_v1.0.bin"
# Smallest detectable face dimension in pixels.
min_face_size = 30
# Detector score threshold; higher = fewer false positives.
score_thresh = 2.0
# Image pyramid scale factor between detection passes.
pyramid_scale_factor = 0.8
# Gaussian sigma for the face blur. Keep large relative to min_face_size so
# the blur is not reversible by sharpening.
blur_sigma = 30.0
# Log a progress line every this many frames.
progress_interval_frames = 500
# Abort the whole run if face detection errors on a frame. When false the
# frame passes through with zero detections. Note: detection is independent
# per frame, so a face blurred in one frame can be missed in the next
# ("flicker"); this is a known limitation of the detector.
abort_on_detection_error = false

[pipeline]
# When true, any upload/submission/transcription failure aborts the run.
# When false the pipeline degrades to a transcript-absent result and reports
# the failure as a warning. Video failures always abort.
require_transcript = false
"#,
            output_dir = output_dir_str
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.speech.locale, "en-US");
        assert_eq!(config.speech.poll_interval_secs, 10);
        assert_eq!(config.storage.container, "audio-uploads");
        assert_eq!(config.storage.sas_validity_hours, 24);
        assert_eq!(config.deid.chunk_size, 5000);
        assert_eq!(config.video.min_face_size, 30);
        assert_eq!(config.video.blur_sigma, 30.0);
        assert_eq!(config.video.progress_interval_frames, 500);
        assert!(!config.video.abort_on_detection_error);
        assert!(!config.pipeline.require_transcript);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_str = r#"
            [speech]
            region = "westus2"

            [deid]
            chunk_size = 2000
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.speech.region, "westus2");
        assert_eq!(config.deid.chunk_size, 2000);
        // Defaults still applied for unspecified fields
        assert_eq!(config.speech.poll_interval_secs, 10);
        assert_eq!(config.video.min_face_size, 30);
    }

    #[test]
    fn test_parse_full_toml_config() {
        let toml_str = r#"
            [output]
            directory = "/tmp/mediascrub"
            keep_intermediate = true

            [acquisition]
            yt_dlp_path = "/usr/local/bin/yt-dlp"
            format = "bestvideo+bestaudio"

            [speech]
            region = "eastus"
            api_key = "test-key"
            locale = "de-DE"
            poll_interval_secs = 5

            [storage]
            account = "acct"
            access_key = "a2V5"
            container = "staging"
            sas_validity_hours = 48

            [deid]
            endpoint = "https://deid.example.com"
            api_key = "deid-key"
            chunk_size = 1000

            [video]
            min_face_size = 60
            blur_sigma = 45.0
            abort_on_detection_error = true

            [pipeline]
            require_transcript = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.output.keep_intermediate);
        assert_eq!(config.acquisition.format, "bestvideo+bestaudio");
        assert_eq!(config.speech.locale, "de-DE");
        assert_eq!(config.storage.sas_validity_hours, 48);
        assert_eq!(config.deid.chunk_size, 1000);
        assert_eq!(config.video.min_face_size, 60);
        assert!(config.video.abort_on_detection_error);
        assert!(config.pipeline.require_transcript);
    }

    #[test]
    fn test_config_roundtrip_serialize() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.speech.poll_interval_secs,
            config.speech.poll_interval_secs
        );
        assert_eq!(parsed.deid.chunk_size, config.deid.chunk_size);
        assert_eq!(parsed.video.blur_sigma, config.video.blur_sigma);
    }

    #[test]
    fn test_load_nonexistent_path_errors() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_with_path_returns_resolved_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_file = tmp.path().join("mediascrub.toml");
        std::fs::write(&config_file, "[deid]\nchunk_size = 123\n").unwrap();

        let (config, resolved) = Config::load_with_path(Some(config_file.as_path())).unwrap();
        assert_eq!(config.deid.chunk_size, 123);
        assert_eq!(resolved, Some(config_file));
    }

    #[test]
    fn test_generate_default_commented_is_valid_toml() {
        let content = Config::generate_default_commented();
        let config: Config = toml::from_str(&content).unwrap();
        assert_eq!(config.deid.chunk_size, 5000);
        assert_eq!(config.speech.poll_interval_secs, 10);
        assert_eq!(config.video.progress_interval_frames, 500);
    }

    #[test]
    fn test_generate_default_commented_has_all_sections() {
        let content = Config::generate_default_commented();
        assert!(content.contains("[output]"));
        assert!(content.contains("[acquisition]"));
        assert!(content.contains("[speech]"));
        assert!(content.contains("[storage]"));
        assert!(content.contains("[deid]"));
        assert!(content.contains("[video]"));
        assert!(content.contains("[pipeline]"));
    }

    #[test]
    fn test_speech_config_debug_redacts_api_key() {
        let config = SpeechConfig {
            region: "eastus".to_string(),
            api_key: "super-secret-key-12345".to_string(),
            ..Default::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("eastus"));
    }

    #[test]
    fn test_config_debug_redacts_nested_secrets() {
        let mut config = Config::default();
        config.speech.api_key = "nested-speech-key".to_string();
        config.storage.access_key = "nested-storage-key".to_string();
        config.deid.api_key = "nested-deid-key".to_string();
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("nested-speech-key"));
        assert!(!debug_output.contains("nested-storage-key"));
        assert!(!debug_output.contains("nested-deid-key"));
    }
}
