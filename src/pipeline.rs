//! Pipeline coordinator: sequences acquisition, staging, the concurrent
//! remote-transcription wait and local video redaction, chunked text
//! redaction, and the final merge.
//!
//! Video failures abort the run; transcript and text failures degrade to a
//! partial result with collected warnings. The blurred video is the privacy
//! guarantee, the transcript is best-effort.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::acquire::MediaSource;
use crate::config::Config;
use crate::error::{PipelineError, StageWarning, TranscriptionError, VideoError};
use crate::redact::client::DeidApi;
use crate::redact::stage::redact_document;
use crate::storage::AudioStore;
use crate::transcribe::job::JobController;
use crate::video::mux::Muxer;
use crate::video::stage::{VideoRedactor, VideoStats};

/// Everything the coordinator drives. Trait objects so tests can substitute
/// scripted collaborators for the remote services and ffmpeg.
pub struct Collaborators {
    pub source: Box<dyn MediaSource>,
    pub store: Box<dyn AudioStore>,
    pub controller: JobController,
    pub deid: Box<dyn DeidApi>,
    pub redactor: Box<dyn VideoRedactor>,
    pub muxer: Box<dyn Muxer>,
}

/// Externally observable completion state of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// Blurred video remuxed with the original audio.
    pub final_video: PathBuf,
    pub transcript_path: Option<PathBuf>,
    pub redacted_transcript_path: Option<PathBuf>,
    /// Recoverable degradations encountered along the way. Empty means full
    /// success; non-empty means partial success.
    pub warnings: Vec<StageWarning>,
    pub video_stats: VideoStats,
}

impl PipelineResult {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the whole pipeline for one source URL.
///
/// All state is local to this call; nothing is shared between runs. The two
/// long-running units (remote polling, local frame loop) share only the
/// cancel flag and are joined before any dependent step.
pub fn run(
    collaborators: Collaborators,
    config: &Config,
    url: &str,
    cancel: Arc<AtomicBool>,
) -> Result<PipelineResult, PipelineError> {
    let Collaborators {
        source,
        store,
        controller,
        deid,
        mut redactor,
        muxer,
    } = collaborators;

    let work_dir = config.output.directory.clone();
    std::fs::create_dir_all(&work_dir)?;

    let mut warnings: Vec<StageWarning> = Vec::new();

    // Acquisition is fatal: without local media there is nothing to redact.
    let media = source
        .acquire(url, &work_dir)
        .map_err(|e| PipelineError::Acquisition(format!("{:#}", e)))?;

    // Verify the video is decodable before any remote work starts. An
    // unreadable video must abort the run before transcription polling.
    redactor
        .probe(&media.video_path)
        .map_err(|e| PipelineError::VideoOpen(e.to_string()))?;

    // Stage the audio and submit the remote job. Recoverable by default:
    // the run continues transcript-absent unless policy requires one.
    let handle = match store.stage(&media.audio_path) {
        Ok(audio_url) => match controller.submit(&audio_url) {
            Ok(handle) => Some(handle),
            Err(e) => {
                if config.pipeline.require_transcript {
                    return Err(PipelineError::TranscriptRequired(e.to_string()));
                }
                tracing::warn!("Continuing without transcript: {}", e);
                warnings.push(StageWarning::from_transcription_error(&e));
                None
            }
        },
        Err(e) => {
            if config.pipeline.require_transcript {
                return Err(PipelineError::TranscriptRequired(format!("{:#}", e)));
            }
            tracing::warn!("Audio staging failed, continuing without transcript: {:#}", e);
            warnings.push(StageWarning::Upload(format!("{:#}", e)));
            None
        }
    };

    // The remote wait and the local frame loop are independent; run them
    // concurrently and join before the dependent steps.
    let poll_thread = handle
        .map(|handle| {
            let poll_cancel = cancel.clone();
            std::thread::Builder::new()
                .name("transcription-poll".into())
                .spawn(move || controller.await_completion(&handle, &poll_cancel))
        })
        .transpose()?;

    // Local video redaction, CPU-bound, on this thread.
    let silent_path = work_dir.join("blurred_silent.mp4");
    let stats = match redactor.redact(&media.video_path, &silent_path, &cancel) {
        Ok(stats) => stats,
        Err(err) => {
            // Fatal for the whole run: stop the polling thread first.
            cancel.store(true, Ordering::Relaxed);
            if let Some(thread) = poll_thread {
                let _ = thread.join();
            }
            return Err(match err {
                VideoError::OpenFailed(msg) => PipelineError::VideoOpen(msg),
                VideoError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::Video(other.to_string()),
            });
        }
    };
    if stats.detection_failures > 0 {
        warnings.push(StageWarning::DetectionErrors {
            frames: stats.detection_failures,
        });
    }

    let transcript = match poll_thread {
        Some(thread) => match thread.join() {
            Ok(Ok(transcript)) => Some(transcript),
            Ok(Err(TranscriptionError::Cancelled)) => return Err(PipelineError::Cancelled),
            Ok(Err(e)) => {
                if config.pipeline.require_transcript {
                    return Err(PipelineError::TranscriptRequired(e.to_string()));
                }
                tracing::warn!("Continuing without transcript: {}", e);
                warnings.push(StageWarning::from_transcription_error(&e));
                None
            }
            Err(_) => {
                let message = "transcription polling thread panicked".to_string();
                if config.pipeline.require_transcript {
                    return Err(PipelineError::TranscriptRequired(message));
                }
                warnings.push(StageWarning::TranscriptionFailed(message));
                None
            }
        },
        None => None,
    };

    if cancel.load(Ordering::Relaxed) {
        return Err(PipelineError::Cancelled);
    }

    // Text redaction, sequenced after the join. Per-chunk failures degrade
    // fail-open inside the stage.
    let mut transcript_path = None;
    let mut redacted_transcript_path = None;
    if let Some(transcript) = &transcript {
        let text = transcript.text();

        let original = work_dir.join("transcript_original.txt");
        std::fs::write(&original, &text)?;
        transcript_path = Some(original);

        let outcome = redact_document(deid.as_ref(), &text, config.deid.chunk_size);
        warnings.extend(outcome.warnings());

        let redacted = work_dir.join("transcript_redacted.txt");
        std::fs::write(&redacted, &outcome.text)?;
        redacted_transcript_path = Some(redacted);
    }

    // Merge the blurred silent video with the original audio. The video
    // stream is copied untouched; only audio is re-encoded. A failure here
    // means no usable privacy-safe artifact, so it is fatal.
    let final_video = work_dir.join("final_deidentified.mp4");
    muxer
        .merge(&silent_path, &media.audio_path, &final_video)
        .map_err(|e| PipelineError::Merge(format!("{:#}", e)))?;

    if !config.output.keep_intermediate {
        let _ = std::fs::remove_file(&silent_path);
        let _ = std::fs::remove_file(&media.audio_path);
        let _ = std::fs::remove_file(&media.video_path);
    }

    for warning in &warnings {
        tracing::warn!("Partial result: {}", warning);
    }

    Ok(PipelineResult {
        final_video,
        transcript_path,
        redacted_transcript_path,
        warnings,
        video_stats: stats,
    })
}
