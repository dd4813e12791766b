use thiserror::Error;

/// Fatal pipeline errors. Any of these aborts the run immediately.
///
/// Video failures are fatal while transcript/text failures are recoverable
/// (see [`StageWarning`]): a visual identity leak is the severe case, so the
/// pipeline never reports success without a blurred video.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("media acquisition failed: {0}")]
    Acquisition(String),

    #[error("cannot open input video: {0}")]
    VideoOpen(String),

    #[error("video redaction failed: {0}")]
    Video(String),

    #[error("merging blurred video with audio failed: {0}")]
    Merge(String),

    #[error("transcript required by policy but unavailable: {0}")]
    TranscriptRequired(String),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the local video redaction stage.
#[derive(Debug, Error)]
pub enum VideoError {
    /// The input cannot be probed or decoded. Fatal for the whole pipeline.
    #[error("cannot open video: {0}")]
    OpenFailed(String),

    #[error("frame {frame}: {message}")]
    Frame { frame: u64, message: String },

    #[error("encoder failed: {0}")]
    Encode(String),

    #[error("video redaction cancelled")]
    Cancelled,
}

/// Errors from the remote transcription job controller.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("job submission rejected: {0}")]
    Submission(String),

    #[error("transcription job failed: {0}")]
    JobFailed(String),

    #[error("transcription result has an unrecognized phrase format")]
    UnrecognizedFormat,

    #[error("speech service request failed: {0}")]
    Transport(String),

    #[error("polling cancelled")]
    Cancelled,
}

/// Recoverable degradations, collected and returned alongside a best-effort
/// result so the caller can decide whether partial success is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageWarning {
    #[error("audio upload failed, continuing without transcript: {0}")]
    Upload(String),

    #[error("transcription submission failed, continuing without transcript: {0}")]
    Submission(String),

    #[error("transcription did not complete: {0}")]
    TranscriptionFailed(String),

    #[error("transcription result could not be parsed")]
    UnrecognizedFormat,

    #[error("chunk {index} was not redacted (original text kept): {reason}")]
    ChunkNotRedacted { index: usize, reason: String },

    #[error("face detection failed on {frames} frame(s); those frames passed through undetected")]
    DetectionErrors { frames: u64 },
}

impl StageWarning {
    pub fn from_transcription_error(err: &TranscriptionError) -> Self {
        match err {
            TranscriptionError::Submission(msg) => StageWarning::Submission(msg.clone()),
            TranscriptionError::UnrecognizedFormat => StageWarning::UnrecognizedFormat,
            other => StageWarning::TranscriptionFailed(other.to_string()),
        }
    }
}
