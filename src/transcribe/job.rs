//! Remote transcription job lifecycle: submit, poll to a terminal status,
//! fetch and decode the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::TranscriptionError;
use crate::transcribe::api::{JobStatus, SpeechApi, TranscriptionRequest};
use crate::transcribe::transcript::{extract_transcript, Transcript};

/// Opaque reference to an asynchronously executing remote job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_url: String,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl JobHandle {
    /// Short identifier for log lines (last path segment of the job URL).
    pub fn id(&self) -> &str {
        self.job_url.rsplit('/').next().unwrap_or(&self.job_url)
    }
}

/// Drives a single transcription job against the remote service.
///
/// Failure is terminal for a job; the controller never retries
/// automatically.
pub struct JobController {
    api: Box<dyn SpeechApi>,
    poll_interval: Duration,
    locale: String,
}

impl JobController {
    pub fn new(api: Box<dyn SpeechApi>, poll_interval: Duration, locale: String) -> Self {
        Self {
            api,
            poll_interval,
            locale,
        }
    }

    /// Submit the staged audio for transcription.
    pub fn submit(&self, audio_url: &str) -> Result<JobHandle, TranscriptionError> {
        let submitted_at = chrono::Utc::now();
        let request = TranscriptionRequest {
            content_url: audio_url.to_string(),
            display_name: format!("transcription_{}", submitted_at.timestamp()),
            locale: self.locale.clone(),
        };

        let job_url = self
            .api
            .submit(&request)
            .map_err(|e| TranscriptionError::Submission(format!("{:#}", e)))?;

        let handle = JobHandle {
            job_url,
            submitted_at,
        };
        tracing::info!("Transcription job submitted: {}", handle.id());
        Ok(handle)
    }

    /// Poll the job on a fixed interval until it reaches a terminal status,
    /// then fetch and decode the result document.
    ///
    /// The wait is unbounded (the job takes as long as it takes) but
    /// cooperatively cancellable: setting `cancel` makes the loop return
    /// [`TranscriptionError::Cancelled`] within a fraction of a second.
    pub fn await_completion(
        &self,
        handle: &JobHandle,
        cancel: &AtomicBool,
    ) -> Result<Transcript, TranscriptionError> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(TranscriptionError::Cancelled);
            }

            let response = self
                .api
                .poll(&handle.job_url)
                .map_err(|e| TranscriptionError::Transport(format!("{:#}", e)))?;

            match response.status {
                JobStatus::Running => {
                    tracing::debug!("Job {} still running", handle.id());
                    if !sleep_cancellable(self.poll_interval, cancel) {
                        return Err(TranscriptionError::Cancelled);
                    }
                }
                JobStatus::Failed => {
                    return Err(TranscriptionError::JobFailed(handle.id().to_string()));
                }
                JobStatus::Succeeded => {
                    tracing::info!("Job {} succeeded, fetching results", handle.id());
                    let files_url = response
                        .files_url
                        .ok_or(TranscriptionError::UnrecognizedFormat)?;
                    let files = self
                        .api
                        .result_files(&files_url)
                        .map_err(|e| TranscriptionError::Transport(format!("{:#}", e)))?;

                    let entry = files
                        .iter()
                        .find(|f| f.kind == "Transcription")
                        .ok_or(TranscriptionError::UnrecognizedFormat)?;

                    let document = self
                        .api
                        .fetch_content(&entry.content_url)
                        .map_err(|e| TranscriptionError::Transport(format!("{:#}", e)))?;

                    return extract_transcript(&document);
                }
            }
        }
    }
}

/// Sleep for `duration` in short slices, returning `false` early if `cancel`
/// is set.
fn sleep_cancellable(duration: Duration, cancel: &AtomicBool) -> bool {
    let deadline = std::time::Instant::now() + duration;
    while std::time::Instant::now() < deadline {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100).min(duration));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::api::{JobStatusResponse, ResultFile};
    use anyhow::Result;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted speech service: plays back a fixed status sequence, then
    /// serves a canned manifest and result document.
    struct FakeSpeechApi {
        statuses: Mutex<Vec<JobStatus>>,
        manifest: Vec<ResultFile>,
        document: serde_json::Value,
        fail_submit: bool,
    }

    impl FakeSpeechApi {
        fn succeeding(statuses: Vec<JobStatus>, document: serde_json::Value) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                manifest: vec![
                    ResultFile {
                        kind: "TranscriptionReport".to_string(),
                        content_url: "https://results.example.com/report.json".to_string(),
                    },
                    ResultFile {
                        kind: "Transcription".to_string(),
                        content_url: "https://results.example.com/result.json".to_string(),
                    },
                ],
                document,
                fail_submit: false,
            }
        }
    }

    impl SpeechApi for FakeSpeechApi {
        fn submit(&self, _request: &TranscriptionRequest) -> Result<String> {
            if self.fail_submit {
                anyhow::bail!("HTTP 403: invalid subscription key");
            }
            Ok("https://speech.example.com/transcriptions/job-42".to_string())
        }

        fn poll(&self, _job_url: &str) -> Result<JobStatusResponse> {
            let mut statuses = self.statuses.lock().unwrap();
            let status = statuses.remove(0);
            let files_url = match status {
                JobStatus::Succeeded => Some("https://speech.example.com/files".to_string()),
                _ => None,
            };
            Ok(JobStatusResponse { status, files_url })
        }

        fn result_files(&self, _files_url: &str) -> Result<Vec<ResultFile>> {
            Ok(self.manifest.clone())
        }

        fn fetch_content(&self, _content_url: &str) -> Result<serde_json::Value> {
            Ok(self.document.clone())
        }
    }

    fn controller(api: FakeSpeechApi) -> JobController {
        JobController::new(Box::new(api), Duration::from_millis(5), "en-US".to_string())
    }

    fn flat_document() -> serde_json::Value {
        json!({
            "combinedRecognizedPhrases": [
                {"display": "Hello."},
                {"display": "Goodbye."}
            ]
        })
    }

    #[test]
    fn test_running_then_succeeded_returns_joined_transcript() {
        let api = FakeSpeechApi::succeeding(
            vec![JobStatus::Running, JobStatus::Running, JobStatus::Succeeded],
            flat_document(),
        );
        let controller = controller(api);
        let handle = controller.submit("https://blob/audio.wav?sas").unwrap();
        let cancel = AtomicBool::new(false);
        let transcript = controller.await_completion(&handle, &cancel).unwrap();
        assert_eq!(transcript.text(), "Hello. Goodbye.");
    }

    #[test]
    fn test_nested_shape_is_extracted() {
        let api = FakeSpeechApi::succeeding(
            vec![JobStatus::Succeeded],
            json!({
                "combinedRecognizedPhrases": [
                    {"nBest": [{"display": "Best guess."}]}
                ]
            }),
        );
        let controller = controller(api);
        let handle = controller.submit("https://blob/audio.wav?sas").unwrap();
        let cancel = AtomicBool::new(false);
        let transcript = controller.await_completion(&handle, &cancel).unwrap();
        assert_eq!(transcript.text(), "Best guess.");
    }

    #[test]
    fn test_unknown_shape_fails_rather_than_guessing() {
        let api = FakeSpeechApi::succeeding(
            vec![JobStatus::Succeeded],
            json!({"combinedRecognizedPhrases": [{"mystery": true}]}),
        );
        let controller = controller(api);
        let handle = controller.submit("https://blob/audio.wav?sas").unwrap();
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            controller.await_completion(&handle, &cancel),
            Err(TranscriptionError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_failed_job_is_terminal() {
        let api = FakeSpeechApi::succeeding(
            vec![JobStatus::Running, JobStatus::Failed],
            flat_document(),
        );
        let controller = controller(api);
        let handle = controller.submit("https://blob/audio.wav?sas").unwrap();
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            controller.await_completion(&handle, &cancel),
            Err(TranscriptionError::JobFailed(_))
        ));
    }

    #[test]
    fn test_submission_error_is_typed() {
        let mut api = FakeSpeechApi::succeeding(vec![], flat_document());
        api.fail_submit = true;
        let controller = controller(api);
        assert!(matches!(
            controller.submit("https://blob/audio.wav?sas"),
            Err(TranscriptionError::Submission(_))
        ));
    }

    #[test]
    fn test_cancellation_interrupts_polling() {
        let api = FakeSpeechApi::succeeding(vec![JobStatus::Running], flat_document());
        let controller = controller(api);
        let handle = JobHandle {
            job_url: "https://speech.example.com/transcriptions/job-42".to_string(),
            submitted_at: chrono::Utc::now(),
        };
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            controller.await_completion(&handle, &cancel),
            Err(TranscriptionError::Cancelled)
        ));
    }

    #[test]
    fn test_manifest_without_transcription_kind_is_unrecognized() {
        let mut api = FakeSpeechApi::succeeding(vec![JobStatus::Succeeded], flat_document());
        api.manifest.retain(|f| f.kind != "Transcription");
        let controller = controller(api);
        let handle = controller.submit("https://blob/audio.wav?sas").unwrap();
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            controller.await_completion(&handle, &cancel),
            Err(TranscriptionError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_job_handle_id_is_last_path_segment() {
        let handle = JobHandle {
            job_url: "https://speech.example.com/transcriptions/abc-123".to_string(),
            submitted_at: chrono::Utc::now(),
        };
        assert_eq!(handle.id(), "abc-123");
    }
}
