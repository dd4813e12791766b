use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::SpeechConfig;

/// Terminal and non-terminal states of a remote transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

/// One status poll result.
#[derive(Debug, Clone)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    /// URL of the result file manifest; present once the job succeeds.
    pub files_url: Option<String>,
}

/// One entry in the result manifest, keyed by `kind`. The entry whose kind is
/// `"Transcription"` holds the phrase data.
#[derive(Debug, Clone)]
pub struct ResultFile {
    pub kind: String,
    pub content_url: String,
}

/// Submission parameters for a new batch transcription job.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub content_url: String,
    pub display_name: String,
    pub locale: String,
}

/// Remote speech-to-text collaborator interface. Each call has a bounded
/// per-call timeout; the unbounded wait lives in the polling loop, not here.
pub trait SpeechApi: Send {
    /// Submit a job. Returns the job URL used for subsequent polling.
    fn submit(&self, request: &TranscriptionRequest) -> Result<String>;
    /// Fetch the current job status.
    fn poll(&self, job_url: &str) -> Result<JobStatusResponse>;
    /// Fetch the result file manifest.
    fn result_files(&self, files_url: &str) -> Result<Vec<ResultFile>>;
    /// Download a result document (SAS-authorized URL, no key needed).
    fn fetch_content(&self, content_url: &str) -> Result<serde_json::Value>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload<'a> {
    display_name: &'a str,
    description: &'a str,
    locale: &'a str,
    content_urls: Vec<&'a str>,
    properties: SubmitProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitProperties {
    word_level_timestamps_enabled: bool,
    punctuation_mode: &'static str,
}

/// Azure Speech batch transcription REST client (v3.1).
pub struct AzureSpeechApi {
    region: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl AzureSpeechApi {
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("MEDIASCRUB_SPEECH_KEY").context(
                "Speech API key not configured. Set [speech] api_key or MEDIASCRUB_SPEECH_KEY",
            )?
        };

        if config.region.is_empty() {
            anyhow::bail!("Speech region not configured. Set [speech] region in mediascrub.toml");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            region: config.region.clone(),
            api_key,
            client,
        })
    }

    fn transcriptions_url(&self) -> String {
        format!(
            "https://{}.api.cognitive.microsoft.com/speechtotext/v3.1/transcriptions",
            self.region
        )
    }
}

impl SpeechApi for AzureSpeechApi {
    fn submit(&self, request: &TranscriptionRequest) -> Result<String> {
        let payload = SubmitPayload {
            display_name: &request.display_name,
            description: "mediascrub de-identification run",
            locale: &request.locale,
            content_urls: vec![&request.content_url],
            properties: SubmitProperties {
                word_level_timestamps_enabled: false,
                punctuation_mode: "DictatedAndAutomatic",
            },
        };

        let response = self
            .client
            .post(self.transcriptions_url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .json(&payload)
            .send()
            .context("Failed to reach speech service")?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("speech service returned HTTP {}: {}", status.as_u16(), body);
        }

        let body: serde_json::Value = response.json()?;
        body.get("self")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .context("submission response missing job URL")
    }

    fn poll(&self, job_url: &str) -> Result<JobStatusResponse> {
        let body: serde_json::Value = self
            .client
            .get(job_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .context("Failed to poll job status")?
            .error_for_status()?
            .json()?;

        let status = match body.get("status").and_then(|v| v.as_str()) {
            Some("Succeeded") => JobStatus::Succeeded,
            Some("Failed") => JobStatus::Failed,
            // NotStarted and Running are both non-terminal.
            Some(_) => JobStatus::Running,
            None => anyhow::bail!("status poll response missing status field"),
        };

        let files_url = body
            .pointer("/links/files")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(JobStatusResponse { status, files_url })
    }

    fn result_files(&self, files_url: &str) -> Result<Vec<ResultFile>> {
        let body: serde_json::Value = self
            .client
            .get(files_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .context("Failed to fetch result manifest")?
            .error_for_status()?
            .json()?;

        let values = body
            .get("values")
            .and_then(|v| v.as_array())
            .context("result manifest missing values array")?;

        let mut files = Vec::with_capacity(values.len());
        for value in values {
            let kind = value.get("kind").and_then(|v| v.as_str());
            let content_url = value.pointer("/links/contentUrl").and_then(|v| v.as_str());
            if let (Some(kind), Some(content_url)) = (kind, content_url) {
                files.push(ResultFile {
                    kind: kind.to_string(),
                    content_url: content_url.to_string(),
                });
            }
        }
        Ok(files)
    }

    fn fetch_content(&self, content_url: &str) -> Result<serde_json::Value> {
        // Content URLs carry their own SAS authorization.
        self.client
            .get(content_url)
            .send()
            .context("Failed to download result document")?
            .error_for_status()?
            .json()
            .context("result document is not valid JSON")
    }
}
