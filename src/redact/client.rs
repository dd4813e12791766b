use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::DeidConfig;

/// Remote text redaction collaborator. Accepts one text span, returns the
/// redacted span. The service negotiates no chunk size; callers split first.
pub trait DeidApi: Send {
    fn redact(&self, text: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeidRequest<'a> {
    input_text: &'a str,
    operation: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeidResponse {
    output_text: String,
}

/// De-identification service REST client.
pub struct AzureDeidClient {
    endpoint: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl AzureDeidClient {
    pub fn from_config(config: &DeidConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("MEDIASCRUB_DEID_KEY")
                .context("De-id API key not configured. Set [deid] api_key or MEDIASCRUB_DEID_KEY")?
        };

        if config.endpoint.is_empty() {
            anyhow::bail!("De-id endpoint not configured. Set [deid] endpoint in mediascrub.toml");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

impl DeidApi for AzureDeidClient {
    fn redact(&self, text: &str) -> Result<String> {
        let url = format!("{}/deid?api-version=2024-11-15", self.endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&DeidRequest {
                input_text: text,
                operation: "Redact",
            })
            .send()
            .context("Failed to reach de-identification service")?
            .error_for_status()
            .context("De-identification request rejected")?;

        let body: DeidResponse = response
            .json()
            .context("De-identification response missing outputText")?;
        Ok(body.output_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeidConfig;

    #[test]
    fn test_from_config_missing_endpoint() {
        let config = DeidConfig {
            api_key: "key".to_string(),
            ..Default::default()
        };
        assert!(AzureDeidClient::from_config(&config).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let body = serde_json::to_value(DeidRequest {
            input_text: "John Smith",
            operation: "Redact",
        })
        .unwrap();
        assert_eq!(body["inputText"], "John Smith");
        assert_eq!(body["operation"], "Redact");
    }

    #[test]
    fn test_response_deserialization() {
        let body: DeidResponse =
            serde_json::from_str(r#"{"outputText":"[redacted] was seen"}"#).unwrap();
        assert_eq!(body.output_text, "[redacted] was seen");
    }
}
