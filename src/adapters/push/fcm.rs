use crate::adapters::push::{MessagingProvider, ProviderError};
use crate::config::FcmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Firebase Cloud Messaging over the HTTP v1 API, with topic management through Instance ID.
#[derive(Clone)]
pub struct FcmProvider {
    client: reqwest::Client,
    send_url: String,
    batch_add_url: String,
    access_token: String,
}

impl fmt::Debug for FcmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmProvider")
            .field("send_url", &self.send_url)
            .field("batch_add_url", &self.batch_add_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: ProbeMessage<'a>,
}

#[derive(Debug, Serialize)]
struct ProbeMessage<'a> {
    token: &'a str,
    data: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
struct BatchAddRequest<'a> {
    to: String,
    registration_tokens: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchAddResponse {
    #[serde(default)]
    results: Vec<BatchAddResult>,
}

#[derive(Debug, Deserialize)]
struct BatchAddResult {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

impl FcmProvider {
    /// Builds a provider from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &FcmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build()?;
        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.base_url.trim_end_matches('/'),
                config.project_id
            ),
            batch_add_url: format!("{}/iid/v1:batchAdd", config.iid_base_url.trim_end_matches('/')),
            access_token: config.access_token.clone(),
        })
    }
}

/// Maps an FCM v1 error response onto the provider error taxonomy.
fn classify_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::QuotaExceeded;
        }
        return ProviderError::Rejected { code: None, message: format!("HTTP {status}: {body}") };
    };

    let code = envelope.error.details.into_iter().find_map(|d| d.error_code).or(envelope.error.status);

    match code.as_deref() {
        Some("UNREGISTERED") => ProviderError::Unregistered,
        Some("INVALID_ARGUMENT") => ProviderError::InvalidToken,
        Some("QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED") => ProviderError::QuotaExceeded,
        _ => ProviderError::Rejected { code, message: envelope.error.message },
    }
}

#[async_trait]
impl MessagingProvider for FcmProvider {
    #[tracing::instrument(level = "debug", skip_all, err)]
    async fn send_probe(&self, token: &str) -> Result<(), ProviderError> {
        let request =
            SendRequest { validate_only: true, message: ProbeMessage { token, data: HashMap::from([("probe", "1")]) } };

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Other(e.into()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    #[tracing::instrument(level = "debug", skip(self, tokens), fields(count = tokens.len()), err)]
    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), ProviderError> {
        let request = BatchAddRequest { to: format!("/topics/{topic}"), registration_tokens: tokens };

        let response = self
            .client
            .post(&self.batch_add_url)
            .bearer_auth(&self.access_token)
            .header("access_token_auth", "true")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Other(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        let body: BatchAddResponse = response.json().await.map_err(|e| ProviderError::Other(e.into()))?;
        if let Some(code) = body.results.into_iter().find_map(|r| r.error) {
            return Err(ProviderError::Rejected {
                code: Some(code),
                message: format!("Topic subscription to {topic} rejected"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_classify_unregistered_detail() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
            "details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert!(matches!(classify_error(StatusCode::NOT_FOUND, body), ProviderError::Unregistered));
    }

    #[test]
    fn test_classify_invalid_argument_status() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify_error(StatusCode::BAD_REQUEST, body), ProviderError::InvalidToken));
    }

    #[test]
    fn test_classify_unknown_code_is_rejected() {
        let body = r#"{"error":{"code":503,"message":"backend down","status":"UNAVAILABLE"}}"#;
        match classify_error(StatusCode::SERVICE_UNAVAILABLE, body) {
            ProviderError::Rejected { code, message } => {
                assert_eq!(code.as_deref(), Some("UNAVAILABLE"));
                assert_eq!(message, "backend down");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_non_json_body() {
        assert!(matches!(
            classify_error(StatusCode::BAD_GATEWAY, "<html>"),
            ProviderError::Rejected { code: None, .. }
        ));
        assert!(matches!(classify_error(StatusCode::TOO_MANY_REQUESTS, ""), ProviderError::QuotaExceeded));
    }
}
