//! AudD fingerprint client
//!
//! Single-call acoustic fingerprint matching: one multipart POST of the raw
//! audio file, one structured answer. No upload/poll lifecycle and no remote
//! asset to release, in contrast to the AI-transcription strategy.

use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{AcousticIdentifier, AudioAsset, CandidateSource, IdentifyError, TrackCandidate};

const AUDD_API_URL: &str = "https://api.audd.io/";

/// Timeout for AudD recognition requests (the upload dominates)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AuddResponse {
    status: String,
    result: Option<AuddMatch>,
    error: Option<AuddApiError>,
}

#[derive(Debug, Deserialize)]
struct AuddMatch {
    artist: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct AuddApiError {
    error_code: i64,
    error_message: String,
}

/// AudD music recognition client
pub struct AuddClient {
    http_client: Client,
    api_token: String,
    api_url: String,
}

impl AuddClient {
    pub fn new(api_token: String) -> Result<Self, IdentifyError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| IdentifyError::Upstream(e.to_string()))?;

        Ok(Self {
            http_client,
            api_token,
            api_url: AUDD_API_URL.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl AcousticIdentifier for AuddClient {
    fn name(&self) -> &'static str {
        "AudD"
    }

    async fn identify(&self, asset: &AudioAsset) -> Result<TrackCandidate, IdentifyError> {
        let bytes = tokio::fs::read(&asset.path)
            .await
            .map_err(|e| IdentifyError::Upstream(format!("Read audio file failed: {}", e)))?;

        debug!(
            path = %asset.path.display(),
            bytes = bytes.len(),
            "Submitting audio to AudD"
        );

        let file_name = format!("audio.{}", asset.format);
        let form = multipart::Form::new()
            .text("api_token", self.api_token.clone())
            .text("return", "spotify")
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http_client
            .post(&self.api_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IdentifyError::Upstream(format!("AudD request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentifyError::Upstream(format!(
                "AudD returned {}: {}",
                status, body
            )));
        }

        let answer: AuddResponse = response
            .json()
            .await
            .map_err(|e| IdentifyError::Upstream(format!("Unparseable AudD response: {}", e)))?;

        if answer.status != "success" {
            let detail = answer
                .error
                .map(|e| format!("{} (code {})", e.error_message, e.error_code))
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(IdentifyError::Upstream(format!("AudD error: {}", detail)));
        }

        let Some(hit) = answer.result else {
            return Err(IdentifyError::NoMatch(
                "AudD found no fingerprint match".to_string(),
            ));
        };

        info!(title = %hit.title, artist = %hit.artist, "AudD identified song");
        Ok(TrackCandidate {
            title: hit.title,
            artist: hit.artist,
            source: CandidateSource::Fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_response_shape() {
        // `status: success` with a null result means "no match", which the
        // identifier reports as NoMatch, not an upstream error.
        let json = r#"{"status": "success", "result": null}"#;
        let answer: AuddResponse = serde_json::from_str(json).unwrap();
        assert_eq!(answer.status, "success");
        assert!(answer.result.is_none());
    }

    #[test]
    fn test_match_response_shape() {
        let json = r#"{"status": "success", "result": {"artist": "Kavinsky", "title": "Nightcall"}}"#;
        let answer: AuddResponse = serde_json::from_str(json).unwrap();
        let hit = answer.result.unwrap();
        assert_eq!(hit.artist, "Kavinsky");
        assert_eq!(hit.title, "Nightcall");
    }

    #[test]
    fn test_error_response_shape() {
        let json = r#"{"status": "error", "error": {"error_code": 901, "error_message": "Recognition failed"}}"#;
        let answer: AuddResponse = serde_json::from_str(json).unwrap();
        assert_eq!(answer.status, "error");
        assert_eq!(answer.error.unwrap().error_code, 901);
    }
}
