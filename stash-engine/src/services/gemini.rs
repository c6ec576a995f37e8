//! Google Gemini API client
//!
//! Two concerns share this client: the AI-transcription identification
//! strategy (file upload → poll until ACTIVE → prompted inference →
//! best-effort delete) and plain text generation for genre labels and vibe
//! summaries.
//!
//! Model responses are parsed defensively: code fences are stripped before
//! JSON decoding, and a malformed response degrades to a no-match rather
//! than an error bubble.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{AcousticIdentifier, AudioAsset, CandidateSource, IdentifyError, TrackCandidate};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Timeout for individual Gemini HTTP calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed interval between processing-state polls
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on processing-state polls before declaring a timeout
const MAX_POLL_ATTEMPTS: u32 = 30;

/// Identification prompt. The strict-JSON instruction keeps parsing
/// deterministic; the remix/voiceover clause matters for social clips where
/// the audible audio rarely matches the canonical release exactly.
const IDENTIFY_PROMPT: &str = "Listen to this audio. Identify the song name and artist. \
     Ignore remixes, speed changes, or voiceovers. \
     Return ONLY JSON: {'track': 'Name', 'artist': 'Name'}";

/// Gemini client errors
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File processing failed: {0}")]
    Processing(String),

    #[error("File never became ready after {0} polls")]
    Timeout(u32),
}

/// Remote file handle returned by the Files API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFile {
    /// Resource name (`files/<id>`), used for polling and deletion
    pub name: String,
    /// Content URI referenced from generation requests
    pub uri: String,
    /// PROCESSING, ACTIVE, or FAILED
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google Gemini API client
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, GeminiError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            poll_interval: POLL_INTERVAL,
            max_poll_attempts: MAX_POLL_ATTEMPTS,
        })
    }

    /// Override the poll budget (test speedup)
    pub fn with_poll_budget(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    /// Upload a local file to the Files API
    pub async fn upload_file(&self, asset: &AudioAsset) -> Result<GeminiFile, GeminiError> {
        let bytes = tokio::fs::read(&asset.path)
            .await
            .map_err(|e| GeminiError::Network(format!("Read audio file failed: {}", e)))?;
        let mime = mime_for_format(&asset.format);

        debug!(
            path = %asset.path.display(),
            bytes = bytes.len(),
            mime = mime,
            "Uploading audio to Gemini"
        );

        let url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let response = self
            .http_client
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| GeminiError::Network(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(status.as_u16(), body));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(format!("Upload response: {}", e)))?;

        Ok(upload.file)
    }

    /// Fetch the current state of an uploaded file
    pub async fn get_file(&self, name: &str) -> Result<GeminiFile, GeminiError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeminiError::Network(format!("File poll failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(format!("File poll response: {}", e)))
    }

    /// Poll until the uploaded file reaches ACTIVE, bounded by the poll
    /// budget. No inference prompt is issued before the file is ready.
    pub async fn wait_until_active(&self, file: GeminiFile) -> Result<GeminiFile, GeminiError> {
        let mut file = file;
        for attempt in 0..self.max_poll_attempts {
            match file.state.as_deref() {
                Some("ACTIVE") => return Ok(file),
                Some("FAILED") => {
                    return Err(GeminiError::Processing(format!(
                        "Gemini reported FAILED for {}",
                        file.name
                    )))
                }
                _ => {
                    debug!(name = %file.name, attempt = attempt, "Gemini file still processing");
                    tokio::time::sleep(self.poll_interval).await;
                    file = self.get_file(&file.name).await?;
                }
            }
        }
        Err(GeminiError::Timeout(self.max_poll_attempts))
    }

    /// Delete an uploaded file (callers treat failure as best-effort)
    pub async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(|e| GeminiError::Network(format!("File delete failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(status.as_u16(), body));
        }
        Ok(())
    }

    /// One generateContent call over a ready uploaded file
    pub async fn generate_with_file(
        &self,
        prompt: &str,
        file: &GeminiFile,
        mime: &str,
    ) -> Result<String, GeminiError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "fileData": { "fileUri": file.uri, "mimeType": mime } }
                ]
            }]
        });
        self.generate(body).await
    }

    /// One text-only generateContent call
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GeminiError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        self.generate(body).await
    }

    async fn generate(&self, body: serde_json::Value) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, GEMINI_MODEL, self.api_key
        );
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::Network(format!("Generate request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(status.as_u16(), body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(format!("Generate response: {}", e)))?;

        generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .map(|t| t.trim().to_string())
            .ok_or_else(|| GeminiError::Parse("Generate response had no text part".to_string()))
    }

    /// Derive a one-word genre label for a track; never fails, defaults to
    /// "Unknown"
    pub async fn detect_genre(&self, track_name: &str, artist_name: &str) -> String {
        let prompt = format!(
            "What is the primary music genre of the song '{}' by '{}'? \
             Return only ONE word (e.g., Techno, House, Pop, Rock, Ambient). \
             Do not write sentences.",
            track_name, artist_name
        );
        match self.generate_text(&prompt).await {
            Ok(text) => text.trim().replace('.', ""),
            Err(e) => {
                warn!(error = %e, "Genre detection failed, defaulting to Unknown");
                "Unknown".to_string()
            }
        }
    }

    /// Summarize a listening mood over recent tracks; never fails, falls
    /// back to a fixed string
    pub async fn summarize_vibe(&self, songs: &[String]) -> String {
        let song_list = songs
            .iter()
            .take(20) // cap the prompt size
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Here is a user's recently liked music: {}. In one short, fun sentence \
             (max 10 words), describe their current 'music vibe' or mood. Be creative \
             like Spotify Wrapped. Example: 'Melancholic late-night techno drive by yourself.'",
            song_list
        );
        match self.generate_text(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Vibe summary failed, using fallback");
                "Eclectic and mysterious.".to_string()
            }
        }
    }

    /// Identify flow over an already-uploaded, ready file
    async fn identify_uploaded(
        &self,
        file: GeminiFile,
        mime: &str,
    ) -> Result<(String, String), IdentifyError> {
        let file = self.wait_until_active(file).await.map_err(upstream)?;

        info!(name = %file.name, "Gemini file ready, requesting identification");
        let text = self
            .generate_with_file(IDENTIFY_PROMPT, &file, mime)
            .await
            .map_err(upstream)?;

        parse_track_json(&text)
    }
}

#[async_trait::async_trait]
impl AcousticIdentifier for GeminiClient {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn identify(&self, asset: &AudioAsset) -> Result<TrackCandidate, IdentifyError> {
        let mime = mime_for_format(&asset.format);
        let file = self.upload_file(asset).await.map_err(upstream)?;
        let file_name = file.name.clone();

        let result = self.identify_uploaded(file, mime).await;

        // Release the remote asset on success and failure alike.
        if let Err(e) = self.delete_file(&file_name).await {
            warn!(name = %file_name, error = %e, "Failed to delete Gemini file");
        } else {
            debug!(name = %file_name, "Gemini file deleted");
        }

        let (title, artist) = result?;
        info!(title = %title, artist = %artist, "Gemini identified song");
        Ok(TrackCandidate {
            title,
            artist,
            source: CandidateSource::AiTranscription,
        })
    }
}

fn upstream(e: GeminiError) -> IdentifyError {
    IdentifyError::Upstream(e.to_string())
}

/// Strip surrounding markdown code fences from a model response
///
/// Models routinely wrap JSON in ```json fences despite strict-output
/// prompts; the inner payload is what gets decoded.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(rest) = trimmed.split_once("```json").map(|(_, r)| r) {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some(rest) = trimmed.split_once("```").map(|(_, r)| r) {
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    inner.trim()
}

/// Parse the model's `{track, artist}` answer defensively
fn parse_track_json(text: &str) -> Result<(String, String), IdentifyError> {
    let payload = strip_code_fences(text);

    // Single quotes appear when the model echoes the prompt's JSON sketch
    // back literally; normalize only when the payload has no double quotes.
    let normalized;
    let payload = if !payload.contains('"') && payload.contains('\'') {
        normalized = payload.replace('\'', "\"");
        &normalized
    } else {
        payload
    };

    let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| {
        IdentifyError::NoMatch(format!("Model response was not valid JSON: {}", e))
    })?;

    let track = value.get("track").and_then(|v| v.as_str());
    let artist = value.get("artist").and_then(|v| v.as_str());
    match (track, artist) {
        (Some(track), Some(artist)) if !track.is_empty() && !artist.is_empty() => {
            Ok((track.to_string(), artist.to_string()))
        }
        _ => Err(IdentifyError::NoMatch(
            "Model response missing track/artist keys".to_string(),
        )),
    }
}

/// Map an audio file extension to the MIME type the Files API expects
pub fn mime_for_format(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let text = "```json\n{\"track\": \"Levitating\", \"artist\": \"Dua Lipa\"}\n```";
        assert_eq!(
            strip_code_fences(text),
            "{\"track\": \"Levitating\", \"artist\": \"Dua Lipa\"}"
        );
    }

    #[test]
    fn test_strip_bare_fence() {
        let text = "```\n{\"track\": \"A\", \"artist\": \"B\"}\n```";
        assert_eq!(strip_code_fences(text), "{\"track\": \"A\", \"artist\": \"B\"}");
    }

    #[test]
    fn test_unfenced_text_passes_through() {
        let text = "  {\"track\": \"A\", \"artist\": \"B\"}  ";
        assert_eq!(strip_code_fences(text), "{\"track\": \"A\", \"artist\": \"B\"}");
    }

    #[test]
    fn test_parse_fenced_response() {
        let text = "```json\n{\"track\": \"Blinding Lights\", \"artist\": \"The Weeknd\"}\n```";
        let (track, artist) = parse_track_json(text).unwrap();
        assert_eq!(track, "Blinding Lights");
        assert_eq!(artist, "The Weeknd");
    }

    #[test]
    fn test_parse_single_quoted_response() {
        // Model sometimes echoes the prompt's single-quoted sketch
        let text = "{'track': 'One More Time', 'artist': 'Daft Punk'}";
        let (track, artist) = parse_track_json(text).unwrap();
        assert_eq!(track, "One More Time");
        assert_eq!(artist, "Daft Punk");
    }

    #[test]
    fn test_parse_invalid_json_is_no_match() {
        let result = parse_track_json("I couldn't identify this song, sorry!");
        assert!(matches!(result, Err(IdentifyError::NoMatch(_))));
    }

    #[test]
    fn test_parse_missing_keys_is_no_match() {
        let result = parse_track_json("{\"song\": \"Something\"}");
        assert!(matches!(result, Err(IdentifyError::NoMatch(_))));
    }

    fn file_in_state(state: &str) -> GeminiFile {
        GeminiFile {
            name: "files/test".to_string(),
            uri: "https://example.com/files/test".to_string(),
            state: Some(state.to_string()),
        }
    }

    fn client() -> GeminiClient {
        GeminiClient::new("test-key".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_active_file_needs_no_polling() {
        let file = client()
            .wait_until_active(file_in_state("ACTIVE"))
            .await
            .unwrap();
        assert_eq!(file.name, "files/test");
    }

    #[tokio::test]
    async fn test_failed_file_is_processing_error() {
        let result = client().wait_until_active(file_in_state("FAILED")).await;
        assert!(matches!(result, Err(GeminiError::Processing(_))));
    }

    #[tokio::test]
    async fn test_exhausted_poll_budget_is_timeout() {
        // Zero budget: the loop body never runs and no request is made
        let client = client().with_poll_budget(Duration::from_millis(1), 0);
        let result = client.wait_until_active(file_in_state("PROCESSING")).await;
        assert!(matches!(result, Err(GeminiError::Timeout(0))));
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(mime_for_format("mp3"), "audio/mpeg");
        assert_eq!(mime_for_format("M4A"), "audio/mp4");
        assert_eq!(mime_for_format("xyz"), "application/octet-stream");
    }
}
