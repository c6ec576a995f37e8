//! Core types and trait definitions for the recognition pipeline
//!
//! Defines the seams the orchestrator is built against:
//! - `MediaSource` — metadata probe + audio download
//! - `AcousticIdentifier` — audio file → (title, artist) candidate
//! - `Catalog` — (title, artist) → canonical streaming-catalog track
//!
//! Concrete implementations live in `services/`; the traits exist so the
//! pipeline can be driven by fake collaborators in tests.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Pipeline data model
// ============================================================================

/// Title sentinel some platforms emit when a clip uses unlicensed audio
pub const PLACEHOLDER_TITLE: &str = "Original Audio";

/// Embedded metadata extracted without downloading the media payload
#[derive(Debug, Clone, Default)]
pub struct MetadataGuess {
    /// Track title, if the source page carried one
    pub title: Option<String>,
    /// Artist or uploader name
    pub artist: Option<String>,
}

impl MetadataGuess {
    /// Return (title, artist) when both are present and non-empty and the
    /// title is not the "Original Audio" placeholder
    pub fn usable(&self) -> Option<(&str, &str)> {
        let title = self.title.as_deref()?.trim();
        let artist = self.artist.as_deref()?.trim();
        if title.is_empty() || artist.is_empty() || title.contains(PLACEHOLDER_TITLE) {
            return None;
        }
        Some((title, artist))
    }
}

/// Audio payload downloaded to scratch storage
///
/// Created by the media fetcher; deleted by the orchestrator on every exit
/// path. At most one exists per in-flight request.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    /// Scratch file path
    pub path: PathBuf,
    /// File extension actually produced ("mp3" when ffmpeg extraction ran,
    /// otherwise whatever native container the source provided)
    pub format: String,
}

/// Which signal produced an identification candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Embedded page metadata (no audio downloaded)
    Metadata,
    /// AI transcription / content understanding of the audio
    AiTranscription,
    /// Acoustic fingerprint match
    Fingerprint,
}

/// A best-guess (title, artist) pair awaiting catalog resolution
#[derive(Debug, Clone)]
pub struct TrackCandidate {
    pub title: String,
    pub artist: String,
    pub source: CandidateSource,
}

/// Read-only projection of a streaming-catalog track
#[derive(Debug, Clone, Serialize)]
pub struct CatalogTrack {
    /// Track name as the catalog spells it
    pub name: String,
    /// Primary artist name
    pub artist_name: String,
    /// Catalog URI (playable reference)
    pub uri: String,
    /// External web URL
    pub external_url: String,
    /// Album art image URL
    pub album_art_url: String,
    /// Catalog popularity score (0-100); used for disambiguation
    pub popularity: u32,
    /// 30-second preview URL, when the catalog has one
    pub preview_url: Option<String>,
}

/// Catalog search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Field-scoped query (title field + artist field), top result only
    Strict,
    /// Free-text query, several results, highest popularity wins
    Broad,
}

/// Stable failure reason codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Audio download produced no file
    DownloadFailed,
    /// Neither transcription nor fingerprinting could name the song
    NoAcousticMatch,
    /// A candidate was identified but the catalog has no match
    NotInCatalog,
    /// An upstream service errored or timed out
    UpstreamError,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::DownloadFailed => "DOWNLOAD_FAILED",
            FailureReason::NoAcousticMatch => "NO_ACOUSTIC_MATCH",
            FailureReason::NotInCatalog => "NOT_IN_CATALOG",
            FailureReason::UpstreamError => "UPSTREAM_ERROR",
        }
    }
}

/// Sole return value of the recognition orchestrator
#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    /// Canonical track located on the catalog
    Matched {
        track: CatalogTrack,
        /// Placeholder confidence constant, not a measured probability
        confidence: f32,
        source: CandidateSource,
    },
    /// Pipeline completed without a catalog match
    Unmatched {
        reason: FailureReason,
        detail: String,
    },
}

// ============================================================================
// Component errors
// ============================================================================

/// Media fetcher errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Metadata probe failed (non-fatal; the orchestrator swallows it)
    #[error("Metadata extraction failed: {0}")]
    Probe(String),

    /// Audio download failed or produced no output file (fatal)
    #[error("Audio download failed: {0}")]
    Download(String),
}

/// Acoustic identifier errors
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// The service processed the audio but could not name the song
    #[error("No acoustic match: {0}")]
    NoMatch(String),

    /// The service errored, timed out, or returned garbage
    #[error("Upstream identification error: {0}")]
    Upstream(String),
}

/// Catalog resolver errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Search returned an empty result set (expected business outcome)
    #[error("No catalog match for \"{title}\" by \"{artist}\"")]
    NotFound { title: String, artist: String },

    #[error("Catalog auth error: {0}")]
    Auth(String),

    #[error("Catalog network error: {0}")]
    Network(String),

    #[error("Catalog API error {0}: {1}")]
    Api(u16, String),

    #[error("Catalog parse error: {0}")]
    Parse(String),
}

// ============================================================================
// Component traits
// ============================================================================

/// Source-URL media access: lightweight metadata probe plus audio download
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    /// Extract embedded title/artist without fetching the media payload
    async fn probe_metadata(&self, url: &str) -> Result<MetadataGuess, FetchError>;

    /// Download the best available audio stream into a request-unique
    /// scratch file; the caller owns deletion
    async fn fetch_audio(&self, url: &str) -> Result<AudioAsset, FetchError>;
}

/// One acoustic identification strategy (AI transcription or fingerprint)
#[async_trait::async_trait]
pub trait AcousticIdentifier: Send + Sync {
    /// Strategy name for logging and provenance
    fn name(&self) -> &'static str;

    /// Identify the song in a local audio file
    async fn identify(&self, asset: &AudioAsset) -> Result<TrackCandidate, IdentifyError>;
}

/// Streaming-catalog search with deterministic disambiguation
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a (title, artist) pair to the single best catalog track
    async fn resolve(
        &self,
        title: &str,
        artist: &str,
        mode: SearchMode,
    ) -> Result<CatalogTrack, CatalogError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_metadata() {
        let guess = MetadataGuess {
            title: Some("Blinding Lights".to_string()),
            artist: Some("The Weeknd".to_string()),
        };
        assert_eq!(guess.usable(), Some(("Blinding Lights", "The Weeknd")));
    }

    #[test]
    fn test_placeholder_title_is_not_usable() {
        let guess = MetadataGuess {
            title: Some("Original Audio".to_string()),
            artist: Some("someuploader".to_string()),
        };
        assert_eq!(guess.usable(), None);

        // Sentinel embedded in a longer title is still a placeholder
        let guess = MetadataGuess {
            title: Some("Original Audio - someuploader".to_string()),
            artist: Some("someuploader".to_string()),
        };
        assert_eq!(guess.usable(), None);
    }

    #[test]
    fn test_partial_metadata_is_not_usable() {
        let title_only = MetadataGuess {
            title: Some("Some Song".to_string()),
            artist: None,
        };
        assert_eq!(title_only.usable(), None);

        assert_eq!(MetadataGuess::default().usable(), None);
    }

    #[test]
    fn test_empty_strings_are_not_usable() {
        // An empty artist must escalate to the download path, not drive a
        // catalog search on the title alone
        let empty_artist = MetadataGuess {
            title: Some("Some Song".to_string()),
            artist: Some("".to_string()),
        };
        assert_eq!(empty_artist.usable(), None);

        let blank_title = MetadataGuess {
            title: Some("   ".to_string()),
            artist: Some("Some Artist".to_string()),
        };
        assert_eq!(blank_title.usable(), None);
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::DownloadFailed.code(), "DOWNLOAD_FAILED");
        assert_eq!(FailureReason::NotInCatalog.code(), "NOT_IN_CATALOG");
    }
}
