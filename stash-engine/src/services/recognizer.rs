//! Recognition orchestrator
//!
//! The pipeline state machine: metadata probe → fast catalog path →
//! download → acoustic identify → slow catalog path. Cheap signal sources
//! run first; audio is only ever downloaded when embedded metadata could
//! not settle the question.
//!
//! The orchestrator owns every temporary resource lifecycle. A downloaded
//! scratch file is wrapped in a [`ScratchAudio`] guard the moment it
//! exists, so it is deleted on every exit path from the identify stage —
//! success, failure, or task cancellation.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::{
    AcousticIdentifier, AudioAsset, CandidateSource, Catalog, CatalogError, FailureReason,
    IdentifyError, MediaSource, RecognitionOutcome, SearchMode,
};

/// Confidence constants attached to pipeline results
///
/// Placeholder scores, not measured probabilities: embedded-metadata
/// matches are treated as more reliable than acoustic-derived ones, and
/// that is all these numbers encode.
#[derive(Debug, Clone, Copy)]
pub struct RecognizerConfig {
    /// Confidence attached to fast-path (embedded metadata) matches
    pub metadata_confidence: f32,
    /// Confidence attached to slow-path (AI/fingerprint) matches
    pub acoustic_confidence: f32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            metadata_confidence: 0.99,
            acoustic_confidence: 0.95,
        }
    }
}

/// Guard owning one request's scratch audio file
///
/// Deletion runs in `Drop`, so the file goes away on early returns and on
/// cancellation while an upstream call is pending. Removing an
/// already-removed path is a no-op.
pub struct ScratchAudio {
    asset: AudioAsset,
}

impl ScratchAudio {
    pub fn new(asset: AudioAsset) -> Self {
        Self { asset }
    }

    pub fn asset(&self) -> &AudioAsset {
        &self.asset
    }
}

impl Drop for ScratchAudio {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.asset.path) {
            Ok(()) => debug!(path = %self.asset.path.display(), "Scratch audio deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.asset.path.display(), error = %e, "Scratch audio delete failed")
            }
        }
    }
}

/// Recognition pipeline orchestrator
///
/// Collaborators are injected as trait objects so the state machine can be
/// driven by fakes in tests.
pub struct Recognizer {
    media: Arc<dyn MediaSource>,
    identifier: Arc<dyn AcousticIdentifier>,
    catalog: Arc<dyn Catalog>,
    config: RecognizerConfig,
}

impl Recognizer {
    pub fn new(
        media: Arc<dyn MediaSource>,
        identifier: Arc<dyn AcousticIdentifier>,
        catalog: Arc<dyn Catalog>,
        config: RecognizerConfig,
    ) -> Self {
        Self {
            media,
            identifier,
            catalog,
            config,
        }
    }

    /// Run the full recognition pipeline for one source URL
    pub async fn recognize(&self, url: &str) -> RecognitionOutcome {
        info!(url = %url, "Recognition started");

        // Fast path: embedded metadata, no audio ever downloaded.
        if let Some(outcome) = self.try_metadata_fast_path(url).await {
            return outcome;
        }

        // Slow path: download, then acoustic identification.
        let asset = match self.media.fetch_audio(url).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(url = %url, error = %e, "Audio download failed");
                return RecognitionOutcome::Unmatched {
                    reason: FailureReason::DownloadFailed,
                    detail: "Failed to download audio".to_string(),
                };
            }
        };
        let scratch = ScratchAudio::new(asset);

        let candidate = match self.identifier.identify(scratch.asset()).await {
            Ok(candidate) => candidate,
            Err(IdentifyError::NoMatch(detail)) => {
                info!(strategy = self.identifier.name(), detail = %detail, "No acoustic match");
                return RecognitionOutcome::Unmatched {
                    reason: FailureReason::NoAcousticMatch,
                    detail: "Could not identify the song in this audio".to_string(),
                };
            }
            Err(IdentifyError::Upstream(detail)) => {
                warn!(strategy = self.identifier.name(), detail = %detail, "Identification upstream error");
                return RecognitionOutcome::Unmatched {
                    reason: FailureReason::UpstreamError,
                    detail: "Identification service error".to_string(),
                };
            }
        };

        info!(
            title = %candidate.title,
            artist = %candidate.artist,
            source = ?candidate.source,
            "Acoustic candidate identified"
        );

        match self
            .catalog
            .resolve(&candidate.title, &candidate.artist, SearchMode::Broad)
            .await
        {
            Ok(track) => RecognitionOutcome::Matched {
                track,
                confidence: self.config.acoustic_confidence,
                source: candidate.source,
            },
            Err(CatalogError::NotFound { .. }) => RecognitionOutcome::Unmatched {
                reason: FailureReason::NotInCatalog,
                detail: format!(
                    "Identified \"{}\" by \"{}\" but found no catalog match",
                    candidate.title, candidate.artist
                ),
            },
            Err(e) => {
                warn!(error = %e, "Catalog search failed after identification");
                RecognitionOutcome::Unmatched {
                    reason: FailureReason::UpstreamError,
                    detail: "Catalog search error".to_string(),
                }
            }
        }
        // `scratch` drops here (or at any early return above), deleting the
        // downloaded file.
    }

    /// Probe embedded metadata and try a broad catalog search on it
    ///
    /// Returns `Some(outcome)` only on a catalog hit. Probe failures and
    /// catalog misses are inconclusive, never fatal: the caller escalates
    /// to the download path.
    async fn try_metadata_fast_path(&self, url: &str) -> Option<RecognitionOutcome> {
        let guess = match self.media.probe_metadata(url).await {
            Ok(guess) => guess,
            Err(e) => {
                warn!(url = %url, error = %e, "Metadata probe failed, escalating to download");
                return None;
            }
        };

        let Some((title, artist)) = guess.usable() else {
            debug!(url = %url, "No usable embedded metadata, escalating to download");
            return None;
        };

        info!(title = %title, artist = %artist, "Embedded metadata found, trying fast path");

        // Broad rather than strict: source metadata is noisy free text, and
        // popularity ranking suppresses mismatches.
        match self.catalog.resolve(title, artist, SearchMode::Broad).await {
            Ok(track) => Some(RecognitionOutcome::Matched {
                track,
                confidence: self.config.metadata_confidence,
                source: CandidateSource::Metadata,
            }),
            Err(CatalogError::NotFound { .. }) => {
                info!(title = %title, artist = %artist, "Embedded metadata not in catalog, escalating");
                None
            }
            Err(e) => {
                warn!(error = %e, "Fast-path catalog search failed, escalating");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn asset(path: PathBuf) -> AudioAsset {
        AudioAsset {
            path,
            format: "mp3".to_string(),
        }
    }

    #[test]
    fn test_scratch_guard_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel-test.mp3");
        std::fs::write(&path, b"audio").unwrap();

        {
            let _guard = ScratchAudio::new(asset(path.clone()));
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_guard_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-created.mp3");

        // Dropping a guard for a nonexistent path neither panics nor errors
        let guard = ScratchAudio::new(asset(path));
        drop(guard);
    }

    #[test]
    fn test_default_confidence_split() {
        let config = RecognizerConfig::default();
        // Metadata matches rank above acoustic matches
        assert!(config.metadata_confidence > config.acoustic_confidence);
    }
}
