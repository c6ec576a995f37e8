//! yt-dlp media fetcher
//!
//! Wraps the `yt-dlp` command line for the two media operations the
//! pipeline needs: a no-download metadata probe and an audio-only download
//! into scratch storage. Shelling out to yt-dlp is deliberate: its JSON
//! dump format is stable and it tracks extractor churn far better than any
//! native library could.
//!
//! Scratch filenames are derived from a per-request UUID, never from the
//! clock, so concurrent requests cannot collide. The fetcher writes exactly
//! one file per download and never deletes it; cleanup belongs to the
//! orchestrator.

use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{AudioAsset, FetchError, MediaSource, MetadataGuess};

/// Metadata fields of interest from `yt-dlp -J`
#[derive(Debug, Deserialize)]
struct InfoDump {
    track: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    uploader: Option<String>,
}

/// Media fetcher backed by the yt-dlp command line
pub struct YtDlpFetcher {
    /// yt-dlp executable name or path
    bin: String,
    /// Directory scratch audio files are written to
    scratch_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self {
            bin: "yt-dlp".to_string(),
            scratch_dir,
        }
    }

    /// Check whether ffmpeg is available for audio extraction
    async fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Find the downloaded file by scratch-basename prefix
    ///
    /// yt-dlp appends the container extension itself, so the exact output
    /// name is not known up front. Zero matches means the download produced
    /// nothing.
    fn resolve_output(&self, base: &str) -> Result<Option<PathBuf>, FetchError> {
        let entries = std::fs::read_dir(&self.scratch_dir)
            .map_err(|e| FetchError::Download(format!("Scratch dir unreadable: {}", e)))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(base) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl MediaSource for YtDlpFetcher {
    /// Extract embedded title/artist without downloading the media payload
    async fn probe_metadata(&self, url: &str) -> Result<MetadataGuess, FetchError> {
        debug!(url = %url, "Probing source metadata");

        let output = Command::new(&self.bin)
            .args([
                "--dump-single-json",
                "--skip-download",
                "--flat-playlist",
                "--quiet",
                "--no-warnings",
                url,
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FetchError::Probe(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Probe(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let info: InfoDump = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Probe(format!("Unparseable yt-dlp JSON dump: {}", e)))?;

        let guess = MetadataGuess {
            title: info.track.or(info.title),
            artist: info.artist.or(info.uploader),
        };

        debug!(title = ?guess.title, artist = ?guess.artist, "Metadata probe complete");
        Ok(guess)
    }

    /// Download the best audio stream into a request-unique scratch file
    async fn fetch_audio(&self, url: &str) -> Result<AudioAsset, FetchError> {
        let base = format!("reel-{}", Uuid::new_v4());
        let template = self
            .scratch_dir
            .join(format!("{}.%(ext)s", base))
            .to_string_lossy()
            .into_owned();

        let mut cmd = Command::new(&self.bin);
        cmd.args(["--quiet", "--no-warnings"]);

        // Extract to a widely compatible codec when a transcoder is on the
        // host; otherwise accept whatever native container the source has.
        if Self::ffmpeg_available().await {
            info!(url = %url, "ffmpeg detected, extracting mp3 audio");
            cmd.args(["-f", "bestaudio/best", "-x", "--audio-format", "mp3"]);
        } else {
            warn!(url = %url, "ffmpeg not found, downloading native audio container");
            cmd.args(["-f", "bestaudio"]);
        }

        let output = cmd
            .args(["-o", &template, url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FetchError::Download(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Download(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let Some(path) = self.resolve_output(&base)? else {
            return Err(FetchError::Download(
                "Download completed but no output file materialized".to_string(),
            ));
        };

        let format = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bin".to_string());

        info!(path = %path.display(), format = %format, "Audio downloaded to scratch");
        Ok(AudioAsset { path, format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_names_are_request_unique() {
        // Filenames derive from a UUID, not the clock, so two requests in
        // the same instant still get distinct scratch files.
        let a = format!("reel-{}", Uuid::new_v4());
        let b = format!("reel-{}", Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_output_finds_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("reel-abc123.m4a"), b"audio").unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"noise").unwrap();

        let found = fetcher.resolve_output("reel-abc123").unwrap();
        assert_eq!(found, Some(dir.path().join("reel-abc123.m4a")));
    }

    #[test]
    fn test_resolve_output_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new(dir.path().to_path_buf());
        assert_eq!(fetcher.resolve_output("reel-missing").unwrap(), None);
    }

    #[test]
    fn test_info_dump_field_fallbacks() {
        let json = r#"{"title": "Some Clip", "uploader": "someuser"}"#;
        let info: InfoDump = serde_json::from_str(json).unwrap();
        let guess = MetadataGuess {
            title: info.track.or(info.title),
            artist: info.artist.or(info.uploader),
        };
        assert_eq!(guess.title.as_deref(), Some("Some Clip"));
        assert_eq!(guess.artist.as_deref(), Some("someuser"));
    }
}
