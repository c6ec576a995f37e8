//! Configuration resolution for stash-engine
//!
//! Credentials and tunables resolve with ENV → TOML priority, once at
//! startup. Missing required credentials abort startup with a configuration
//! error rather than failing individual requests later.

use stash_common::config::{
    default_config_path, load_toml_config, require_credential, resolve_credential,
};
use stash_common::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Default HTTP listen port
const DEFAULT_PORT: u16 = 8000;

/// Acoustic identification strategy, chosen at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyStrategy {
    /// Upload to Gemini, poll until ready, prompt for track/artist JSON
    AiTranscription,
    /// One-call fingerprint match against AudD
    Fingerprint,
}

impl FromStr for IdentifyStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" | "ai_transcription" | "gemini" => Ok(IdentifyStrategy::AiTranscription),
            "fingerprint" | "audd" => Ok(IdentifyStrategy::Fingerprint),
            other => Err(Error::Config(format!(
                "Unknown identify strategy {:?} (expected \"ai\" or \"fingerprint\")",
                other
            ))),
        }
    }
}

/// Resolved service configuration, read-only after startup
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gemini_api_key: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    /// Only required when `strategy` is `Fingerprint`
    pub audd_api_token: Option<String>,
    pub scratch_dir: PathBuf,
    pub port: u16,
    pub strategy: IdentifyStrategy,
}

impl EngineConfig {
    /// Resolve configuration from ENV → TOML
    pub fn resolve() -> Result<Self> {
        let toml_config = match default_config_path() {
            Ok(path) => load_toml_config(&path)?,
            Err(_) => Default::default(),
        };

        let gemini_api_key = require_credential(
            "Gemini API key",
            "GEMINI_API_KEY",
            toml_config.gemini_api_key.as_ref(),
        )?;
        let spotify_client_id = require_credential(
            "Spotify client id",
            "SPOTIFY_CLIENT_ID",
            toml_config.spotify_client_id.as_ref(),
        )?;
        let spotify_client_secret = require_credential(
            "Spotify client secret",
            "SPOTIFY_CLIENT_SECRET",
            toml_config.spotify_client_secret.as_ref(),
        )?;
        let audd_api_token = resolve_credential(
            "AudD API token",
            "AUDD_API_TOKEN",
            toml_config.audd_api_token.as_ref(),
        );

        let strategy = match resolve_credential(
            "Identify strategy",
            "STASH_IDENTIFY_STRATEGY",
            toml_config.identify_strategy.as_ref(),
        ) {
            Some(value) => value.parse()?,
            None => IdentifyStrategy::AiTranscription,
        };

        if strategy == IdentifyStrategy::Fingerprint && audd_api_token.is_none() {
            return Err(Error::Config(
                "Fingerprint strategy selected but AudD API token not configured \
                 (AUDD_API_TOKEN)"
                    .to_string(),
            ));
        }

        let scratch_dir = std::env::var("STASH_SCRATCH_DIR")
            .ok()
            .or(toml_config.scratch_dir)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let port = match std::env::var("STASH_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("Invalid STASH_PORT: {:?}", value)))?,
            Err(_) => toml_config.port.unwrap_or(DEFAULT_PORT),
        };

        info!(
            strategy = ?strategy,
            scratch_dir = %scratch_dir.display(),
            port = port,
            "Configuration resolved"
        );

        Ok(Self {
            gemini_api_key,
            spotify_client_id,
            spotify_client_secret,
            audd_api_token,
            scratch_dir,
            port,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "ai".parse::<IdentifyStrategy>().unwrap(),
            IdentifyStrategy::AiTranscription
        );
        assert_eq!(
            "Fingerprint".parse::<IdentifyStrategy>().unwrap(),
            IdentifyStrategy::Fingerprint
        );
        assert_eq!(
            "audd".parse::<IdentifyStrategy>().unwrap(),
            IdentifyStrategy::Fingerprint
        );
        assert!("shazam".parse::<IdentifyStrategy>().is_err());
    }
}
