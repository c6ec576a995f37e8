//! Configuration file loading and credential resolution
//!
//! Credentials for upstream services are resolved once at startup with
//! ENV → TOML priority. A missing required credential is a startup
//! configuration error, never a per-request failure.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// TOML configuration file contents (`~/.config/stash/stash-engine.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Google Gemini API key
    pub gemini_api_key: Option<String>,
    /// Spotify application client id
    pub spotify_client_id: Option<String>,
    /// Spotify application client secret
    pub spotify_client_secret: Option<String>,
    /// AudD fingerprint API token (only needed for the fingerprint strategy)
    pub audd_api_token: Option<String>,
    /// Directory for scratch audio downloads (defaults to the OS temp dir)
    pub scratch_dir: Option<String>,
    /// HTTP listen port
    pub port: Option<u16>,
    /// Acoustic identification strategy: "ai" or "fingerprint"
    pub identify_strategy: Option<String>,
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("stash").join("stash-engine.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load the TOML config file, returning defaults when the file is absent
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Resolve one credential with ENV → TOML priority
///
/// Warns when the value is present in both sources (potential
/// misconfiguration) and logs which source won.
pub fn resolve_credential(
    name: &str,
    env_var: &str,
    toml_value: Option<&String>,
) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment and TOML. Using environment (highest priority).",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable {}", name, env_var);
        return Some(value);
    }
    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", name);
        return Some(value.clone());
    }
    None
}

/// Resolve a credential that must be present, with a setup hint on failure
pub fn require_credential(
    name: &str,
    env_var: &str,
    toml_value: Option<&String>,
) -> Result<String> {
    resolve_credential(name, env_var, toml_value).ok_or_else(|| {
        Error::Config(format!(
            "{} not configured. Please configure using one of:\n\
             1. Environment: {}=your-key-here\n\
             2. TOML config: ~/.config/stash/stash-engine.toml",
            name, env_var
        ))
    })
}

/// Validate a key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let config = load_toml_config(Path::new("/nonexistent/stash-engine.toml")).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stash-engine.toml");
        std::fs::write(
            &path,
            "gemini_api_key = \"g-key\"\nspotify_client_id = \"s-id\"\nport = 8000\n",
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(config.spotify_client_id.as_deref(), Some("s-id"));
        assert_eq!(config.port, Some(8000));
        assert!(config.audd_api_token.is_none());
    }

    #[test]
    fn test_toml_credential_resolution() {
        let value = "from-toml".to_string();
        // Env var intentionally unset for this name
        let resolved =
            resolve_credential("Test key", "STASH_TEST_KEY_UNSET_XYZ", Some(&value));
        assert_eq!(resolved.as_deref(), Some("from-toml"));
    }

    #[test]
    fn test_required_credential_missing() {
        let result = require_credential("Test key", "STASH_TEST_KEY_UNSET_XYZ", None);
        assert!(result.is_err());
    }
}
