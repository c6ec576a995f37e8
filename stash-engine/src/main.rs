//! stash-engine - song recognition microservice
//!
//! Identifies the song in a short social-media video clip and locates the
//! canonical track on Spotify: embedded metadata first, audio download plus
//! acoustic identification only when the cheap path is inconclusive.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stash_engine::config::{EngineConfig, IdentifyStrategy};
use stash_engine::services::{AuddClient, GeminiClient, Recognizer, RecognizerConfig, SpotifyClient, YtDlpFetcher};
use stash_engine::types::AcousticIdentifier;
use stash_engine::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is a development convenience; real deployments set the
    // environment directly
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting stash-engine (song recognition) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Credentials resolve once here; a missing key aborts startup instead
    // of surfacing as per-request failures later.
    let config = EngineConfig::resolve()?;

    let spotify = Arc::new(SpotifyClient::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    )?);
    let gemini = Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);

    let identifier: Arc<dyn AcousticIdentifier> = match config.strategy {
        IdentifyStrategy::AiTranscription => gemini.clone(),
        IdentifyStrategy::Fingerprint => {
            // Presence was validated during config resolution
            let token = config.audd_api_token.clone().ok_or_else(|| {
                anyhow::anyhow!("Fingerprint strategy requires an AudD API token")
            })?;
            Arc::new(AuddClient::new(token)?)
        }
    };
    info!(strategy = identifier.name(), "Acoustic identifier selected");

    let media = Arc::new(YtDlpFetcher::new(config.scratch_dir.clone()));
    let recognizer = Arc::new(Recognizer::new(
        media,
        identifier,
        spotify.clone(),
        RecognizerConfig::default(),
    ));

    let state = AppState::new(recognizer, spotify, gemini);
    let app = stash_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
