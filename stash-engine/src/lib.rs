//! stash-engine library interface
//!
//! Exposes the application state, router assembly, and the recognition
//! pipeline components for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::services::{GeminiClient, Recognizer, SpotifyClient};

/// Application state shared across handlers
///
/// All fields are read-only after startup; per-request state lives on the
/// stack of each pipeline invocation.
#[derive(Clone)]
pub struct AppState {
    /// Recognition pipeline orchestrator
    pub recognizer: Arc<Recognizer>,
    /// Spotify client (search + user library operations)
    pub spotify: Arc<SpotifyClient>,
    /// Gemini client (genre labels, vibe summaries)
    pub gemini: Arc<GeminiClient>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        recognizer: Arc<Recognizer>,
        spotify: Arc<SpotifyClient>,
        gemini: Arc<GeminiClient>,
    ) -> Self {
        Self {
            recognizer,
            spotify,
            gemini,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::recognize_routes())
        .merge(api::save_routes())
        .merge(api::vibe_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
