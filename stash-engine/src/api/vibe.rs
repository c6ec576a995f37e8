//! POST /analyze_vibe
//!
//! Generates a one-sentence mood summary over recently saved tracks. Every
//! failure mode degrades to a fixed string; this endpoint never errors.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;

/// POST /analyze_vibe request: "Song - Artist" descriptors, newest first
#[derive(Debug, Deserialize)]
pub struct AnalyzeVibeRequest {
    #[serde(default)]
    pub songs: Vec<String>,
}

/// POST /analyze_vibe response
#[derive(Debug, Serialize)]
pub struct VibeResponse {
    pub vibe: String,
}

/// POST /analyze_vibe
pub async fn analyze_vibe(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeVibeRequest>,
) -> Json<VibeResponse> {
    info!(songs = request.songs.len(), "Analyzing vibe");

    if request.songs.is_empty() {
        return Json(VibeResponse {
            vibe: "No music yet! Start stashing to find your vibe.".to_string(),
        });
    }

    let vibe = state.gemini.summarize_vibe(&request.songs).await;
    Json(VibeResponse { vibe })
}

/// Build vibe routes
pub fn vibe_routes() -> Router<AppState> {
    Router::new().route("/analyze_vibe", post(analyze_vibe))
}
