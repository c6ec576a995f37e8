//! POST /recognize
//!
//! Runs the recognition pipeline for one source URL. A catalog miss after a
//! successful identification is an expected business outcome and returns
//! HTTP 200 with `success: false`; fatal pipeline failures map to HTTP 500
//! with a stable reason code.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::types::{CandidateSource, CatalogTrack, FailureReason, RecognitionOutcome};
use crate::AppState;

/// POST /recognize request
#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub url: String,
}

/// Successful recognition body (wire-compatible with historical clients)
#[derive(Debug, Serialize)]
struct MatchedBody {
    success: bool,
    track: String,
    artist: String,
    album_art: String,
    spotify_uri: String,
    spotify_url: String,
    preview_url: Option<String>,
    confidence: f32,
    source: CandidateSource,
}

impl MatchedBody {
    fn new(track: CatalogTrack, confidence: f32, source: CandidateSource) -> Self {
        Self {
            success: true,
            track: track.name,
            artist: track.artist_name,
            album_art: track.album_art_url,
            spotify_uri: track.uri,
            spotify_url: track.external_url,
            preview_url: track.preview_url,
            confidence,
            source,
        }
    }
}

/// Catalog-miss body: HTTP 200, `success: false`
#[derive(Debug, Serialize)]
struct UnmatchedBody {
    success: bool,
    reason: FailureReason,
    error: String,
}

/// POST /recognize
pub async fn recognize(
    State(state): State<AppState>,
    Json(request): Json<RecognizeRequest>,
) -> ApiResult<Response> {
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".to_string()));
    }

    match state.recognizer.recognize(&request.url).await {
        RecognitionOutcome::Matched {
            track,
            confidence,
            source,
        } => Ok(Json(MatchedBody::new(track, confidence, source)).into_response()),

        RecognitionOutcome::Unmatched {
            reason: reason @ FailureReason::NotInCatalog,
            detail,
        } => Ok(Json(UnmatchedBody {
            success: false,
            reason,
            error: detail,
        })
        .into_response()),

        RecognitionOutcome::Unmatched { reason, detail } => {
            Err(ApiError::Pipeline { reason, detail })
        }
    }
}

/// Build recognition routes
pub fn recognize_routes() -> Router<AppState> {
    Router::new().route("/recognize", post(recognize))
}
