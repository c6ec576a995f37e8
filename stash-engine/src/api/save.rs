//! POST /save_track
//!
//! Files a recognized track into the user's Spotify library. With the
//! `"smart_sort"` playlist id, the track lands in a genre-named playlist
//! (`"Stash: <Genre>"`), created on first use; the genre label comes from a
//! one-word Gemini text generation and defaults to "Unknown" whenever the
//! model misbehaves.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::types::CatalogError;
use crate::AppState;

/// Sentinel playlist id requesting genre-based filing
const SMART_SORT_ID: &str = "smart_sort";

/// Playlist id historically meaning "just use Liked Songs"
const LIKED_SONGS_ID: &str = "1";

/// How many of the user's playlists to scan for an existing genre playlist
const PLAYLIST_SCAN_LIMIT: u8 = 50;

/// POST /save_track request
#[derive(Debug, Deserialize)]
pub struct SaveTrackRequest {
    /// User OAuth token (supplied per request; never stored)
    pub token: String,
    pub track_id: String,
    pub playlist_id: String,
}

/// POST /save_track response
#[derive(Debug, Serialize)]
pub struct SaveTrackResponse {
    pub success: bool,
    pub playlist_id: String,
    pub playlist_name: String,
    pub genre: String,
}

/// POST /save_track
pub async fn save_track(
    State(state): State<AppState>,
    Json(request): Json<SaveTrackRequest>,
) -> ApiResult<Json<SaveTrackResponse>> {
    info!(track_id = %request.track_id, playlist_id = %request.playlist_id, "Saving track");

    let track = state
        .spotify
        .track(&request.token, &request.track_id)
        .await
        .map_err(internal)?;

    // Genre always runs (it feeds analytics even outside smart sort)
    let genre = state
        .gemini
        .detect_genre(&track.name, &track.artist_name)
        .await;
    let smart_playlist_name = format!("Stash: {}", genre);

    let mut target_playlist_id = request.playlist_id.clone();
    if request.playlist_id == SMART_SORT_ID {
        let user_id = state
            .spotify
            .current_user_id(&request.token)
            .await
            .map_err(internal)?;
        let playlists = state
            .spotify
            .current_user_playlists(&request.token, PLAYLIST_SCAN_LIMIT)
            .await
            .map_err(internal)?;

        target_playlist_id = match playlists
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(&smart_playlist_name))
        {
            Some(existing) => {
                info!(name = %existing.name, "Found existing genre playlist");
                existing.id.clone()
            }
            None => {
                let created = state
                    .spotify
                    .create_private_playlist(&request.token, &user_id, &smart_playlist_name)
                    .await
                    .map_err(internal)?;
                info!(name = %created.name, "Created genre playlist");
                created.id
            }
        };
    }

    let mut playlist_name = "Liked Songs".to_string();
    if !target_playlist_id.is_empty() && target_playlist_id != LIKED_SONGS_ID {
        let track_uri = format!("spotify:track:{}", request.track_id);
        state
            .spotify
            .playlist_add_item(&request.token, &target_playlist_id, &track_uri)
            .await
            .map_err(internal)?;

        playlist_name = if request.playlist_id == SMART_SORT_ID {
            smart_playlist_name
        } else {
            // Name lookup is cosmetic; a lookup failure does not undo the add
            state
                .spotify
                .playlist(&request.token, &target_playlist_id)
                .await
                .map(|p| p.name)
                .unwrap_or_else(|_| "Selected Playlist".to_string())
        };
        info!(playlist = %playlist_name, "Track added to playlist");
    } else {
        state
            .spotify
            .save_to_liked(&request.token, &request.track_id)
            .await
            .map_err(internal)?;
        info!("Track added to Liked Songs");
    }

    Ok(Json(SaveTrackResponse {
        success: true,
        playlist_id: target_playlist_id,
        playlist_name,
        genre,
    }))
}

fn internal(e: CatalogError) -> ApiError {
    ApiError::Internal(e.to_string())
}

/// Build save-track routes
pub fn save_routes() -> Router<AppState> {
    Router::new().route("/save_track", post(save_track))
}
