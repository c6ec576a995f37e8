//! Spotify Web API client
//!
//! Covers both halves of the catalog contract: the app-credentialed search
//! used by the recognition pipeline, and the user-token library mutations
//! behind the save-track flow (playlists, Liked Songs).
//!
//! Broad search deliberately ranks by popularity instead of taking
//! Spotify's first result: free-text matching tends to surface covers,
//! sped-up edits, and remixes ahead of the canonical release.

use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{Catalog, CatalogError, CatalogTrack, SearchMode};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Timeout for Spotify API requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh the cached app token this long before it actually expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Broad-mode result window to rank by popularity
const BROAD_SEARCH_LIMIT: u8 = 5;

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    uri: String,
    #[serde(default)]
    popularity: u32,
    preview_url: Option<String>,
    external_urls: ExternalUrls,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: ApiAlbum,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

impl From<ApiTrack> for CatalogTrack {
    fn from(track: ApiTrack) -> Self {
        CatalogTrack {
            name: track.name,
            artist_name: track
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            uri: track.uri,
            external_url: track.external_urls.spotify.unwrap_or_default(),
            album_art_url: track
                .album
                .images
                .into_iter()
                .next()
                .map(|i| i.url)
                .unwrap_or_default(),
            popularity: track.popularity,
            preview_url: track.preview_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrivateUser {
    id: String,
}

/// Playlist id + name, as returned by list/create/details endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistSummary>,
}

// ============================================================================
// Client
// ============================================================================

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Spotify Web API client
///
/// App credentials are process-wide read-only state; the cached
/// client-credentials token is the only mutable field, guarded by an
/// `RwLock` that is never held across an upstream await.
pub struct SpotifyClient {
    http_client: Client,
    client_id: String,
    client_secret: String,
    api_url: String,
    token_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, CatalogError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id,
            client_secret,
            api_url: SPOTIFY_API_URL.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            token: RwLock::new(None),
        })
    }

    /// Get a client-credentials token, refreshing the cache when stale
    async fn app_token(&self) -> Result<String, CatalogError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Fetching Spotify client-credentials token");
        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if status == 400 || status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!(
                "Spotify rejected app credentials: {}",
                body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Token response: {}", e)))?;

        let access_token = token.access_token.clone();
        let lifetime = Duration::from_secs(token.expires_in)
            .saturating_sub(TOKEN_REFRESH_MARGIN);
        *self.token.write().await = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        });

        Ok(access_token)
    }

    /// Map a non-success response to a CatalogError
    async fn check(response: Response) -> Result<Response, CatalogError> {
        let status = response.status();
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), body));
        }
        Ok(response)
    }

    /// Run a track search with the app token
    async fn search(&self, query: &str, limit: u8) -> Result<Vec<CatalogTrack>, CatalogError> {
        let token = self.app_token().await?;

        debug!(query = %query, limit = limit, "Searching Spotify");
        let response = self
            .http_client
            .get(format!("{}/search", self.api_url))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("type", "track"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::Network(format!("Search request failed: {}", e)))?;

        let response = Self::check(response).await?;
        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Search response: {}", e)))?;

        Ok(search.tracks.items.into_iter().map(Into::into).collect())
    }

    // ------------------------------------------------------------------
    // User-token library operations (save-track flow)
    // ------------------------------------------------------------------

    /// Current user's id
    pub async fn current_user_id(&self, user_token: &str) -> Result<String, CatalogError> {
        let response = self
            .http_client
            .get(format!("{}/me", self.api_url))
            .bearer_auth(user_token)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        let user: PrivateUser = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("User response: {}", e)))?;
        Ok(user.id)
    }

    /// Track details by id
    pub async fn track(&self, user_token: &str, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        let response = self
            .http_client
            .get(format!("{}/tracks/{}", self.api_url, track_id))
            .bearer_auth(user_token)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        let track: ApiTrack = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Track response: {}", e)))?;
        Ok(track.into())
    }

    /// First page of the user's playlists
    pub async fn current_user_playlists(
        &self,
        user_token: &str,
        limit: u8,
    ) -> Result<Vec<PlaylistSummary>, CatalogError> {
        let response = self
            .http_client
            .get(format!("{}/me/playlists", self.api_url))
            .bearer_auth(user_token)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        let page: PlaylistPage = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Playlists response: {}", e)))?;
        Ok(page.items)
    }

    /// Create a private playlist for a user
    pub async fn create_private_playlist(
        &self,
        user_token: &str,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistSummary, CatalogError> {
        let response = self
            .http_client
            .post(format!("{}/users/{}/playlists", self.api_url, user_id))
            .bearer_auth(user_token)
            .json(&json!({ "name": name, "public": false }))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Create playlist response: {}", e)))
    }

    /// Add one track URI to a playlist
    pub async fn playlist_add_item(
        &self,
        user_token: &str,
        playlist_id: &str,
        track_uri: &str,
    ) -> Result<(), CatalogError> {
        let response = self
            .http_client
            .post(format!("{}/playlists/{}/tracks", self.api_url, playlist_id))
            .bearer_auth(user_token)
            .json(&json!({ "uris": [track_uri] }))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    /// Playlist details (name)
    pub async fn playlist(
        &self,
        user_token: &str,
        playlist_id: &str,
    ) -> Result<PlaylistSummary, CatalogError> {
        let response = self
            .http_client
            .get(format!("{}/playlists/{}", self.api_url, playlist_id))
            .bearer_auth(user_token)
            .query(&[("fields", "id,name")])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Playlist response: {}", e)))
    }

    /// Add a track to the user's Liked Songs
    pub async fn save_to_liked(
        &self,
        user_token: &str,
        track_id: &str,
    ) -> Result<(), CatalogError> {
        let response = self
            .http_client
            .put(format!("{}/me/tracks", self.api_url))
            .bearer_auth(user_token)
            .json(&json!({ "ids": [track_id] }))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Catalog for SpotifyClient {
    async fn resolve(
        &self,
        title: &str,
        artist: &str,
        mode: SearchMode,
    ) -> Result<CatalogTrack, CatalogError> {
        let (query, limit) = build_query(title, artist, mode);
        let results = self.search(&query, limit).await?;

        let best = match mode {
            SearchMode::Strict => results.into_iter().next(),
            SearchMode::Broad => pick_most_popular(results),
        };

        let Some(track) = best else {
            return Err(CatalogError::NotFound {
                title: title.to_string(),
                artist: artist.to_string(),
            });
        };

        info!(
            name = %track.name,
            artist = %track.artist_name,
            popularity = track.popularity,
            "Catalog match"
        );
        Ok(track)
    }
}

/// Build the search query string and result window for a mode
fn build_query(title: &str, artist: &str, mode: SearchMode) -> (String, u8) {
    match mode {
        SearchMode::Strict => (format!("track:\"{}\" artist:\"{}\"", title, artist), 1),
        SearchMode::Broad => (format!("{} {}", title, artist), BROAD_SEARCH_LIMIT),
    }
}

/// Select the most popular track, keeping catalog order on ties
///
/// Textual relevance alone surfaces covers and remixes; the canonical
/// release is almost always the most popular of the textual matches.
fn pick_most_popular(tracks: Vec<CatalogTrack>) -> Option<CatalogTrack> {
    let mut best: Option<CatalogTrack> = None;
    for track in tracks {
        match &best {
            // Strictly-greater keeps the first-seen item among ties
            Some(current) if track.popularity <= current.popularity => {}
            _ => best = Some(track),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str, popularity: u32) -> CatalogTrack {
        CatalogTrack {
            name: name.to_string(),
            artist_name: "Artist".to_string(),
            uri: format!("spotify:track:{}", name),
            external_url: String::new(),
            album_art_url: String::new(),
            popularity,
            preview_url: None,
        }
    }

    #[test]
    fn test_most_popular_wins() {
        let best = pick_most_popular(vec![track("cover", 40), track("canonical", 95)]).unwrap();
        assert_eq!(best.name, "canonical");
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let best = pick_most_popular(vec![
            track("low", 40),
            track("first-95", 95),
            track("second-95", 95),
        ])
        .unwrap();
        assert_eq!(best.name, "first-95");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let make = || vec![track("a", 40), track("b", 95), track("c", 95)];
        let first = pick_most_popular(make()).unwrap();
        let second = pick_most_popular(make()).unwrap();
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn test_empty_results() {
        assert!(pick_most_popular(vec![]).is_none());
    }

    #[test]
    fn test_query_building() {
        let (strict, limit) = build_query("Nightcall", "Kavinsky", SearchMode::Strict);
        assert_eq!(strict, "track:\"Nightcall\" artist:\"Kavinsky\"");
        assert_eq!(limit, 1);

        let (broad, limit) = build_query("Nightcall", "Kavinsky", SearchMode::Broad);
        assert_eq!(broad, "Nightcall Kavinsky");
        assert_eq!(limit, BROAD_SEARCH_LIMIT);
    }

    #[test]
    fn test_track_projection() {
        let json = r#"{
            "name": "Blinding Lights",
            "uri": "spotify:track:0VjIjW4GlUZAMYd2vXMi3b",
            "popularity": 92,
            "preview_url": null,
            "external_urls": {"spotify": "https://open.spotify.com/track/0VjIjW4GlUZAMYd2vXMi3b"},
            "artists": [{"name": "The Weeknd"}, {"name": "Someone Else"}],
            "album": {"images": [{"url": "https://i.scdn.co/image/abc"}]}
        }"#;
        let api: ApiTrack = serde_json::from_str(json).unwrap();
        let track: CatalogTrack = api.into();
        assert_eq!(track.artist_name, "The Weeknd");
        assert_eq!(track.album_art_url, "https://i.scdn.co/image/abc");
        assert_eq!(track.popularity, 92);
        assert!(track.preview_url.is_none());
    }
}
