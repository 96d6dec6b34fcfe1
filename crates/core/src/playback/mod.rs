use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{config::SpotifyConfig, NowPlayingError, Result};

/// One poll's view of the currently playing track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: Option<u64>,
    pub progress_ms: Option<u64>,
    pub art_url: Option<String>,
}

impl PlaybackSnapshot {
    /// Time left until the track ends, or `None` when the source gave no
    /// usable duration. Progress past the end saturates to zero.
    pub fn remaining(&self) -> Option<Duration> {
        let duration = self.duration_ms.filter(|d| *d > 0)?;
        let progress = self.progress_ms.unwrap_or(0);
        Some(Duration::from_millis(duration.saturating_sub(progress)))
    }
}

/// Source of the user's current playback state.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Returns `None` when nothing is playing.
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>>;
}

/// Spotify Web API client for `GET /v1/me/player`.
///
/// Token acquisition and refresh are handled outside this crate; the client
/// is given an already-issued user access token.
#[derive(Debug, Clone)]
pub struct SpotifyPlaybackSource {
    client: Client,
    api_base: String,
    access_token: String,
    timeout: Duration,
}

impl SpotifyPlaybackSource {
    pub fn new(config: &SpotifyConfig, access_token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), config, access_token)
    }

    /// Useful for sharing a connection pool with the other HTTP adapters.
    pub fn with_client(
        client: Client,
        config: &SpotifyConfig,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl PlaybackSource for SpotifyPlaybackSource {
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>> {
        let url = format!("{}/v1/me/player", self.api_base);
        tracing::debug!(%url, "polling playback state");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| NowPlayingError::provider(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(NowPlayingError::provider(format!(
                "playback API returned status: {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| NowPlayingError::provider(err.to_string()))?;
        parse_player_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    progress_ms: Option<u64>,
    item: Option<PlayerItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerItem {
    id: Option<String>,
    name: String,
    duration_ms: Option<u64>,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    album: Option<PlayerAlbum>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayerAlbum {
    name: String,
    #[serde(default)]
    images: Vec<AlbumImage>,
}

#[derive(Debug, Deserialize)]
struct AlbumImage {
    url: String,
}

/// Maps a `/v1/me/player` body to a snapshot. Ads, episodes without ids and
/// empty players map to `None`.
pub fn parse_player_response(body: &str) -> Result<Option<PlaybackSnapshot>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let response: PlayerResponse = serde_json::from_str(body)
        .map_err(|err| NowPlayingError::provider(format!("malformed playback payload: {err}")))?;

    let Some(item) = response.item else {
        return Ok(None);
    };
    let Some(track_id) = item.id else {
        return Ok(None);
    };

    let artist = item
        .artists
        .into_iter()
        .next()
        .map(|a| a.name)
        .unwrap_or_default();
    let (album, art_url) = match item.album {
        Some(album) => (album.name, album.images.into_iter().next().map(|i| i.url)),
        None => (String::new(), None),
    };

    Ok(Some(PlaybackSnapshot {
        track_id,
        title: item.name,
        artist,
        album,
        duration_ms: item.duration_ms,
        progress_ms: response.progress_ms,
        art_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: &str = r#"{
        "is_playing": true,
        "progress_ms": 30500,
        "currently_playing_type": "track",
        "item": {
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "duration_ms": 213573,
            "artists": [{ "name": "Rick Astley" }, { "name": "Someone Else" }],
            "album": {
                "name": "Whenever You Need Somebody",
                "images": [
                    { "url": "https://i.scdn.co/image/large", "width": 640, "height": 640 },
                    { "url": "https://i.scdn.co/image/small", "width": 64, "height": 64 }
                ]
            }
        }
    }"#;

    #[test]
    fn maps_player_payload() {
        let snapshot = parse_player_response(PLAYING).unwrap().unwrap();
        assert_eq!(snapshot.track_id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(snapshot.artist, "Rick Astley");
        assert_eq!(snapshot.album, "Whenever You Need Somebody");
        assert_eq!(snapshot.art_url.as_deref(), Some("https://i.scdn.co/image/large"));
        assert_eq!(snapshot.remaining(), Some(Duration::from_millis(183_073)));
    }

    #[test]
    fn empty_player_is_nothing_playing() {
        assert_eq!(parse_player_response("").unwrap(), None);
        assert_eq!(
            parse_player_response(r#"{ "is_playing": false, "item": null }"#).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_payload_is_provider_error() {
        let err = parse_player_response("{ not json").unwrap_err();
        assert!(matches!(err, NowPlayingError::Provider(_)));
    }

    #[test]
    fn remaining_handles_missing_and_overrun_timing() {
        let mut snapshot = parse_player_response(PLAYING).unwrap().unwrap();
        snapshot.progress_ms = Some(300_000);
        assert_eq!(snapshot.remaining(), Some(Duration::ZERO));

        snapshot.duration_ms = Some(0);
        assert_eq!(snapshot.remaining(), None);

        snapshot.duration_ms = None;
        assert_eq!(snapshot.remaining(), None);
    }
}
