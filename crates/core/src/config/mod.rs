use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{NowPlayingError, Result};

/// Environment variable holding the Spotify user access token.
pub const SPOTIFY_TOKEN_ENV: &str = "SPOTIFY_ACCESS_TOKEN";
/// Environment variable holding the X user-context access token.
pub const X_TOKEN_ENV: &str = "X_ACCESS_TOKEN";

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub poll: PollConfig,
    pub governor: GovernorConfig,
    pub card: CardConfig,
    pub spotify: SpotifyConfig,
    pub publisher: PublisherConfig,
}

impl AppConfig {
    /// Loads a JSON configuration file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            NowPlayingError::config(format!("cannot read `{}`: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.card.width == 0 || self.card.height == 0 {
            return Err(NowPlayingError::config("card dimensions must be non-zero"));
        }
        if self.card.palette_size == 0 {
            return Err(NowPlayingError::config("palette_size must be at least 1"));
        }
        if self.governor.max_posts_per_hour == 0 || self.governor.max_posts_per_day == 0 {
            return Err(NowPlayingError::config("publish caps must be at least 1"));
        }
        Ok(())
    }
}

/// Sleep intervals used by the poll scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Wait after a poll that found nothing playing.
    pub idle_interval_secs: u64,
    /// Wait after a provider or publish error.
    pub error_interval_secs: u64,
    /// Extra time added past the end of the current track.
    pub track_end_buffer_secs: u64,
}

impl PollConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn error_interval(&self) -> Duration {
        Duration::from_secs(self.error_interval_secs)
    }

    pub fn track_end_buffer(&self) -> Duration {
        Duration::from_secs(self.track_end_buffer_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 60,
            error_interval_secs: 60,
            track_end_buffer_secs: 2,
        }
    }
}

/// Publish caps enforced by [`crate::RateGovernor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub max_posts_per_hour: usize,
    pub max_posts_per_day: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_posts_per_hour: 50,
            max_posts_per_day: 500,
        }
    }
}

/// Canvas and typography settings for the card renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    pub width: u32,
    pub height: u32,
    pub palette_size: usize,
    pub regular_font: String,
    pub bold_font: String,
    /// Fixes the decorative overlay layout when set.
    pub overlay_seed: Option<u64>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 630,
            palette_size: 4,
            regular_font: "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string(),
            bold_font: "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string(),
            overlay_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.spotify.com".to_string(),
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
    /// Appended to every post.
    pub hashtag: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.com".to_string(),
            request_timeout_secs: 30,
            hashtag: "#listening".to_string(),
        }
    }
}

/// Reads a required credential from the environment.
pub fn credential_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(NowPlayingError::config(format!(
            "environment variable {var} is not set"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.poll.idle_interval(), Duration::from_secs(60));
        assert_eq!(config.poll.error_interval(), Duration::from_secs(60));
        assert_eq!(config.governor.max_posts_per_hour, 50);
        assert_eq!(config.governor.max_posts_per_day, 500);
        assert_eq!((config.card.width, config.card.height), (1200, 630));
        assert_eq!(config.publisher.hashtag, "#listening");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "governor": { "max_posts_per_hour": 5 } }"#).unwrap();
        assert_eq!(config.governor.max_posts_per_hour, 5);
        assert_eq!(config.governor.max_posts_per_day, 500);
        assert_eq!(config.poll.track_end_buffer_secs, 2);
    }

    #[test]
    fn printed_config_loads_back() {
        let mut config = AppConfig::default();
        config.card.overlay_seed = Some(9);
        config.publisher.hashtag = "#nowplaying".to_string();

        let json = serde_json::to_string_pretty(&config).unwrap();
        let loaded: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.card.overlay_seed, Some(9));
        assert_eq!(loaded.publisher.hashtag, "#nowplaying");
        assert_eq!(loaded.spotify.api_base, config.spotify.api_base);
    }

    #[test]
    fn rejects_zero_caps() {
        let mut config = AppConfig::default();
        config.governor.max_posts_per_day = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("caps"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = AppConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, NowPlayingError::Config(_)));
    }
}
