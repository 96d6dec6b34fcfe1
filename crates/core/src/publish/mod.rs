use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use reqwest::{
    header::HeaderMap,
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::PublisherConfig, playback::PlaybackSnapshot, render::format_duration,
    NowPlayingError, Result,
};

/// Opaque id of uploaded media, valid for one post.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub String);

/// Id of a created post.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(pub String);

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for rendered cards.
///
/// Implementations fail with [`NowPlayingError::RateLimited`] when the
/// platform pushes back and [`NowPlayingError::Publish`] otherwise.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn upload_media(&self, png: Vec<u8>) -> Result<MediaHandle>;

    async fn create_post(&self, text: &str, media: Option<&MediaHandle>) -> Result<PostId>;
}

/// Builds the post body for a track.
pub fn compose_post_text(snapshot: &PlaybackSnapshot, hashtag: &str) -> String {
    let duration = format_duration(snapshot.duration_ms.unwrap_or(0));
    let mut text = format!(
        "🎵 Now Playing:\n{} - {}\nAlbum: {}\nDuration: {}",
        snapshot.title, snapshot.artist, snapshot.album, duration
    );
    if !hashtag.is_empty() {
        text.push(' ');
        text.push_str(hashtag);
    }
    text
}

/// X API v2 publisher authenticated with a user access token.
#[derive(Debug, Clone)]
pub struct XPublisher {
    client: Client,
    api_base: String,
    access_token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: IdOnly,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

impl XPublisher {
    pub fn new(config: &PublisherConfig, access_token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), config, access_token)
    }

    pub fn with_client(
        client: Client,
        config: &PublisherConfig,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    async fn read_id(&self, what: &str, response: Response) -> Result<String> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_from_headers(response.headers(), SystemTime::now());
            tracing::warn!(what, ?retry_after, "destination rate limit hit");
            return Err(NowPlayingError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|err| NowPlayingError::publish(format!("{what}: {err}")))?;
        if !status.is_success() {
            return Err(NowPlayingError::publish(format!(
                "{what} returned status {status}: {body}"
            )));
        }

        let envelope: DataEnvelope = serde_json::from_str(&body).map_err(|err| {
            NowPlayingError::publish(format!("{what}: unexpected response: {err}"))
        })?;
        Ok(envelope.data.id)
    }
}

#[async_trait]
impl Publisher for XPublisher {
    async fn upload_media(&self, png: Vec<u8>) -> Result<MediaHandle> {
        let part = Part::bytes(png)
            .file_name("now-playing.png")
            .mime_str("image/png")
            .map_err(|err| NowPlayingError::publish(err.to_string()))?;
        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", part);

        let response = self
            .client
            .post(format!("{}/2/media/upload", self.api_base))
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|err| NowPlayingError::publish(format!("media upload: {err}")))?;

        let id = self.read_id("media upload", response).await?;
        tracing::debug!(media_id = %id, "uploaded card");
        Ok(MediaHandle(id))
    }

    async fn create_post(&self, text: &str, media: Option<&MediaHandle>) -> Result<PostId> {
        let mut body = json!({ "text": text });
        if let Some(media) = media {
            body["media"] = json!({ "media_ids": [&media.0] });
        }

        let response = self
            .client
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| NowPlayingError::publish(format!("create post: {err}")))?;

        let id = self.read_id("create post", response).await?;
        Ok(PostId(id))
    }
}

/// Reads `x-rate-limit-reset` (epoch seconds), falling back to `retry-after`
/// (delta seconds).
pub fn retry_after_from_headers(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    if let Some(reset) = header_u64("x-rate-limit-reset") {
        let now = now.duration_since(UNIX_EPOCH).ok()?.as_secs();
        return Some(Duration::from_secs(reset.saturating_sub(now)));
    }
    header_u64("retry-after").map(Duration::from_secs)
}

/// Writes cards to a local directory instead of posting them.
#[derive(Debug)]
pub struct DryRunPublisher {
    dir: PathBuf,
    counter: AtomicU64,
}

impl DryRunPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn upload_media(&self, png: Vec<u8>) -> Result<MediaHandle> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("card-{}.png", self.next_id()));
        tokio::fs::write(&path, png)
            .await
            .map_err(|err| NowPlayingError::publish(format!("{}: {err}", path.display())))?;
        tracing::info!(path = %path.display(), "dry run: wrote card");
        Ok(MediaHandle(path.display().to_string()))
    }

    async fn create_post(&self, text: &str, media: Option<&MediaHandle>) -> Result<PostId> {
        let id = format!("dry-run-{}", self.next_id());
        tracing::info!(
            post_id = %id,
            media = media.map(|m| m.0.as_str()).unwrap_or("none"),
            "dry run post:\n{text}"
        );
        Ok(PostId(id))
    }
}
