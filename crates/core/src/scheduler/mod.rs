//! Poll/publish control loop.
//!
//! One [`PollScheduler`] watches one account. Each cycle polls the playback
//! source, decides whether the track is new, renders and publishes when it
//! is, and returns how long to sleep before the next cycle.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    assets::AssetFetcher,
    config::PollConfig,
    governor::{PublishDecision, RateGovernor},
    playback::{PlaybackSnapshot, PlaybackSource},
    publish::{compose_post_text, PostId, Publisher},
    render::{RenderCard, RenderOutcome},
    NowPlayingError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing playing.
    #[default]
    Idle,
    /// A timed track is known.
    Tracking,
    /// Recovering from an error or a rate-limit denial.
    Cooldown,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub state: SchedulerState,
    pub sleep: Duration,
}

pub struct PollScheduler {
    source: Arc<dyn PlaybackSource>,
    publisher: Arc<dyn Publisher>,
    fetcher: Arc<dyn AssetFetcher>,
    renderer: Arc<dyn RenderCard>,
    governor: RateGovernor,
    poll: PollConfig,
    hashtag: String,
    state: SchedulerState,
    last_published: Option<String>,
    abandoned: Option<String>,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn PlaybackSource>,
        publisher: Arc<dyn Publisher>,
        fetcher: Arc<dyn AssetFetcher>,
        renderer: Arc<dyn RenderCard>,
        governor: RateGovernor,
    ) -> Self {
        Self {
            source,
            publisher,
            fetcher,
            renderer,
            governor,
            poll: PollConfig::default(),
            hashtag: "#listening".to_string(),
            state: SchedulerState::Idle,
            last_published: None,
            abandoned: None,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_hashtag(mut self, hashtag: impl Into<String>) -> Self {
        self.hashtag = hashtag.into();
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_published(&self) -> Option<&str> {
        self.last_published.as_deref()
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Polls until `cancel` fires. Cancellation interrupts any sleep and
    /// performs no further work.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!("now-playing scheduler started");
        while !cancel.is_cancelled() {
            let step = self.poll_once().await;
            tracing::debug!(state = ?step.state, sleep_secs = step.sleep.as_secs(), "sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(step.sleep) => {}
            }
        }
        tracing::info!("now-playing scheduler stopped");
    }

    /// Runs one poll cycle and returns the resulting state and sleep.
    pub async fn poll_once(&mut self) -> Step {
        let step = match self.source.current_playback().await {
            Err(err) => {
                tracing::warn!(error = %err, "playback poll failed");
                self.cooldown(self.poll.error_interval())
            }
            Ok(None) => {
                tracing::debug!("nothing playing");
                self.idle()
            }
            Ok(Some(snapshot)) => self.on_snapshot(snapshot).await,
        };
        self.state = step.state;
        step
    }

    async fn on_snapshot(&mut self, snapshot: PlaybackSnapshot) -> Step {
        let Some(remaining) = snapshot.remaining() else {
            tracing::debug!(track = %snapshot.track_id, "track has no usable duration");
            return self.idle();
        };
        let until_next = remaining + self.poll.track_end_buffer();

        if self.last_published.as_deref() == Some(snapshot.track_id.as_str()) {
            tracing::debug!(track = %snapshot.track_id, "already published");
            return tracking(until_next);
        }
        if self.abandoned.as_deref() == Some(snapshot.track_id.as_str()) {
            tracing::debug!(
                track = %snapshot.track_id,
                "publish failed earlier, waiting for next track"
            );
            return tracking(until_next);
        }
        self.abandoned = None;

        if let PublishDecision::Denied {
            cause,
            reason,
            retry_after,
        } = self.governor.may_publish()
        {
            let mut wait = retry_after;
            if cause.is_cap() {
                self.governor.record_error();
                wait = wait.max(self.governor.cooldown_remaining());
            }
            tracing::info!(
                track = %snapshot.track_id,
                %reason,
                wait_secs = wait.as_secs(),
                "publish deferred by governor"
            );
            return self.cooldown(wait);
        }

        tracing::info!(
            track = %snapshot.track_id,
            title = %snapshot.title,
            artist = %snapshot.artist,
            "new track detected"
        );
        let text = compose_post_text(&snapshot, &self.hashtag);
        let outcome = self.render(&snapshot).await;

        match self.publish(&text, outcome).await {
            Ok(post) => {
                tracing::info!(track = %snapshot.track_id, post = %post, "published");
                self.governor.record_success();
                self.last_published = Some(snapshot.track_id);
                tracking(until_next)
            }
            Err(NowPlayingError::RateLimited { retry_after }) => {
                self.governor.record_error();
                let wait = retry_after
                    .unwrap_or_default()
                    .max(self.governor.cooldown_remaining());
                tracing::warn!(
                    track = %snapshot.track_id,
                    wait_secs = wait.as_secs(),
                    "rate limited by destination"
                );
                self.cooldown(wait)
            }
            Err(err) => {
                self.governor.record_error();
                tracing::error!(track = %snapshot.track_id, error = %err, "publish failed");
                self.abandoned = Some(snapshot.track_id);
                self.cooldown(self.poll.error_interval())
            }
        }
    }

    /// Fetches art and renders the card on a blocking thread. Every failure
    /// collapses into [`RenderOutcome::RenderFailed`].
    async fn render(&self, snapshot: &PlaybackSnapshot) -> RenderOutcome {
        let Some(url) = snapshot.art_url.as_deref() else {
            return RenderOutcome::RenderFailed("track has no album art".to_string());
        };
        let art = match self.fetcher.fetch_bytes(url).await {
            Ok(art) => art,
            Err(err) => {
                tracing::warn!(%url, error = %err, "album art unavailable");
                return RenderOutcome::RenderFailed(err.to_string());
            }
        };

        let renderer = Arc::clone(&self.renderer);
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || renderer.render_card(&snapshot, &art))
            .await
            .unwrap_or_else(|err| {
                RenderOutcome::RenderFailed(format!("render task failed: {err}"))
            })
    }

    /// Posts with the card when there is one, falling back to text only if
    /// the media path fails for any reason but rate limiting.
    async fn publish(&self, text: &str, outcome: RenderOutcome) -> Result<PostId> {
        let card = match outcome {
            RenderOutcome::Rendered(card) => card,
            RenderOutcome::RenderFailed(reason) => {
                tracing::info!(%reason, "posting without card");
                return self.publisher.create_post(text, None).await;
            }
        };

        let media_post = match self.publisher.upload_media(card.into_bytes()).await {
            Ok(media) => self.publisher.create_post(text, Some(&media)).await,
            Err(err) => Err(err),
        };
        match media_post {
            Ok(post) => Ok(post),
            Err(err) if err.is_rate_limited() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "media post failed, posting text only");
                self.publisher.create_post(text, None).await
            }
        }
    }

    fn idle(&self) -> Step {
        Step {
            state: SchedulerState::Idle,
            sleep: self.poll.idle_interval(),
        }
    }

    fn cooldown(&self, sleep: Duration) -> Step {
        Step {
            state: SchedulerState::Cooldown,
            sleep,
        }
    }
}

fn tracking(sleep: Duration) -> Step {
    Step {
        state: SchedulerState::Tracking,
        sleep,
    }
}
