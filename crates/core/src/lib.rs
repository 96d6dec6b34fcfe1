//! Core library for the now-playing card publisher.
//!
//! The crate watches a listener's current track, renders a "now playing"
//! card for it and publishes the card as a social post. Each module owns one
//! subsystem: playback polling, palette analysis, card rendering, publish
//! rate governance and the scheduling loop that ties them together. External
//! services sit behind the [`PlaybackSource`], [`Publisher`] and
//! [`AssetFetcher`] traits so the loop can be driven by fakes in tests.

pub mod analysis;
pub mod assets;
pub mod config;
pub mod error;
pub mod governor;
pub mod playback;
pub mod publish;
pub mod render;
pub mod scheduler;

pub use analysis::{extract_palette, Palette, Rgb};
pub use assets::{AssetFetcher, FileAssetFetcher, HttpAssetFetcher};
pub use config::AppConfig;
pub use error::{NowPlayingError, Result};
pub use governor::{DenialCause, PublishDecision, RateGovernor};
pub use playback::{PlaybackSnapshot, PlaybackSource, SpotifyPlaybackSource};
pub use publish::{DryRunPublisher, Publisher, XPublisher};
pub use render::{CardRenderer, RenderCard, RenderOutcome, RenderedCard};
pub use scheduler::{PollScheduler, SchedulerState, Step};
