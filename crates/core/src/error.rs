use std::time::Duration;

/// Result alias that carries the custom [`NowPlayingError`] type.
pub type Result<T> = std::result::Result<T, NowPlayingError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum NowPlayingError {
    /// The playback source could not be polled (transport or auth failure).
    #[error("playback provider error: {0}")]
    Provider(String),
    /// Album art could not be downloaded.
    #[error("asset fetch failed: {0}")]
    Fetch(String),
    /// The card could not be rendered.
    #[error("card rendering failed: {0}")]
    Render(String),
    /// The destination platform (or the local governor) refused to publish.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    /// Any other publish failure.
    #[error("publish failed: {0}")]
    Publish(String),
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Free-form error raised from a plain message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a config file or API payload.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl NowPlayingError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn provider<T: Into<String>>(msg: T) -> Self {
        Self::Provider(msg.into())
    }

    pub fn fetch<T: Into<String>>(msg: T) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn render<T: Into<String>>(msg: T) -> Self {
        Self::Render(msg.into())
    }

    pub fn publish<T: Into<String>>(msg: T) -> Self {
        Self::Publish(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` for failures that must not trigger a text-only fallback.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!(" (retry after {}s)", wait.as_secs()),
        None => String::new(),
    }
}

impl From<&str> for NowPlayingError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for NowPlayingError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
