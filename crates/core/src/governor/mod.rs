use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

use crate::config::GovernorConfig;

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

const BACKOFF_BASE_SECS: u64 = 15;
const BACKOFF_MAX_SECS: u64 = 900;

/// Cooldown required after `consecutive_errors` failures: `min(15 * 2^n, 900)`
/// seconds.
pub fn backoff_wait(consecutive_errors: u32) -> Duration {
    let factor = 1u64.checked_shl(consecutive_errors).unwrap_or(u64::MAX);
    let secs = BACKOFF_BASE_SECS
        .saturating_mul(factor)
        .min(BACKOFF_MAX_SECS);
    Duration::from_secs(secs)
}

/// Which limit held a publish back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialCause {
    HourlyCap,
    DailyCap,
    /// Still inside the backoff window of an earlier error.
    Cooldown,
}

impl DenialCause {
    /// Volume caps count as rate limiting; a cooldown denial is the
    /// consequence of an error already recorded.
    pub fn is_cap(self) -> bool {
        matches!(self, Self::HourlyCap | Self::DailyCap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    Allowed,
    Denied {
        cause: DenialCause,
        reason: String,
        retry_after: Duration,
    },
}

impl PublishDecision {
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason, .. } => Some(reason),
        }
    }

    pub fn cause(&self) -> Option<DenialCause> {
        match self {
            Self::Allowed => None,
            Self::Denied { cause, .. } => Some(*cause),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub last_error_time: Option<Instant>,
    pub consecutive_errors: u32,
}

/// Bounded, time-ordered publish timestamps covering one window span.
#[derive(Debug, Clone)]
struct RateWindow {
    span: Duration,
    cap: usize,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(span: Duration, cap: usize) -> Self {
        Self {
            span,
            cap,
            stamps: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.span {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_full(&self) -> bool {
        self.stamps.len() >= self.cap
    }

    fn push(&mut self, now: Instant) {
        self.stamps.push_back(now);
        while self.stamps.len() > self.cap {
            self.stamps.pop_front();
        }
    }

    /// Time until the oldest entry leaves the window.
    fn until_slot_frees(&self, now: Instant) -> Duration {
        self.stamps
            .front()
            .map(|oldest| (*oldest + self.span).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Publish-volume and failure-backoff bookkeeping for one account.
#[derive(Debug, Clone)]
pub struct RateGovernor {
    hourly: RateWindow,
    daily: RateWindow,
    backoff: BackoffState,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(&GovernorConfig::default())
    }
}

impl RateGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            hourly: RateWindow::new(HOUR, config.max_posts_per_hour),
            daily: RateWindow::new(DAY, config.max_posts_per_day),
            backoff: BackoffState::default(),
        }
    }

    pub fn backoff(&self) -> BackoffState {
        self.backoff
    }

    pub fn posts_last_hour(&self) -> usize {
        self.hourly.stamps.len()
    }

    pub fn posts_last_day(&self) -> usize {
        self.daily.stamps.len()
    }

    pub fn may_publish(&mut self) -> PublishDecision {
        let now = Instant::now();
        self.hourly.evict(now);
        self.daily.evict(now);

        if self.hourly.is_full() {
            return PublishDecision::Denied {
                cause: DenialCause::HourlyCap,
                reason: "hourly limit reached".to_string(),
                retry_after: self.hourly.until_slot_frees(now),
            };
        }
        if self.daily.is_full() {
            return PublishDecision::Denied {
                cause: DenialCause::DailyCap,
                reason: "daily limit reached".to_string(),
                retry_after: self.daily.until_slot_frees(now),
            };
        }

        let remaining = self.cooldown_remaining_at(now);
        if !remaining.is_zero() {
            return PublishDecision::Denied {
                cause: DenialCause::Cooldown,
                reason: format!(
                    "cooling down after {} consecutive errors ({}s left)",
                    self.backoff.consecutive_errors,
                    remaining.as_secs()
                ),
                retry_after: remaining,
            };
        }
        PublishDecision::Allowed
    }

    pub fn record_success(&mut self) {
        let now = Instant::now();
        self.hourly.push(now);
        self.daily.push(now);
        self.backoff = BackoffState::default();
        tracing::debug!(
            hourly = self.hourly.stamps.len(),
            daily = self.daily.stamps.len(),
            "publish recorded"
        );
    }

    pub fn record_error(&mut self) {
        self.backoff.last_error_time = Some(Instant::now());
        self.backoff.consecutive_errors = self.backoff.consecutive_errors.saturating_add(1);
        tracing::debug!(
            consecutive_errors = self.backoff.consecutive_errors,
            wait_secs = backoff_wait(self.backoff.consecutive_errors).as_secs(),
            "publish error recorded"
        );
    }

    /// Remaining error cooldown; zero when publishing is not held back by
    /// backoff.
    pub fn cooldown_remaining(&self) -> Duration {
        self.cooldown_remaining_at(Instant::now())
    }

    fn cooldown_remaining_at(&self, now: Instant) -> Duration {
        let Some(last_error) = self.backoff.last_error_time else {
            return Duration::ZERO;
        };
        let wait = backoff_wait(self.backoff.consecutive_errors);
        wait.saturating_sub(now.saturating_duration_since(last_error))
    }
}
