//! Fixed-interval call pacing

use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};

/// Per-worker pacer releasing one call per interval
///
/// The first call is released immediately; every following call waits for the
/// next tick. With no interval configured calls run back to back.
pub struct Pacer {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    interval: Option<Duration>,
}

impl Pacer {
    /// Create a pacer ticking every `interval`
    ///
    /// `None` or a zero interval disables pacing.
    pub fn new(interval: Option<Duration>) -> Self {
        let limiter = interval
            .and_then(Quota::with_period)
            .map(RateLimiter::direct);

        Self {
            interval: limiter.as_ref().and(interval),
            limiter,
        }
    }

    /// Pacer that never waits
    pub fn unpaced() -> Self {
        Self::new(None)
    }

    /// Wait for the next tick
    pub async fn wait(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Whether pacing is active
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured tick interval
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::unpaced()
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("interval", &self.interval)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
