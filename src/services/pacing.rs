use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Static per-provider call spacing.
///
/// Every remote call site awaits [`Pacer::wait`] first, so consecutive calls
/// are at least `delay` apart. This is a fixed policy, not adaptive backoff.
/// A zero delay disables pacing entirely.
#[derive(Clone)]
pub struct Pacer {
    delay: Duration,
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        // A burst of one cell means every call after the first waits a full period.
        let limiter = Quota::with_period(delay).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { delay, limiter }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl fmt::Debug for Pacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pacer").field("delay", &self.delay).finish()
    }
}
