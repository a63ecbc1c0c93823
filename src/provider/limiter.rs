use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token-bucket limiter shared by every outbound provider call in a run.
/// `acquire()` suspends until a permit is available; callers are released
/// approximately in arrival order and never faster than the configured rate.
pub struct ProviderLimiter {
    inner: DefaultDirectRateLimiter,
}

impl ProviderLimiter {
    pub fn per_second(rps: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps.max(1)).expect("non-zero rps"));
        Self {
            inner: RateLimiter::direct(quota),
        }
    }

    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}
