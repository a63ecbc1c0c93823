use std::future::Future;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tokio::time::sleep;
use tracing::warn;

use super::ProviderError;

/// Explicit retry policy composed around each outbound call: bounded
/// exponential backoff with jitter on transient failures only. Not-found and
/// malformed responses propagate immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let jittered = delay + jitter(delay);
                    warn!(attempt, delay_ms = %jittered.as_millis(), error = %err, "transient provider error; backing off");
                    sleep(jittered).await;
                    delay = delay.saturating_mul(2).min(self.max_delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let half = (delay.as_millis() as u64 / 2).max(1);
    Duration::from_millis(thread_rng().gen_range(0..=half))
}
