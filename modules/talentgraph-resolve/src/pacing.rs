//! Outbound call pacing: a fixed cool-down between consecutive calls and a
//! bounded retry loop with a fixed delay.
//!
//! External calls are one at a time. The pacer is a sequencing point, not a
//! token bucket; running lanes in parallel needs one pacer per lane.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use talentgraph_common::config::PacingConfig;

use crate::error::ServiceError;

pub struct Pacer {
    cooldown: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            last_call: Mutex::new(None),
        }
    }

    /// No cool-down, one attempt. For tests.
    pub fn unpaced() -> Self {
        Self::new(&PacingConfig {
            cooldown_ms: 0,
            max_attempts: 1,
            retry_delay_ms: 0,
        })
    }

    /// Sleep until the cool-down since the previous call has elapsed.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.cooldown;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Run `call` behind the cool-down, retrying retryable failures up to the
    /// configured attempt count with a fixed delay between attempts.
    pub async fn call<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.wait().await;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        call = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "External call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
