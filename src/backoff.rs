//! Rate-limit backoff controller
//!
//! Wraps a single remote call and absorbs "too many requests" responses with
//! exponential backoff plus jitter. Any other failure is propagated immediately.
//!
//! # Example
//!
//! ```no_run
//! use chat_export::backoff::BackoffController;
//! use chat_export::config::BackoffConfig;
//! use chat_export::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let mut backoff = BackoffController::new(BackoffConfig::default());
//! let page = backoff
//!     .execute_with_retry(
//!         || async { Ok::<_, Error>(vec![1, 2, 3]) },
//!         |delay, attempt| println!("retry {attempt} in {delay:?}"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::BackoffConfig;
use crate::error::{Error, RateLimitSignal, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Mutable state of one retrieval loop's controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffState {
    /// Earliest time the next call may be issued
    pub next_eligible: Option<Instant>,
    /// Consecutive rate-limited attempts
    pub retries: u32,
    /// Retry ceiling
    pub ceiling: u32,
}

/// Stateful rate-limit retry wrapper
///
/// One controller belongs to one retrieval loop; it is `&mut self` throughout so it
/// cannot be shared across concurrent loops.
#[derive(Debug)]
pub struct BackoffController {
    config: BackoffConfig,
    state: BackoffState,
}

impl BackoffController {
    /// Create a controller with fresh state
    pub fn new(config: BackoffConfig) -> Self {
        let ceiling = config.max_retries;
        Self {
            config,
            state: BackoffState {
                next_eligible: None,
                retries: 0,
                ceiling,
            },
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> &BackoffState {
        &self.state
    }

    /// Clear the retry counter and the pending wait
    pub fn reset(&mut self) {
        self.state.retries = 0;
        self.state.next_eligible = None;
    }

    /// Delay before retry number `retries` (1-based) when the server gave no hint
    ///
    /// `min(base_delay * 2^(retries-1) + uniform(0, jitter_max), max_delay)`
    pub fn compute_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(31);
        let exponential = self
            .config
            .base_delay
            .saturating_mul(1u32 << exponent);
        exponential
            .saturating_add(jitter(self.config.jitter_max))
            .min(self.config.max_delay)
    }

    /// Run `operation`, retrying on rate-limit failures
    ///
    /// A server-supplied retry hint replaces the computed delay but is still
    /// capped at `max_delay`.
    ///
    /// `on_retry` receives the chosen delay and the retry number before each sleep.
    /// Returns [`Error::RateLimitExceeded`] once the retry count reaches the ceiling.
    pub async fn execute_with_retry<F, Fut, T, R>(
        &mut self,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(Duration, u32),
    {
        loop {
            if let Some(eligible) = self.state.next_eligible
                && eligible > Instant::now()
            {
                tokio::time::sleep_until(eligible).await;
            }

            match operation().await {
                Ok(result) => {
                    if self.state.retries > 0 {
                        tracing::info!(
                            attempts = self.state.retries + 1,
                            "Operation succeeded after rate-limit retry"
                        );
                    }
                    self.reset();
                    return Ok(result);
                }
                Err(e) => {
                    let Some(hint) = e.rate_limit_hint() else {
                        tracing::debug!(error = %e, "Operation failed with non-rate-limit error");
                        return Err(e);
                    };

                    self.state.retries += 1;
                    if self.state.retries >= self.state.ceiling {
                        tracing::error!(
                            attempts = self.state.retries,
                            "Rate limit persisted past retry ceiling"
                        );
                        let attempts = self.state.retries;
                        self.reset();
                        return Err(Error::RateLimitExceeded { attempts });
                    }

                    let delay = match hint {
                        Some(server_delay) => server_delay.min(self.config.max_delay),
                        None => self.compute_delay(self.state.retries),
                    };

                    tracing::warn!(
                        attempt = self.state.retries,
                        ceiling = self.state.ceiling,
                        delay_ms = delay.as_millis() as u64,
                        server_hint = hint.is_some(),
                        "Rate limited, backing off"
                    );

                    on_retry(delay, self.state.retries);
                    let eligible = Instant::now() + delay;
                    self.state.next_eligible = Some(eligible);
                    tokio::time::sleep_until(eligible).await;
                }
            }
        }
    }
}

/// Uniform random jitter in `[0, max]`
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=max_ms))
}
