//! Sliding-window rate control with retry-with-backoff for LLM calls.

use crate::CoreError;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Substrings that mark a provider error as rate-limit-shaped rather than
/// a hard failure.
const RATE_LIMIT_MARKERS: &[&str] = &["429", "too many requests", "rate limit", "quota"];

/// Sliding-window limiter admitting at most `max_per_minute` calls in any
/// trailing 60-second window, additionally spacing consecutive calls by
/// at least `60s / max_per_minute`.
pub struct RateLimiter {
    max_per_minute: u32,
    min_interval: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting up to `max_per_minute` calls per
    /// rolling 60-second window.
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        let max_per_minute = max_per_minute.max(1);
        Self {
            max_per_minute,
            min_interval: WINDOW / max_per_minute,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the number of calls currently counted within the trailing
    /// window.
    pub async fn current_usage(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        evict_expired(&mut timestamps);
        timestamps.len()
    }

    /// Blocks until a call slot is available, then reserves it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RateLimitTimeout`] if no slot opens within
    /// `timeout`.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), CoreError> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut timestamps = self.timestamps.lock().await;
            evict_expired(&mut timestamps);

            if timestamps.len() < self.max_per_minute as usize {
                if let Some(&last) = timestamps.back() {
                    let since_last = last.elapsed();
                    if since_last < self.min_interval {
                        let wait = self.min_interval - since_last;
                        drop(timestamps);
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                }
                timestamps.push_back(Instant::now());
                return Ok(());
            }

            let wait_for_slot = timestamps
                .front()
                .map_or(Duration::from_millis(50), |oldest| {
                    WINDOW.saturating_sub(oldest.elapsed())
                });
            drop(timestamps);

            if Instant::now() >= deadline {
                return Err(CoreError::RateLimitTimeout {
                    timeout_secs: timeout.as_secs_f64(),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(wait_for_slot.min(remaining)).await;
        }
    }
}

fn evict_expired(timestamps: &mut VecDeque<Instant>) {
    let now = Instant::now();
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) >= WINDOW {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Returns `true` if `message` looks like a rate-limit or quota error
/// rather than a hard failure.
#[must_use]
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Calls `f` under the rate limiter, retrying with exponential backoff on
/// rate-limit-shaped errors up to `max_retries` additional attempts.
///
/// # Errors
///
/// Returns the last error `f` produced if every attempt fails, or
/// [`CoreError::RateLimitTimeout`] if a rate-limiter slot never opens.
pub async fn call_with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    acquire_timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    mut f: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    let mut backoff = initial_backoff;

    loop {
        limiter.acquire(acquire_timeout).await?;

        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let rate_limited = looks_rate_limited(&err.to_string());
                if !rate_limited || attempt >= max_retries {
                    return Err(err);
                }
                log::warn!(
                    "Provider call rate-limited (attempt {}/{}), backing off {:?}",
                    attempt + 1,
                    max_retries,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
                attempt += 1;
            }
        }
    }
}
