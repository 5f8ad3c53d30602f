use reqwest::Response;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Client-side throttle for the GitHub API. Tracks the server's remaining
/// quota and spaces requests to at most `per_minute`.
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
    per_minute: u32,
}

struct RateLimitState {
    remaining: u32,
    reset_at: Option<Instant>,
    requests_this_minute: u32,
    minute_start: Instant,
}

impl RateLimiter {
    /// The search API allows 30 authenticated requests per minute.
    pub const SEARCH_PER_MINUTE: u32 = 30;

    pub fn new(per_minute: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                remaining: u32::MAX,
                reset_at: None,
                requests_this_minute: 0,
                minute_start: Instant::now(),
            })),
            per_minute: per_minute.max(1),
        }
    }

    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        if state.remaining == 0 {
            if let Some(reset_at) = state.reset_at {
                let now = Instant::now();
                if reset_at > now {
                    let wait_duration = reset_at - now;
                    drop(state);
                    tracing::info!("GitHub quota exhausted, waiting {:?}", wait_duration);
                    sleep(wait_duration).await;
                    state = self.state.lock().await;
                }
            }
            state.remaining = u32::MAX;
        }

        let minute_elapsed = state.minute_start.elapsed();
        if minute_elapsed < Duration::from_secs(60) {
            if state.requests_this_minute >= self.per_minute {
                let wait_time = Duration::from_secs(60) - minute_elapsed;
                drop(state);
                tracing::debug!("Throttling GitHub requests, waiting {:?}", wait_time);
                sleep(wait_time).await;
                state = self.state.lock().await;
                state.requests_this_minute = 0;
                state.minute_start = Instant::now();
            }
        } else {
            state.requests_this_minute = 0;
            state.minute_start = Instant::now();
        }

        state.requests_this_minute += 1;
    }

    pub async fn update_from_response(&self, response: &Response) {
        let Some(remaining) = header_number::<u32>(response, "x-ratelimit-remaining") else {
            return;
        };
        let reset = header_number::<u64>(response, "x-ratelimit-reset");

        let mut state = self.state.lock().await;
        state.remaining = remaining;
        if let Some(reset_timestamp) = reset {
            let wait_secs = seconds_until(reset_timestamp);
            if wait_secs > 0 {
                state.reset_at = Some(Instant::now() + Duration::from_secs(wait_secs));
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::SEARCH_PER_MINUTE)
    }
}

fn header_number<T: std::str::FromStr>(response: &Response, name: &str) -> Option<T> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Seconds from now until the given unix timestamp, zero if it has passed.
pub(crate) fn seconds_until(unix_timestamp: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    unix_timestamp.saturating_sub(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_until_past_is_zero() {
        assert_eq!(seconds_until(0), 0);
        assert!(seconds_until(u64::MAX) > 0);
    }

    #[tokio::test]
    async fn test_wait_under_budget_does_not_block() {
        let limiter = RateLimiter::new(5);
        let started = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
