//! In-memory rate limiting for inbound connection events.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<Uuid, VecDeque<Instant>>`,
//! keyed by connection id. Each window is pruned on check, so budgets roll
//! continuously rather than resetting on a fixed boundary, and every
//! connection's window is independent of every other's.
//!
//! Exceeding the budget rejects the triggering event only — the connection
//! stays open and recovers as soon as old events age out of the window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use protocol::RejectCode;
use uuid::Uuid;

const DEFAULT_EVENT_LIMIT: usize = 100;
const DEFAULT_WINDOW_SECS: u64 = 60;

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded (max {limit} events/{window_secs}s)")]
    Exceeded { limit: usize, window_secs: u64 },
}

impl RateLimitError {
    #[must_use]
    pub fn code(&self) -> RejectCode {
        RejectCode::RateLimitExceeded
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<Uuid, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    /// Limiter configured from `RATE_LIMIT_EVENTS` / `RATE_LIMIT_WINDOW_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_limit(
            env_parse("RATE_LIMIT_EVENTS", DEFAULT_EVENT_LIMIT),
            Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
        )
    }

    #[must_use]
    pub fn with_limit(limit: usize, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), limit, window }
    }

    /// Check the connection's window and record the event on success.
    /// Exactly `limit` events inside one window succeed; the next is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] when the budget is already spent.
    pub fn check_and_record(&self, connection_id: Uuid) -> Result<(), RateLimitError> {
        self.check_and_record_at(connection_id, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    fn check_and_record_at(&self, connection_id: Uuid, now: Instant) -> Result<(), RateLimitError> {
        let mut windows = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let deque = windows.entry(connection_id).or_default();
        prune_window(deque, now, self.window);
        if deque.len() >= self.limit {
            return Err(RateLimitError::Exceeded {
                limit: self.limit,
                window_secs: self.window.as_secs(),
            });
        }

        deque.push_back(now);
        Ok(())
    }

    /// Drop a connection's counters. Called on disconnect so the map never
    /// outlives the registry.
    pub fn forget(&self, connection_id: Uuid) {
        let mut windows = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        windows.remove(&connection_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_env()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
