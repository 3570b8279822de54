//! Throttle policy: window size, quota and minimum call interval.

use std::time::Duration;

use crate::error::{Result, SessionError};

/// Limits applied independently to every endpoint of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Fixed window size in milliseconds, always > 0
    window_size_ms: i64,
    /// Accepted calls per endpoint per window
    max_calls_per_window: u64,
    /// Minimum milliseconds between two calls to one endpoint, 0 disables
    request_interval_ms: i64,
}

impl ThrottlePolicy {
    /// Create a policy, rejecting a non-positive window or negative interval.
    pub fn new(
        window_size_ms: i64,
        max_calls_per_window: u64,
        request_interval_ms: i64,
    ) -> Result<Self> {
        if window_size_ms <= 0 {
            return Err(SessionError::Config(format!(
                "window size must be positive, got {}ms",
                window_size_ms
            )));
        }
        if request_interval_ms < 0 {
            return Err(SessionError::Config(format!(
                "request interval must not be negative, got {}ms",
                request_interval_ms
            )));
        }
        Ok(Self {
            window_size_ms,
            max_calls_per_window,
            request_interval_ms,
        })
    }

    pub fn window_size_ms(&self) -> i64 {
        self.window_size_ms
    }

    pub fn max_calls_per_window(&self) -> u64 {
        self.max_calls_per_window
    }

    pub fn request_interval_ms(&self) -> i64 {
        self.request_interval_ms
    }

    /// Whether the minimum interval check is active.
    pub fn throttles_interval(&self) -> bool {
        self.request_interval_ms > 0
    }

    /// Window id containing `now_ms`.
    pub fn window_of(&self, now_ms: i64) -> i64 {
        now_ms.div_euclid(self.window_size_ms)
    }

    /// Window size as a duration.
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_size_ms as u64)
    }
}
