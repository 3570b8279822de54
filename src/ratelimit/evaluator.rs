//! Fixed-window call evaluation against a session record.

use std::time::Duration;
use tracing::{debug, trace};

use crate::session::SessionRecord;

use super::policy::ThrottlePolicy;

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Session id or owner does not match the record
    InvalidSession,
    /// Minimum interval since the endpoint's last accepted call not reached
    TooFast,
    /// Endpoint quota for the current window exhausted
    TooMany,
}

/// An incoming call as claimed by the caller.
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    pub session_id: &'a str,
    pub owner: &'a str,
    pub endpoint: &'a str,
}

impl<'a> CallRequest<'a> {
    pub fn new(session_id: &'a str, owner: &'a str, endpoint: &'a str) -> Self {
        Self {
            session_id,
            owner,
            endpoint,
        }
    }
}

/// Decides whether a call is admissible and records it when it is.
///
/// The evaluator holds no state of its own; everything lives in the
/// [`SessionRecord`] it is handed, so one evaluator serves every session.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    policy: ThrottlePolicy,
}

impl Evaluator {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    /// Validate one call at `now_ms`, updating `record` on success.
    ///
    /// The identity check runs before anything is touched. The window
    /// rollover is applied next and stays applied even when the interval or
    /// quota check then rejects the call.
    pub fn validate(
        &self,
        record: &mut SessionRecord,
        request: &CallRequest<'_>,
        now_ms: i64,
    ) -> Result<(), Rejection> {
        if record.id != request.session_id || !record.is_owned_by(request.owner) {
            debug!(owner = %request.owner, "Session does not match caller");
            return Err(Rejection::InvalidSession);
        }

        let window = self.policy.window_of(now_ms);
        if window != record.window {
            trace!(from = record.window, to = window, "Rolling session window");
            record.set_window(window);
        }

        // Entries only exist for endpoints with an accepted call.
        let previous = record.call_record(request.endpoint).copied();
        let call = previous.unwrap_or_default();

        trace!(
            endpoint = %request.endpoint,
            count = call.count,
            last = call.last,
            now = now_ms,
            "Validating call"
        );

        if self.policy.throttles_interval()
            && previous.is_some()
            && now_ms.saturating_sub(call.last) < self.policy.request_interval_ms()
        {
            debug!(
                endpoint = %request.endpoint,
                since_last = now_ms.saturating_sub(call.last),
                interval = self.policy.request_interval_ms(),
                "Call too fast"
            );
            return Err(Rejection::TooFast);
        }

        if call.count + 1 > self.policy.max_calls_per_window() {
            debug!(
                endpoint = %request.endpoint,
                count = call.count,
                limit = self.policy.max_calls_per_window(),
                "Call quota exceeded"
            );
            return Err(Rejection::TooMany);
        }

        let entry = record.call_record_mut(request.endpoint);
        entry.count = call.count + 1;
        entry.last = now_ms;
        Ok(())
    }

    /// Calls still accepted for `endpoint` in the window containing `now_ms`.
    pub fn remaining(&self, record: &SessionRecord, endpoint: &str, now_ms: i64) -> u64 {
        let limit = self.policy.max_calls_per_window();
        if self.policy.window_of(now_ms) != record.window {
            return limit;
        }
        let used = record.call_record(endpoint).map(|c| c.count).unwrap_or(0);
        limit.saturating_sub(used)
    }

    /// Time until the window containing `now_ms` ends.
    ///
    /// Saturates at `i64::MAX` milliseconds when the window end is not
    /// representable.
    pub fn until_reset(&self, now_ms: i64) -> Duration {
        let size = self.policy.window_size_ms();
        let window_end = self
            .policy
            .window_of(now_ms)
            .saturating_add(1)
            .saturating_mul(size);
        Duration::from_millis(window_end.saturating_sub(now_ms).max(0) as u64)
    }
}
