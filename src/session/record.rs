//! The persisted session record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::payload::Payload;

/// Tracks how one endpoint is being called within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Accepted calls in the current window
    #[serde(rename = "c")]
    pub count: u64,
    /// Timestamp of the last accepted call, in milliseconds
    #[serde(rename = "l")]
    pub last: i64,
}

/// A session and its per-endpoint call history.
///
/// Field names are single characters on the wire to keep stored records small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session token
    #[serde(rename = "i")]
    pub id: String,
    /// Identity the session belongs to
    #[serde(rename = "o")]
    pub owner: String,
    /// Call history keyed by endpoint
    #[serde(rename = "r", default)]
    pub calls: HashMap<String, CallRecord>,
    /// Current fixed window id
    #[serde(rename = "w", default)]
    pub window: i64,
    /// Attached data, opaque to the throttling logic
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Creation time in milliseconds
    #[serde(rename = "c", default)]
    pub created: i64,
    /// Last save time in milliseconds
    #[serde(rename = "u", default)]
    pub updated: i64,
}

impl SessionRecord {
    /// Create a zero-state record.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            calls: HashMap::new(),
            window: 0,
            payload: None,
            created: now_ms,
            updated: now_ms,
        }
    }

    /// Move to a new window, resetting every endpoint's count.
    ///
    /// `last` timestamps survive the reset so the interval check keeps working
    /// across a window boundary.
    pub fn set_window(&mut self, window: i64) {
        self.window = window;
        for call in self.calls.values_mut() {
            call.count = 0;
        }
    }

    /// Get the call record for an endpoint, if it was ever called.
    pub fn call_record(&self, endpoint: &str) -> Option<&CallRecord> {
        self.calls.get(endpoint)
    }

    /// Get the call record for an endpoint, creating an empty one on first use.
    pub fn call_record_mut(&mut self, endpoint: &str) -> &mut CallRecord {
        self.calls.entry(endpoint.to_string()).or_default()
    }

    /// Whether the record belongs to `owner` (ASCII case-insensitive).
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner)
    }

    /// Total accepted calls in the current window across all endpoints.
    pub fn total_calls(&self) -> u64 {
        self.calls.values().map(|c| c.count).sum()
    }

    /// Attached payload, created empty on first use.
    pub fn payload_mut(&mut self) -> &mut Payload {
        self.payload.get_or_insert_with(Payload::new)
    }
}
