//! Session records and their lifecycle.

mod codec;
mod keys;
mod manager;
mod payload;
mod record;

pub use codec::{decode, encode};
pub use keys::{generate_session_id, hash, online_users_key, session_key};
pub use manager::{now_ms, SessionManager};
pub use payload::Payload;
pub use record::{CallRecord, SessionRecord};
