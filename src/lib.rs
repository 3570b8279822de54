//! Sessionguard - per-session API call throttling
//!
//! This crate tracks how often each session calls each endpoint and rejects
//! calls that arrive faster than a minimum interval or exceed a quota within
//! a fixed time window. Session state lives in an external key-value store
//! (Valkey/Redis, or in-memory for tests and demos).

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod session;
pub mod store;

pub use error::{Result, SessionError};
pub use session::{SessionManager, SessionRecord};
