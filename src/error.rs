//! Error types for sessionguard.

use thiserror::Error;

use crate::ratelimit::Rejection;

/// Main error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The presented session id or owner does not match the stored record
    #[error("invalid session")]
    InvalidSession,

    /// The endpoint was called again before the minimum interval elapsed
    #[error("request too fast")]
    TooFast,

    /// The endpoint exhausted its quota for the current window
    #[error("too many requests")]
    TooMany,

    /// No record exists under the given key
    #[error("session not found: {key}")]
    NotFound { key: String },

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether this is an expected throttling outcome the caller can act on
    /// (for example by answering 429), as opposed to an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidSession | SessionError::TooFast | SessionError::TooMany
        )
    }

    /// Whether the error came from the store or the record encoding.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SessionError::Storage(_) | SessionError::Serialization(_))
    }
}

impl From<Rejection> for SessionError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InvalidSession => SessionError::InvalidSession,
            Rejection::TooFast => SessionError::TooFast,
            Rejection::TooMany => SessionError::TooMany,
        }
    }
}

impl From<::config::ConfigError> for SessionError {
    fn from(err: ::config::ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_distinguishable() {
        assert!(SessionError::TooFast.is_rejection());
        assert!(SessionError::TooMany.is_rejection());
        assert!(SessionError::InvalidSession.is_rejection());

        let storage = SessionError::Storage("connection reset".to_string());
        assert!(!storage.is_rejection());
        assert!(storage.is_infrastructure());

        let missing = SessionError::NotFound { key: "sess:abc".to_string() };
        assert!(!missing.is_rejection());
        assert!(!missing.is_infrastructure());
    }

    #[test]
    fn test_rejection_conversion() {
        assert!(matches!(SessionError::from(Rejection::TooFast), SessionError::TooFast));
        assert!(matches!(SessionError::from(Rejection::TooMany), SessionError::TooMany));
        assert!(matches!(
            SessionError::from(Rejection::InvalidSession),
            SessionError::InvalidSession
        ));
    }
}
