//! Configuration management for sessionguard.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SessionError};
use crate::ratelimit::ThrottlePolicy;

/// Environment variable prefix, e.g. `SESSIONGUARD__SESSION__WINDOW_SIZE_MS`.
const ENV_PREFIX: &str = "SESSIONGUARD";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the sessionguard binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Session and throttling configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Valkey/Redis URL; the in-memory store is used when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Number of pooled connections to the store
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

/// Session manager configuration, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Namespace for storage keys (`{key_prefix}:{session_id}`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Session time to live in milliseconds, refreshed on every save
    #[serde(default = "default_session_ttl")]
    pub session_ttl_ms: u64,

    /// Fixed window size in milliseconds
    #[serde(default = "default_window_size")]
    pub window_size_ms: u64,

    /// Accepted calls per endpoint per window
    #[serde(default = "default_max_calls")]
    pub max_calls_per_window: u64,

    /// Minimum milliseconds between two calls to one endpoint, 0 disables
    #[serde(default = "default_request_interval")]
    pub request_interval_ms: u64,

    /// Maintain the online users sorted set
    #[serde(default)]
    pub track_online_users: bool,

    /// Save the record when a rejected call rolled the window over
    #[serde(default)]
    pub persist_rollover_on_reject: bool,

    /// Upper bound on every store call, unbounded when unset
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            session_ttl_ms: default_session_ttl(),
            window_size_ms: default_window_size(),
            max_calls_per_window: default_max_calls(),
            request_interval_ms: default_request_interval(),
            track_online_users: false,
            persist_rollover_on_reject: false,
            store_timeout_ms: None,
        }
    }
}

fn default_key_prefix() -> String {
    "session".to_string()
}

fn default_session_ttl() -> u64 {
    86_400_000
}

fn default_window_size() -> u64 {
    60_000
}

fn default_max_calls() -> u64 {
    10
}

fn default_request_interval() -> u64 {
    1_000
}

impl SessionConfig {
    /// Check the invariants the evaluator relies on.
    pub fn validate(&self) -> Result<()> {
        if self.window_size_ms == 0 {
            return Err(SessionError::Config(
                "window_size_ms must be greater than 0".to_string(),
            ));
        }
        if i64::try_from(self.window_size_ms).is_err()
            || i64::try_from(self.request_interval_ms).is_err()
        {
            return Err(SessionError::Config(
                "window_size_ms and request_interval_ms must fit in a signed 64-bit integer"
                    .to_string(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(SessionError::Config("key_prefix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build the throttle policy described by this configuration.
    pub fn policy(&self) -> Result<ThrottlePolicy> {
        self.validate()?;
        ThrottlePolicy::new(
            self.window_size_ms as i64,
            self.max_calls_per_window,
            self.request_interval_ms as i64,
        )
    }

    /// Session time to live.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    /// Per-call store deadline, if any.
    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    /// Load configuration from an optional file, then `SESSIONGUARD__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path));
        }

        let config: AppConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.session.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = ::config::Config::builder()
            .add_source(::config::File::from_str(yaml, ::config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.session.key_prefix, "session");
        assert_eq!(config.session.window_size_ms, 60_000);
        assert_eq!(config.session.max_calls_per_window, 10);
        assert_eq!(config.session.request_interval_ms, 1_000);
        assert!(!config.session.track_online_users);
        assert!(config.store.url.is_none());
        assert!(config.session.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store:
  url: redis://127.0.0.1:6379
session:
  key_prefix: sess
  window_size_ms: 10000
  max_calls_per_window: 3
  request_interval_ms: 10
  track_online_users: true
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.session.key_prefix, "sess");
        assert_eq!(config.session.max_calls_per_window, 3);
        assert_eq!(config.session.session_ttl_ms, 86_400_000);
        assert!(config.session.track_online_users);

        let policy = config.session.policy().unwrap();
        assert_eq!(policy.window_size_ms(), 10_000);
        assert_eq!(policy.request_interval_ms(), 10);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
session:
  window_size_ms: 0
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("SESSIONGUARD__SESSION__MAX_CALLS_PER_WINDOW", "42");
        let config = AppConfig::load(None).unwrap();
        std::env::remove_var("SESSIONGUARD__SESSION__MAX_CALLS_PER_WINDOW");

        assert_eq!(config.session.max_calls_per_window, 42);
        assert_eq!(config.session.window_size_ms, 60_000);
    }

    #[test]
    fn test_durations() {
        let session = SessionConfig {
            session_ttl_ms: 1_500,
            store_timeout_ms: Some(250),
            ..SessionConfig::default()
        };
        assert_eq!(session.session_ttl(), Duration::from_millis(1_500));
        assert_eq!(session.store_timeout(), Some(Duration::from_millis(250)));
    }
}
