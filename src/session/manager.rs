//! Session manager: load, validate and persist session records.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::ratelimit::{CallRequest, Evaluator, Rejection};
use crate::store::{OrderedSetStore, SessionStore};

use super::codec;
use super::keys;
use super::payload::Payload;
use super::record::SessionRecord;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Orchestrates session storage and call validation.
///
/// Records are keyed by session id. Nothing is cached between calls: every
/// operation reads the store, so two concurrent calls for the same session
/// can both pass validation and the later save wins. Callers needing exact
/// counts under concurrency must serialize calls per session themselves.
pub struct SessionManager<S: SessionStore + ?Sized> {
    store: Arc<S>,
    config: SessionConfig,
    evaluator: Evaluator,
    /// Set when online user tracking is enabled
    online_key: Option<String>,
}

impl<S: SessionStore + ?Sized> SessionManager<S> {
    /// Create a manager over `store`.
    ///
    /// Fails when the configuration is invalid or when online user tracking
    /// is requested from a store without sorted sets.
    pub fn new(store: Arc<S>, config: SessionConfig) -> Result<Self> {
        let evaluator = Evaluator::new(config.policy()?);

        let online_key = if config.track_online_users {
            if store.ordered_set().is_none() {
                return Err(SessionError::Config(
                    "online user tracking requires a store with sorted sets".to_string(),
                ));
            }
            Some(keys::online_users_key(&config.key_prefix))
        } else {
            None
        };

        debug!(
            key_prefix = %config.key_prefix,
            window_size_ms = config.window_size_ms,
            max_calls_per_window = config.max_calls_per_window,
            request_interval_ms = config.request_interval_ms,
            track_online_users = config.track_online_users,
            "Session manager created"
        );

        Ok(Self {
            store,
            config,
            evaluator,
            online_key,
        })
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Storage key for a session id.
    pub fn session_key(&self, session_id: &str) -> String {
        keys::session_key(&self.config.key_prefix, session_id)
    }

    /// Record a call at the current time.
    ///
    /// Returns the updated record when the call is accepted. Rejections come
    /// back as `InvalidSession`, `TooFast` or `TooMany`; store and decoding
    /// failures are returned unchanged.
    pub async fn record_call(
        &self,
        session_id: &str,
        owner: &str,
        endpoint: &str,
    ) -> Result<SessionRecord> {
        self.record_call_at(session_id, owner, endpoint, now_ms()).await
    }

    /// Record a call at `now_ms`.
    #[instrument(skip(self, session_id))]
    pub async fn record_call_at(
        &self,
        session_id: &str,
        owner: &str,
        endpoint: &str,
        now_ms: i64,
    ) -> Result<SessionRecord> {
        let mut record = self.get_session(session_id).await?;
        let window_before = record.window;

        let request = CallRequest::new(session_id, owner, endpoint);
        match self.evaluator.validate(&mut record, &request, now_ms) {
            Ok(()) => {
                self.persist(session_id, &mut record, now_ms).await?;
                trace!("Call accepted");
                Ok(record)
            }
            Err(rejection) => {
                if self.config.persist_rollover_on_reject
                    && rejection != Rejection::InvalidSession
                    && record.window != window_before
                {
                    debug!(window = record.window, "Persisting rollover of rejected call");
                    self.persist(session_id, &mut record, now_ms).await?;
                }
                Err(rejection.into())
            }
        }
    }

    /// Create a new zero-state session for `owner` and return its id.
    pub async fn start_session(&self, owner: &str) -> Result<String> {
        let now = now_ms();
        let session_id = keys::generate_session_id(owner, now);
        let mut record = SessionRecord::new(session_id.clone(), owner, now);

        self.persist(&session_id, &mut record, now).await?;
        debug!(owner = %owner, "Session started");
        Ok(session_id)
    }

    /// Load a session record.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord> {
        let key = self.session_key(session_id);
        let bytes = self.bounded("get", self.store.get(&key)).await?;
        codec::decode(&bytes)
    }

    /// Save a session record, stamping its update time and refreshing its ttl.
    pub async fn set_session(&self, session_id: &str, record: &mut SessionRecord) -> Result<()> {
        self.persist(session_id, record, now_ms()).await
    }

    /// Delete a session, and its owner's online entry when tracking.
    ///
    /// A record that cannot be decoded is still deleted; its owner is then
    /// unknown and stays in the online set until pruned.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let owner = match &self.online_key {
            Some(_) => match self.get_session(session_id).await {
                Ok(record) => Some(record.owner),
                Err(SessionError::NotFound { .. }) => None,
                Err(SessionError::Serialization(e)) => {
                    debug!(error = %e, "Undecodable session, skipping online user removal");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let key = self.session_key(session_id);
        self.bounded("delete", self.store.delete(&key)).await?;

        if let (Some(online_key), Some(owner)) = (&self.online_key, owner) {
            let set = self.ordered_set()?;
            self.bounded("remove online user", set.remove_member(online_key, &owner))
                .await?;
        }

        debug!("Session deleted");
        Ok(())
    }

    /// Change a session's payload.
    ///
    /// The owner must match the stored record; call counters are untouched.
    pub async fn update_payload<F>(
        &self,
        session_id: &str,
        owner: &str,
        update: F,
    ) -> Result<SessionRecord>
    where
        F: FnOnce(&mut Payload),
    {
        let mut record = self.get_session(session_id).await?;
        if !record.is_owned_by(owner) {
            return Err(SessionError::InvalidSession);
        }

        update(record.payload_mut());
        self.persist(session_id, &mut record, now_ms()).await?;
        Ok(record)
    }

    /// Owners with a tracked session, mapped to their last update time in
    /// milliseconds.
    ///
    /// Entries are not removed when a session expires through its ttl, so an
    /// owner whose sessions all expired is still listed until
    /// [`prune_online_users`](Self::prune_online_users) runs.
    pub async fn online_users(&self) -> Result<HashMap<String, i64>> {
        let online_key = self.online_key()?;
        let set = self.ordered_set()?;
        let members = self
            .bounded("list online users", set.range_with_scores(online_key))
            .await?;
        Ok(members
            .into_iter()
            .map(|(owner, score)| (owner, score as i64))
            .collect())
    }

    /// Remove owners not seen for longer than the session ttl.
    ///
    /// Returns how many owners were removed. Nothing expires when the ttl is
    /// zero, so nothing is pruned then.
    pub async fn prune_online_users(&self) -> Result<usize> {
        self.prune_online_users_at(now_ms()).await
    }

    /// Remove owners last seen before `now_ms - session_ttl_ms`.
    #[instrument(skip(self))]
    pub async fn prune_online_users_at(&self, now_ms: i64) -> Result<usize> {
        let online_key = self.online_key()?;
        let set = self.ordered_set()?;
        if self.config.session_ttl_ms == 0 {
            return Ok(0);
        }

        let ttl = i64::try_from(self.config.session_ttl_ms).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(ttl);
        let members = self
            .bounded("list online users", set.range_with_scores(online_key))
            .await?;

        let mut removed = 0;
        // Members come back lowest score first.
        for (owner, score) in members {
            if score as i64 >= cutoff {
                break;
            }
            self.bounded("remove online user", set.remove_member(online_key, &owner))
                .await?;
            removed += 1;
        }

        debug!(removed = removed, cutoff = cutoff, "Online users pruned");
        Ok(removed)
    }

    /// Calls still accepted for `endpoint` in the current window.
    pub async fn remaining_calls(&self, session_id: &str, endpoint: &str) -> Result<u64> {
        let record = self.get_session(session_id).await?;
        Ok(self.evaluator.remaining(&record, endpoint, now_ms()))
    }

    async fn persist(&self, session_id: &str, record: &mut SessionRecord, now_ms: i64) -> Result<()> {
        record.updated = now_ms;
        let bytes = codec::encode(record)?;
        let key = self.session_key(session_id);

        self.bounded(
            "set",
            self.store.set(&key, bytes, self.config.session_ttl()),
        )
        .await?;

        if let Some(online_key) = &self.online_key {
            let set = self.ordered_set()?;
            self.bounded(
                "add online user",
                set.add_scored(online_key, &record.owner, record.updated as f64),
            )
            .await?;
        }
        Ok(())
    }

    fn online_key(&self) -> Result<&str> {
        self.online_key.as_deref().ok_or_else(|| {
            SessionError::Config("online users tracking is disabled".to_string())
        })
    }

    fn ordered_set(&self) -> Result<&dyn OrderedSetStore> {
        self.store.ordered_set().ok_or_else(|| {
            SessionError::Config("store does not support sorted sets".to_string())
        })
    }

    /// Run a store operation under the configured deadline, if any.
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.store_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                SessionError::Storage(format!("{} timed out after {:?}", operation, limit))
            })?,
            None => fut.await,
        }
    }
}
