//! TTL-bound session records in the key-value backend.
//!
//! A session is keyed by an opaque identifier with 32 bytes of entropy and
//! holds a compact record of who is logged in. Absence of the key is a
//! valid terminal state meaning "no active session", never an error:
//! callers treat it as an anonymous caller. Backend operations carry a
//! bounded timeout and a single retry; a backend that stays unreachable
//! surfaces as [`AppError::BackendUnavailable`] rather than a panic.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::KeyValueBackend;

const KEY_PREFIX: &str = "session";

/// Bytes of entropy in a session identifier.
const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: role.into(),
            created_at: Utc::now(),
        }
    }
}

/// Generate a cryptographically random opaque session identifier.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueBackend>,
    default_ttl: Duration,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, default_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            backend,
            default_ttl,
            op_timeout,
        }
    }

    fn make_key(session_id: &str) -> String {
        format!("{}:{}", KEY_PREFIX, session_id)
    }

    /// Run a backend operation under the configured timeout, retrying once
    /// on transient failure.
    async fn with_backend<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        for attempt in 0..2 {
            match tokio::time::timeout(self.op_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if attempt == 1 {
                        return Err(e);
                    }
                    warn!(op = op_name, error = %e, "session backend error, retrying");
                }
                Err(_) => {
                    if attempt == 1 {
                        return Err(AppError::BackendUnavailable(format!(
                            "session {} timed out",
                            op_name
                        )));
                    }
                    warn!(op = op_name, "session backend timed out, retrying");
                }
            }
        }
        unreachable!("retry loop returns on second attempt")
    }

    /// Create a session with the given TTL (default 24 hours).
    pub async fn create(
        &self,
        session_id: &str,
        record: &SessionRecord,
        ttl: Option<Duration>,
    ) -> Result<(), AppError> {
        let key = Self::make_key(session_id);
        let value = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("session serialization failed: {}", e)))?;
        let ttl = ttl.unwrap_or(self.default_ttl);

        self.with_backend("create", || self.backend.set_ex(&key, &value, ttl))
            .await
    }

    /// Fetch a session. `Ok(None)` means no active session.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, AppError> {
        let key = Self::make_key(session_id);
        let value = self.with_backend("get", || self.backend.get(&key)).await?;

        match value {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| AppError::Internal(format!("corrupt session record: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Replace a session's record, preserving its remaining TTL. Returns
    /// false when the session is absent or already expired; extending the
    /// lifetime is [`refresh`](Self::refresh)'s job, not this one's.
    pub async fn update(&self, session_id: &str, record: &SessionRecord) -> Result<bool, AppError> {
        let key = Self::make_key(session_id);

        let remaining = match self.with_backend("ttl", || self.backend.ttl(&key)).await? {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => return Ok(false),
        };

        let value = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("session serialization failed: {}", e)))?;
        self.with_backend("update", || self.backend.set_ex(&key, &value, remaining))
            .await?;
        Ok(true)
    }

    /// Delete a session. Deleting an absent session is a no-op.
    pub async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        let key = Self::make_key(session_id);
        self.with_backend("delete", || self.backend.del(&key)).await
    }

    /// Reset a session's TTL (explicit renewal). Returns false when the
    /// session is absent or expired.
    pub async fn refresh(&self, session_id: &str, ttl: Option<Duration>) -> Result<bool, AppError> {
        let key = Self::make_key(session_id);
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.with_backend("refresh", || self.backend.expire(&key, ttl))
            .await
    }
}
