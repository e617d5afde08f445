//! Fixed-window request counting per caller.
//!
//! The first request in a window sets the counter to 1 and starts a
//! window-length expiry; later requests increment the counter without
//! touching the expiry; the backend's TTL expiry resets the window. A
//! burst straddling a window boundary can therefore admit up to twice the
//! limit across the two windows — an accepted approximation of this
//! scheme, not a bug.
//!
//! Enforcement is best-effort by policy: when the backend is unreachable
//! (after a bounded timeout and one retry) the limiter fails open and
//! admits the request, because blocking all traffic during a backend
//! outage is the worse failure mode here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::AppError;
use crate::store::KeyValueBackend;

const KEY_PREFIX: &str = "ratelimit";

#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn KeyValueBackend>,
    op_timeout: Duration,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn KeyValueBackend>, op_timeout: Duration) -> Self {
        Self {
            backend,
            op_timeout,
        }
    }

    fn make_key(identifier: &str, window: Duration) -> String {
        format!("{}:{}:{}", KEY_PREFIX, window.as_secs(), identifier)
    }

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
                    warn!(op = op_name, error = %e, "rate limit backend error, retrying");
                }
                Err(_) => {
                    if attempt == 1 {
                        return Err(AppError::BackendUnavailable(format!(
                            "rate limit {} timed out",
                            op_name
                        )));
                    }
                    warn!(op = op_name, "rate limit backend timed out, retrying");
                }
            }
        }
        unreachable!("retry loop returns on second attempt")
    }

    /// Check and count one request. Returns `(allowed, remaining)`.
    ///
    /// At or above the limit the counter is not incremented further, so a
    /// rejected burst cannot grow the count without bound.
    pub async fn is_allowed(&self, identifier: &str, limit: u32, window: Duration) -> (bool, u32) {
        match self.try_count(identifier, limit, window).await {
            Ok(result) => result,
            Err(e) => {
                // Fail open: availability over strict enforcement.
                warn!(identifier, error = %e, "rate limit check failed, admitting request");
                (true, limit)
            }
        }
    }

    async fn try_count(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
    ) -> Result<(bool, u32), AppError> {
        let key = Self::make_key(identifier, window);

        let current = self
            .with_backend("get", || self.backend.get(&key))
            .await?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        if current >= limit {
            return Ok((false, 0));
        }

        self.with_backend("incr", || self.backend.incr(&key)).await?;
        if current == 0 {
            // First increment of the window: the expiry is set exactly once
            // here and never extended within the window.
            self.with_backend("expire", || self.backend.expire(&key, window))
                .await?;
        }

        Ok((true, limit - current - 1))
    }

    /// Remaining quota without counting a request.
    pub async fn remaining(&self, identifier: &str, limit: u32, window: Duration) -> u32 {
        let key = Self::make_key(identifier, window);

        match self.with_backend("get", || self.backend.get(&key)).await {
            Ok(value) => {
                let current = value.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
                limit.saturating_sub(current)
            }
            Err(e) => {
                warn!(identifier, error = %e, "rate limit read failed");
                limit
            }
        }
    }
}
