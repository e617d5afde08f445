//! Key-value backend seam.
//!
//! Session records and rate-limit counters live in a shared external
//! key-value store. The core depends only on the six primitives below;
//! production deployments point the trait at the platform's Redis adapter,
//! tests and development use [`MemoryBackend`]. Correctness under
//! concurrency relies on the backend's atomic increment, not on
//! client-side locking.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;

mod memory;

pub use memory::MemoryBackend;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set a value with an expiry (SETEX semantics: overwrites value and
    /// TTL together).
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    async fn del(&self, key: &str) -> Result<(), AppError>;

    /// Atomically increment an integer value, creating it at 1 when the key
    /// is absent. Never touches the key's expiry.
    async fn incr(&self, key: &str) -> Result<i64, AppError>;

    /// Set a key's expiry. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Remaining time to live. `None` means the key is absent or carries no
    /// expiry; keys written through [`set_ex`](Self::set_ex) always carry
    /// one.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError>;
}
