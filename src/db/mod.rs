//! Account security state persistence.
//!
//! The persistence collaborator owns the accounts table; this core only
//! reads and writes the security slice of it, through [`AccountStore`].
//! `PgAccountStore` is the production implementation,
//! [`MemoryAccountStore`] backs tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

pub mod models;
mod operations;

pub use models::{AccountRecord, AccountStatus};
pub use operations::PgAccountStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>, AppError>;

    async fn create(&self, account: &AccountRecord) -> Result<(), AppError>;

    /// Persist the mutable security fields (failure counter, lockout, MFA
    /// state, session pointer, last login). Read-then-write against the
    /// same record; racing logins may under-count failures, which the
    /// lockout design tolerates.
    async fn update_security_state(&self, account: &AccountRecord) -> Result<(), AppError>;
}

/// In-memory account store for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<RwLock<HashMap<Uuid, AccountRecord>>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountRecord>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn create(&self, account: &AccountRecord) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(crate::error::DatabaseError::Duplicate.into());
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_security_state(&self, account: &AccountRecord) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&account.id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(crate::error::DatabaseError::NotFound.into()),
        }
    }
}
