//! Authentication, session and abuse-control core for the PayGuard
//! transaction gateway.
//!
//! The crate turns a raw credential or bearer token into a trust decision:
//! the [`gate::RequestGate`] rate-checks every request, validates bearer
//! tokens for resource routes and drives the [`guard::AccountGuard`] login
//! state machine for credential routes. Cross-request state (sessions,
//! rate counters, lockout) lives behind the [`store::KeyValueBackend`] and
//! [`db::AccountStore`] seams; the core holds no shared mutable state of
//! its own.

pub mod audit;
pub mod config;
pub mod credential;
pub mod db;
pub mod encryption;
pub mod error;
pub mod gate;
pub mod guard;
pub mod mfa;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod token;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;

pub use config::Settings;
pub use error::{AppError, AuthError};
pub type Result<T> = std::result::Result<T, AppError>;

pub use audit::{AuditSink, TracingAuditSink};
pub use credential::CredentialService;
pub use encryption::EncryptionService;
pub use gate::{GateRequest, RequestGate};
pub use guard::{AccountGuard, LoginOutcome};
pub use mfa::MfaService;
pub use rate_limit::RateLimiter;
pub use session::SessionStore;
pub use token::TokenService;

/// Install a `tracing` subscriber honoring `RUST_LOG`, falling back to the
/// given default filter. Call once at process start.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Fully wired core: configuration plus every component, constructed once
/// at process start and shared across request handlers. Collaborators —
/// the account store, the key-value backend and the audit sink — are
/// injected; the core never reaches for hidden globals.
pub struct AuthCore {
    pub config: Arc<Settings>,
    pub gate: RequestGate,
    pub guard: Arc<AccountGuard>,
    pub sessions: SessionStore,
    pub tokens: TokenService,
    pub encryption: EncryptionService,
}

impl AuthCore {
    pub fn new(
        config: Settings,
        accounts: Arc<dyn db::AccountStore>,
        backend: Arc<dyn store::KeyValueBackend>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let op_timeout = config.backend.timeout();

        let tokens = TokenService::new(
            config.auth.jwt_secret.clone(),
            ChronoDuration::minutes(config.auth.access_token_ttl_minutes),
            ChronoDuration::days(config.auth.refresh_token_ttl_days),
        );
        let encryption = EncryptionService::new(&config.encryption.seed);
        let sessions = SessionStore::new(
            backend.clone(),
            std::time::Duration::from_secs(config.session.ttl_hours as u64 * 3600),
            op_timeout,
        );
        let limiter = RateLimiter::new(backend, op_timeout);

        let guard = Arc::new(AccountGuard::new(
            accounts,
            CredentialService::new(),
            MfaService::new(config.mfa.issuer.clone()),
            tokens.clone(),
            sessions.clone(),
            encryption.clone(),
            audit.clone(),
            guard::GuardConfig {
                lockout_threshold: config.auth.lockout_threshold,
                lockout_duration: ChronoDuration::minutes(config.auth.lockout_duration_minutes),
                mfa_window_tolerance: config.mfa.valid_window,
            },
        ));

        let gate = RequestGate::new(
            limiter,
            tokens.clone(),
            guard.clone(),
            audit,
            config.rate_limit.clone(),
        );

        Self {
            config: Arc::new(config),
            gate,
            guard,
            sessions,
            tokens,
            encryption,
        }
    }
}
