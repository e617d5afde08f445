//! Login state machine and account lockout.
//!
//! Every login attempt walks `UNAUTHENTICATED → CREDENTIAL_CHECKED →
//! {MFA_PENDING | AUTHENTICATED}`, with `LOCKED` as a terminal state until
//! the lockout window elapses. The checks run in a fixed order: lockout
//! first (the password is not even evaluated on a locked account), then
//! password, then account status, then MFA. Each attempt emits exactly one
//! audit event.
//!
//! The caller-visible rejection is always the generic invalid-credentials
//! message (see [`AppError::client_message`]); the returned variant and the
//! audit reason stay precise.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::credential::CredentialService;
use crate::db::{AccountRecord, AccountStatus, AccountStore};
use crate::encryption::EncryptionService;
use crate::error::{AppError, AuthError};
use crate::mfa::MfaService;
use crate::session::{generate_session_id, SessionRecord, SessionStore};
use crate::token::{TokenKind, TokenService};

/// States of the login state machine. `Locked` is terminal until the
/// lockout timestamp passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CredentialChecked,
    MfaPending,
    Authenticated,
    Locked,
}

/// Request-scoped metadata threaded through for audit correlation.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip_address: String,
    pub correlation_id: Option<Uuid>,
}

impl RequestMeta {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            correlation_id: None,
        }
    }

    pub fn correlated(ip_address: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            ip_address: ip_address.into(),
            correlation_id: Some(correlation_id),
        }
    }
}

/// Successful authentication: tokens plus the session backing them.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user_id: Uuid,
    pub role: String,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    /// Access-token lifetime in seconds, for the caller's response.
    pub expires_in: i64,
}

/// Outcome of a login attempt that was not rejected outright.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Box<AuthenticatedSession>),
    /// Password was correct but the account requires a TOTP code; no
    /// usable tokens are issued.
    MfaRequired,
}

/// Material returned once at MFA enrollment; the secret is inert and the
/// backup codes are stored encrypted.
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

pub struct GuardConfig {
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    pub mfa_window_tolerance: u8,
}

pub struct AccountGuard {
    accounts: Arc<dyn AccountStore>,
    credentials: CredentialService,
    mfa: MfaService,
    tokens: TokenService,
    sessions: SessionStore,
    encryption: EncryptionService,
    audit: Arc<dyn AuditSink>,
    config: GuardConfig,
}

impl AccountGuard {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        credentials: CredentialService,
        mfa: MfaService,
        tokens: TokenService,
        sessions: SessionStore,
        encryption: EncryptionService,
        audit: Arc<dyn AuditSink>,
        config: GuardConfig,
    ) -> Self {
        Self {
            accounts,
            credentials,
            mfa,
            tokens,
            sessions,
            encryption,
            audit,
            config,
        }
    }

    fn audit_auth(&self, method: &str, meta: &RequestMeta) -> AuditEvent {
        let mut event = AuditEvent::authentication(method, meta.ip_address.clone());
        if let Some(id) = meta.correlation_id {
            event = event.correlated(id);
        }
        event
    }

    /// Attempt a credential login, walking the full state machine.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        mfa_code: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<LoginOutcome, AppError> {
        let mut state = AuthState::Unauthenticated;

        let Some(mut account) = self.accounts.find_by_email(email).await? else {
            self.audit.emit(
                self.audit_auth("login", meta)
                    .user(email)
                    .reason("unknown account"),
            );
            return Err(AuthError::InvalidCredentials.into());
        };

        // 1. Active lockout rejects before the password is evaluated.
        if let Some(until) = account.locked_until {
            if until > Utc::now() {
                self.audit.emit(
                    self.audit_auth("login", meta)
                        .user(account.id.to_string())
                        .reason("account locked"),
                );
                return Err(AuthError::AccountLocked { until }.into());
            }
        }

        // 2. Password check; failures feed the lockout counter.
        if !self.credentials.verify(password, &account.password_hash)? {
            account.failed_login_attempts += 1;
            account.last_failed_login = Some(Utc::now());

            let just_locked = account.failed_login_attempts >= self.config.lockout_threshold;
            if just_locked {
                let until = Utc::now() + self.config.lockout_duration;
                account.locked_until = Some(until);
                state = AuthState::Locked;
                warn!(
                    user_id = %account.id,
                    attempts = account.failed_login_attempts,
                    "account locked after repeated failed logins"
                );
            }
            self.accounts.update_security_state(&account).await?;

            let reason = if just_locked {
                "invalid password; lockout threshold reached"
            } else {
                "invalid password"
            };
            self.audit.emit(
                self.audit_auth("login", meta)
                    .user(account.id.to_string())
                    .reason(reason),
            );

            return Err(match account.locked_until {
                Some(until) if state == AuthState::Locked => {
                    AuthError::AccountLocked { until }.into()
                }
                _ => AuthError::InvalidCredentials.into(),
            });
        }
        state = AuthState::CredentialChecked;
        debug!(user_id = %account.id, state = ?state, "password verified");

        // 3. Only active accounts may proceed.
        if account.status != AccountStatus::Active {
            self.audit.emit(
                self.audit_auth("login", meta)
                    .user(account.id.to_string())
                    .reason(format!("account status: {}", account.status.as_str())),
            );
            return Err(AuthError::InvalidCredentials.into());
        }

        // 4./5. MFA gate.
        if account.mfa_enabled {
            let secret = account.mfa_secret.as_deref().ok_or_else(|| {
                AppError::Internal("mfa enabled without a stored secret".to_string())
            })?;

            let Some(code) = mfa_code else {
                state = AuthState::MfaPending;
                self.audit.emit(
                    self.audit_auth("login", meta)
                        .user(account.id.to_string())
                        .reason("mfa code required"),
                );
                debug!(user_id = %account.id, state = ?state, "awaiting mfa code");
                return Ok(LoginOutcome::MfaRequired);
            };

            // MFA failures never feed the password-failure counter; the
            // rate limiter bounds code guessing instead.
            if !self
                .mfa
                .verify_code(secret, code, self.config.mfa_window_tolerance)?
            {
                self.audit.emit(
                    self.audit_auth("login_mfa", meta)
                        .user(account.id.to_string())
                        .reason("invalid mfa code"),
                );
                return Err(AuthError::InvalidMfaCode.into());
            }
        }
        state = AuthState::Authenticated;

        let session = self.open_session(&mut account).await?;
        self.accounts.update_security_state(&account).await?;

        self.audit.emit(
            self.audit_auth(if account.mfa_enabled { "login_mfa" } else { "login" }, meta)
                .user(account.id.to_string())
                .succeeded(),
        );
        info!(user_id = %account.id, state = ?state, "login succeeded");

        Ok(LoginOutcome::Authenticated(Box::new(session)))
    }

    /// Register a new account: strength policy, hash, create, first login.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
        meta: &RequestMeta,
    ) -> Result<AuthenticatedSession, AppError> {
        let report = self.credentials.assess_strength(password);
        if !report.valid {
            return Err(AuthError::WeakPassword {
                issues: report.issues,
            }
            .into());
        }

        if self.accounts.find_by_email(email).await?.is_some() {
            self.audit.emit(
                self.audit_auth("registration", meta)
                    .user(email)
                    .reason("email already registered"),
            );
            return Err(AuthError::AlreadyRegistered.into());
        }

        let hash = self.credentials.hash(password)?;
        let mut account = AccountRecord::new(email, hash, role);
        self.accounts.create(&account).await?;

        let session = self.open_session(&mut account).await?;
        self.accounts.update_security_state(&account).await?;

        self.audit.emit(
            self.audit_auth("registration", meta)
                .user(account.id.to_string())
                .succeeded(),
        );
        info!(user_id = %account.id, "account registered");

        Ok(session)
    }

    /// Exchange a refresh token for a fresh access token. The refresh token
    /// stays valid; it authorizes exactly this operation and nothing else.
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<String, AppError> {
        let claims = self.tokens.decode(refresh_token)?;
        if !TokenService::check_kind(&claims, TokenKind::Refresh) {
            return Err(AuthError::InvalidToken.into());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let account = self
            .accounts
            .find_by_id(user_id)
            .await?
            .filter(|a| a.status == AccountStatus::Active)
            .ok_or(AuthError::InvalidToken)?;

        self.tokens.issue_access(&claims.sub, &account.role)
    }

    /// End the subject's current session.
    pub async fn logout(&self, user_id: Uuid, meta: &RequestMeta) -> Result<(), AppError> {
        if let Some(mut account) = self.accounts.find_by_id(user_id).await? {
            if let Some(session_id) = account.current_session_id.take() {
                self.sessions.delete(&session_id).await?;
                self.accounts.update_security_state(&account).await?;
            }
        }

        self.audit.emit(
            self.audit_auth("logout", meta)
                .user(user_id.to_string())
                .succeeded(),
        );
        Ok(())
    }

    /// Begin MFA enrollment. The secret is persisted but inert: it grants
    /// nothing until [`mfa_confirm`](Self::mfa_confirm) verifies a code.
    pub async fn mfa_setup(
        &self,
        user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<MfaEnrollment, AppError> {
        let mut account = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if account.mfa_enabled {
            return Err(AppError::Internal("MFA is already enabled".to_string()));
        }

        let secret = MfaService::generate_secret();
        let provisioning_uri = self.mfa.provisioning_uri(&secret, &account.email)?;
        let backup_codes = MfaService::generate_backup_codes();

        let encrypted: Result<Vec<String>, AppError> = backup_codes
            .iter()
            .map(|code| self.encryption.encrypt(code))
            .collect();

        account.mfa_secret = Some(secret.clone());
        account.backup_codes = Some(encrypted?);
        self.accounts.update_security_state(&account).await?;

        self.audit.emit(
            self.audit_auth("mfa_enrollment", meta)
                .user(account.id.to_string())
                .succeeded()
                .reason("enrollment started, pending verification"),
        );
        info!(user_id = %account.id, "mfa enrollment started");

        // Plaintext backup codes leave the core exactly once, here.
        Ok(MfaEnrollment {
            secret,
            provisioning_uri,
            backup_codes,
        })
    }

    /// Confirm enrollment with a first valid code; only then does MFA start
    /// gating logins.
    pub async fn mfa_confirm(
        &self,
        user_id: Uuid,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<(), AppError> {
        let mut account = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let secret = account
            .mfa_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("MFA enrollment not started".to_string()))?;

        if !self
            .mfa
            .verify_code(secret, code, self.config.mfa_window_tolerance)?
        {
            self.audit.emit(
                self.audit_auth("mfa_enrollment", meta)
                    .user(account.id.to_string())
                    .reason("invalid mfa code"),
            );
            return Err(AuthError::InvalidMfaCode.into());
        }

        account.mfa_enabled = true;
        self.accounts.update_security_state(&account).await?;

        let mut event = AuditEvent::security("mfa_enabled", meta.ip_address.clone())
            .user(account.id.to_string())
            .succeeded();
        if let Some(id) = meta.correlation_id {
            event = event.correlated(id);
        }
        self.audit.emit(event);
        info!(user_id = %account.id, "mfa enabled");

        Ok(())
    }

    /// Disable MFA and discard the secret and backup codes.
    pub async fn mfa_disable(&self, user_id: Uuid, meta: &RequestMeta) -> Result<(), AppError> {
        let mut account = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        account.mfa_enabled = false;
        account.mfa_secret = None;
        account.backup_codes = None;
        self.accounts.update_security_state(&account).await?;

        let mut event = AuditEvent::security("mfa_disabled", meta.ip_address.clone())
            .user(account.id.to_string())
            .succeeded();
        if let Some(id) = meta.correlation_id {
            event = event.correlated(id);
        }
        self.audit.emit(event);

        Ok(())
    }

    /// Reset failure state, issue tokens, create the session and point the
    /// account at it.
    async fn open_session(
        &self,
        account: &mut AccountRecord,
    ) -> Result<AuthenticatedSession, AppError> {
        account.failed_login_attempts = 0;
        account.last_failed_login = None;
        account.locked_until = None;

        let access_token = self
            .tokens
            .issue_access(&account.id.to_string(), &account.role)?;
        let refresh_token = self
            .tokens
            .issue_refresh(&account.id.to_string(), &account.role)?;

        let session_id = generate_session_id();
        let record = SessionRecord::new(account.id, account.email.clone(), account.role.clone());
        self.sessions.create(&session_id, &record, None).await?;

        account.current_session_id = Some(session_id.clone());
        account.last_login = Some(Utc::now());

        Ok(AuthenticatedSession {
            user_id: account.id,
            role: account.role.clone(),
            access_token,
            refresh_token,
            session_id,
            expires_in: self.tokens.access_ttl().num_seconds(),
        })
    }
}
