use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Seconds until the current window expires.
        retry_after: u64,
    },

    #[error("Decryption failed")]
    Decryption,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Expected authentication rejections. These are outcomes, not faults: the
/// guard and gate return them on every bad login or token, so they carry no
/// extra context that could leak to a caller.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("MFA required")]
    MfaRequired,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password does not meet the strength policy")]
    WeakPassword { issues: Vec<String> },

    #[error("Email already registered")]
    AlreadyRegistered,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::Database(DatabaseError::NotFound),
            sqlx::Error::Database(ref e) if e.is_unique_violation() => {
                AppError::Database(DatabaseError::Duplicate)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionError(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl AppError {
    /// Message safe to return to the caller. Login rejections collapse into
    /// one string so responses cannot be used to enumerate accounts or to
    /// detect the lockout threshold; the audit sink receives the precise
    /// variant instead.
    pub fn client_message(&self) -> &'static str {
        match self {
            AppError::Auth(AuthError::InvalidCredentials)
            | AppError::Auth(AuthError::AccountLocked { .. }) => "Invalid credentials",
            AppError::Auth(AuthError::MfaRequired) => "MFA code required",
            AppError::Auth(AuthError::InvalidMfaCode) => "Invalid MFA code",
            AppError::Auth(AuthError::InvalidToken) => "Invalid or expired token",
            AppError::Auth(AuthError::WeakPassword { .. }) => {
                "Password does not meet the strength policy"
            }
            AppError::Auth(AuthError::AlreadyRegistered) => "Email already registered",
            AppError::RateLimitExceeded { .. } => "Rate limit exceeded. Please try again later.",
            AppError::Decryption
            | AppError::BackendUnavailable(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "Internal server error",
        }
    }

    /// HTTP status the surrounding transport should map this to. The core
    /// itself speaks no wire protocol; this is a hint for the gateway layer.
    pub fn status_hint(&self) -> u16 {
        match self {
            AppError::Auth(AuthError::InvalidCredentials)
            | AppError::Auth(AuthError::MfaRequired)
            | AppError::Auth(AuthError::InvalidMfaCode)
            | AppError::Auth(AuthError::InvalidToken) => 401,
            AppError::Auth(AuthError::AccountLocked { .. }) => 403,
            AppError::Auth(AuthError::WeakPassword { .. })
            | AppError::Auth(AuthError::AlreadyRegistered) => 400,
            AppError::RateLimitExceeded { .. } => 429,
            AppError::BackendUnavailable(_) => 503,
            AppError::Database(DatabaseError::NotFound) => 404,
            _ => 500,
        }
    }

    /// Retry-after hint in seconds, present only for rate-limit rejections.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
