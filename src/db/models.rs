use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Pending,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Pending => "pending",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "pending" => Ok(AccountStatus::Pending),
            "suspended" => Ok(AccountStatus::Suspended),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Per-account security state. This is the only slice of the account the
/// core reads or writes; profile data stays with the persistence
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    /// Argon2id PHC string. Never logged, never exported.
    pub password_hash: String,
    pub status: AccountStatus,
    pub failed_login_attempts: u32,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub mfa_enabled: bool,
    /// Present once enrollment begins; inert until the first successful
    /// code verification flips `mfa_enabled`.
    pub mfa_secret: Option<String>,
    /// Backup codes, each encrypted by the Encryption Service.
    pub backup_codes: Option<Vec<String>>,
    pub current_session_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            role: role.into(),
            password_hash: password_hash.into(),
            status: AccountStatus::Active,
            failed_login_attempts: 0,
            last_failed_login: None,
            locked_until: None,
            mfa_enabled: false,
            mfa_secret: None,
            backup_codes: None,
            current_session_id: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a lockout is currently in force.
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| until > Utc::now())
    }
}
