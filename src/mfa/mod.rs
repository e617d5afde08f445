//! Time-based one-time passwords and backup codes.
//!
//! Codes follow RFC 6238: SHA-1, 6 digits, 30-second steps. Verification
//! accepts a bounded number of adjacent steps (the configured skew) to
//! absorb clock drift; that window is a deliberate, bounded replay
//! allowance, not unlimited tolerance.

use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AppError;

/// TOTP step length in seconds.
pub const TOTP_STEP: u64 = 30;

/// Digits per code.
pub const TOTP_DIGITS: usize = 6;

/// Number of backup codes issued per enrollment.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Length of a backup code in hex characters.
const BACKUP_CODE_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct MfaService {
    issuer: String,
}

impl MfaService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a new base32-encoded TOTP secret.
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    fn build_totp(
        &self,
        secret: &str,
        account_label: &str,
        skew: u8,
    ) -> Result<TOTP, AppError> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AppError::Internal(format!("invalid TOTP secret: {}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            skew,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| AppError::Internal(format!("TOTP setup failed: {}", e)))
    }

    /// `otpauth://` URI for the account, for QR rendering by the caller.
    pub fn provisioning_uri(&self, secret: &str, account_label: &str) -> Result<String, AppError> {
        let totp = self.build_totp(secret, account_label, 1)?;
        Ok(totp.get_url())
    }

    /// Verify a code against the current time, accepting `window_tolerance`
    /// steps of skew either side.
    pub fn verify_code(
        &self,
        secret: &str,
        code: &str,
        window_tolerance: u8,
    ) -> Result<bool, AppError> {
        let totp = self.build_totp(secret, "account", window_tolerance)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Verify a code at an explicit Unix timestamp. Test seam for the skew
    /// window; production callers use [`verify_code`](Self::verify_code).
    pub fn verify_code_at(
        &self,
        secret: &str,
        code: &str,
        window_tolerance: u8,
        timestamp: u64,
    ) -> Result<bool, AppError> {
        let totp = self.build_totp(secret, "account", window_tolerance)?;
        Ok(totp.check(code, timestamp))
    }

    /// Code for an explicit Unix timestamp. Test seam.
    pub fn code_at(&self, secret: &str, timestamp: u64) -> Result<String, AppError> {
        let totp = self.build_totp(secret, "account", 1)?;
        Ok(totp.generate(timestamp))
    }

    /// Generate single-use recovery codes: fixed-length uppercase hex,
    /// independent of the TOTP secret. Callers must store them encrypted;
    /// the plaintext is returned exactly once, here.
    pub fn generate_backup_codes() -> Vec<String> {
        Self::generate_backup_codes_count(BACKUP_CODE_COUNT)
    }

    pub fn generate_backup_codes_count(count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let bytes: [u8; BACKUP_CODE_LEN / 2] = rng.gen();
                hex::encode(bytes).to_uppercase()
            })
            .collect()
    }

    /// Whether a stored secret is still parseable base32.
    pub fn is_valid_secret(secret: &str) -> bool {
        Secret::Encoded(secret.to_string()).to_bytes().is_ok()
    }
}
