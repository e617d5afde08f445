//! Password hashing and strength policy.
//!
//! Hashing uses Argon2id with a per-call random salt, so two hashes of the
//! same password never compare equal; matching goes through the algorithm's
//! constant-time verify only.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Serialize;

use crate::error::AppError;

/// Minimum password length accepted by the strength policy.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Symbols that satisfy the special-character rule.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLabel {
    Strong,
    Moderate,
    Weak,
}

/// Result of a strength assessment: `valid` with the list of violated rules.
#[derive(Debug, Clone, Serialize)]
pub struct StrengthReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub strength: StrengthLabel,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialService;

impl CredentialService {
    pub fn new() -> Self {
        Self
    }

    /// Hash a password with Argon2id. The salt is embedded in the returned
    /// PHC string.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Verify a password against a PHC hash string.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("malformed password hash: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "password verification failed: {}",
                e
            ))),
        }
    }

    /// Check a password against the fixed strength policy. Each violated
    /// rule adds one human-readable issue string.
    pub fn assess_strength(&self, password: &str) -> StrengthReport {
        let mut issues = Vec::new();

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            issues.push(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            ));
        }
        if !password.chars().any(|c| c.is_uppercase()) {
            issues.push("Password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            issues.push("Password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            issues.push("Password must contain at least one digit".to_string());
        }
        if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
            issues.push("Password must contain at least one special character".to_string());
        }

        let strength = match issues.len() {
            0 => StrengthLabel::Strong,
            1..=2 => StrengthLabel::Moderate,
            _ => StrengthLabel::Weak,
        };

        StrengthReport {
            valid: issues.is_empty(),
            issues,
            strength,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    #[test]
    fn test_hash_and_verify() {
        let svc = CredentialService::new();
        let hash = svc.hash("Correct-Horse-Battery-1!").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(svc.verify("Correct-Horse-Battery-1!", &hash).unwrap());
        assert!(!svc.verify("wrong password", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_hashes() {
        let svc = CredentialService::new();
        let hash1 = svc.hash("Repeatable-Passw0rd!").unwrap();
        let hash2 = svc.hash("Repeatable-Passw0rd!").unwrap();

        // Salts differ, hashes differ, both still verify.
        assert_ne!(hash1, hash2);
        assert!(svc.verify("Repeatable-Passw0rd!", &hash1).unwrap());
        assert!(svc.verify("Repeatable-Passw0rd!", &hash2).unwrap());
    }

    #[test]
    fn test_verify_random_samples() {
        let svc = CredentialService::new();
        let mut rng = rand::thread_rng();

        // Argon2 is deliberately slow, so sample rather than exhaust.
        for _ in 0..8 {
            let password: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();
            let other: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();

            let hash = svc.hash(&password).unwrap();
            assert!(svc.verify(&password, &hash).unwrap());
            if password != other {
                assert!(!svc.verify(&other, &hash).unwrap());
            }
        }
    }

    #[test]
    fn test_strength_policy_valid_password() {
        let report = CredentialService::new().assess_strength("Str0ng-enough-pw!");
        assert!(report.valid);
        assert!(report.issues.is_empty());
        assert_eq!(report.strength, StrengthLabel::Strong);
    }

    #[test]
    fn test_strength_policy_single_missing_rule() {
        let svc = CredentialService::new();

        // Each password violates exactly one rule.
        let cases = [
            ("Sh0rt-pw!", "at least 12 characters"),
            ("n0-uppercase-here!", "uppercase letter"),
            ("N0-LOWERCASE-HERE!", "lowercase letter"),
            ("No-Digits-Here-At-All!", "digit"),
            ("NoSpecialChars0Here", "special character"),
        ];

        for (password, expected_fragment) in cases {
            let report = svc.assess_strength(password);
            assert!(!report.valid, "{} should be invalid", password);
            assert_eq!(report.issues.len(), 1, "{}: {:?}", password, report.issues);
            assert!(
                report.issues[0].contains(expected_fragment),
                "{}: {:?}",
                password,
                report.issues
            );
            assert_eq!(report.strength, StrengthLabel::Moderate);
        }
    }

    #[test]
    fn test_strength_policy_weak_label() {
        let report = CredentialService::new().assess_strength("abc");
        assert!(!report.valid);
        assert!(report.issues.len() >= 3);
        assert_eq!(report.strength, StrengthLabel::Weak);
    }
}
