//! Field-level encryption and data masking.
//!
//! Sensitive strings (MFA backup codes, account numbers) are sealed with
//! AES-256-GCM under a process-wide key derived once from the configured
//! seed. Tampered or foreign ciphertext fails closed with
//! [`AppError::Decryption`]; corrupted plaintext is never returned.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AppError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

const MASK_CHAR: char = '*';

#[derive(Clone)]
pub struct EncryptionService {
    key: [u8; KEY_SIZE],
}

// Manual Debug so the key can never end up in logs or error output.
impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    /// Derive the symmetric key from the configured seed. The derivation is
    /// a fixed-output one-way hash, so the seed itself never has to be a
    /// valid key length.
    pub fn new(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a string. Output is `base64(nonce || ciphertext)` with a
    /// fresh random nonce per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::Internal("encryption key setup failed".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a string produced by [`encrypt`](Self::encrypt). Any
    /// malformed input, tampered byte, or key mismatch yields
    /// [`AppError::Decryption`] with no detail about which check failed.
    pub fn decrypt(&self, sealed: &str) -> Result<String, AppError> {
        let bytes = BASE64.decode(sealed).map_err(|_| AppError::Decryption)?;
        if bytes.len() <= NONCE_SIZE {
            return Err(AppError::Decryption);
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| AppError::Decryption)?;
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| AppError::Decryption)
    }

    /// Deterministic SHA-256 hex digest, for equality-searchable fields
    /// such as account numbers.
    pub fn hash_data(data: &str) -> String {
        hex::encode(Sha256::digest(data.as_bytes()))
    }

    /// Mask an account number, revealing only the last 4 characters.
    /// Values at or below the reveal length are fully masked.
    pub fn mask_account(value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() <= 4 {
            return MASK_CHAR.to_string().repeat(chars.len());
        }
        let masked = MASK_CHAR.to_string().repeat(chars.len() - 4);
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", masked, tail)
    }

    /// Mask a phone number, revealing the first 3 and last 3 characters.
    /// Values at or below the reveal length are fully masked.
    pub fn mask_phone(value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() <= 6 {
            return MASK_CHAR.to_string().repeat(chars.len());
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        let masked = MASK_CHAR.to_string().repeat(chars.len() - 6);
        format!("{}{}{}", head, masked, tail)
    }
}
