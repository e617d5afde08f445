//! Signed, expiring access and refresh tokens.
//!
//! Tokens are self-contained HS256 JWTs carrying identity and role claims.
//! Access and refresh tokens are structurally identical except for the
//! `kind` claim and the unique `jti` on refresh tokens; a refresh token
//! authorizes exactly one operation — minting a new access token — so
//! callers must check `kind` explicitly. Rotating the signing secret
//! invalidates all outstanding tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account identifier.
    pub sub: String,
    pub role: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Unique id, present on refresh tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Open extension map for forward compatibility.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<String>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Issue an access token with the configured TTL (default 30 minutes).
    pub fn issue_access(&self, sub: &str, role: &str) -> Result<String, AppError> {
        self.issue_with_ttl(sub, role, TokenKind::Access, self.access_ttl)
    }

    /// Issue a refresh token with the configured TTL (default 7 days) and a
    /// fresh unique id.
    pub fn issue_refresh(&self, sub: &str, role: &str) -> Result<String, AppError> {
        self.issue_with_ttl(sub, role, TokenKind::Refresh, self.refresh_ttl)
    }

    /// Issue a token with an explicit TTL.
    pub fn issue_with_ttl(
        &self,
        sub: &str,
        role: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: match kind {
                TokenKind::Refresh => Some(Uuid::new_v4().to_string()),
                TokenKind::Access => None,
            },
            extra: HashMap::new(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    /// Decode and validate a token. Expiry is checked unconditionally, with
    /// zero leeway; bad signature, malformed structure and expiry all
    /// collapse into the same externally visible error so callers cannot
    /// learn which check failed.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AuthError::InvalidToken.into()
        })
    }

    /// Whether the claims carry the expected token kind.
    pub fn check_kind(claims: &Claims, expected: TokenKind) -> bool {
        claims.kind == expected
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test_secret", Duration::minutes(30), Duration::days(7))
    }

    #[test]
    fn test_access_token_round_trip() {
        let svc = service();
        let token = svc.issue_access("user-1", "customer").unwrap();
        let claims = svc.decode(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.jti.is_none());
        assert!(claims.exp > claims.iat);
        assert!(TokenService::check_kind(&claims, TokenKind::Access));
        assert!(!TokenService::check_kind(&claims, TokenKind::Refresh));
    }

    #[test]
    fn test_refresh_token_has_unique_id() {
        let svc = service();
        let a = svc.decode(&svc.issue_refresh("user-1", "customer").unwrap()).unwrap();
        let b = svc.decode(&svc.issue_refresh("user-1", "customer").unwrap()).unwrap();

        assert_eq!(a.kind, TokenKind::Refresh);
        assert!(a.jti.is_some());
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let token = svc
            .issue_with_ttl("user-1", "customer", TokenKind::Access, Duration::seconds(-60))
            .unwrap();

        assert!(matches!(
            svc.decode(&token),
            Err(AppError::Auth(AuthError::InvalidToken))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = service();
        let other = TokenService::new("other_secret", Duration::minutes(30), Duration::days(7));

        let token = svc.issue_access("user-1", "customer").unwrap();
        assert!(matches!(
            other.decode(&token),
            Err(AppError::Auth(AuthError::InvalidToken))
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let svc = service();
        for garbage in ["", "not-a-jwt", "a.b.c", "ey.ey.ey"] {
            assert!(matches!(
                svc.decode(garbage),
                Err(AppError::Auth(AuthError::InvalidToken))
            ));
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let svc = service();
        let token = svc.issue_access("user-1", "customer").unwrap();

        // Flip a character in the payload segment; the signature no longer
        // matches.
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let mut payload: Vec<u8> = parts[1].clone().into_bytes();
        payload[0] = if payload[0] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(payload).unwrap();
        let tampered = parts.join(".");

        assert!(matches!(
            svc.decode(&tampered),
            Err(AppError::Auth(AuthError::InvalidToken))
        ));
    }

    #[test]
    fn test_extra_claims_survive_decode() {
        // Tokens minted by older or newer releases may carry claims this
        // version does not model; they land in the extension map.
        let svc = service();
        let now = Utc::now();
        let claims = Claims {
            sub: "user-1".to_string(),
            role: "admin".to_string(),
            kind: TokenKind::Access,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(5)).timestamp(),
            jti: None,
            extra: HashMap::from([(
                "tenant".to_string(),
                serde_json::Value::String("acme".to_string()),
            )]),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        let decoded = svc.decode(&token).unwrap();
        assert_eq!(
            decoded.extra.get("tenant"),
            Some(&serde_json::Value::String("acme".to_string()))
        );
    }
}
