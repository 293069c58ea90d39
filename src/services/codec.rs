// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signing and verification of local access/refresh tokens (HS256 JWT).

use crate::config::Config;
use crate::error::AppError;
use crate::models::{TokenKind, VerifiedToken};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Token role, `access` or `refresh`
    pub typ: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
}

/// Keys and lifetime for one token role.
#[derive(Clone)]
struct RoleKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl RoleKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Stateless token codec; cheap to clone.
#[derive(Clone)]
pub struct CredentialCodec {
    access: RoleKeys,
    refresh: RoleKeys,
}

impl CredentialCodec {
    pub fn new(
        access_secret: &[u8],
        access_ttl: Duration,
        refresh_secret: &[u8],
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: RoleKeys::new(access_secret, access_ttl),
            refresh: RoleKeys::new(refresh_secret, refresh_ttl),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.access_token_secret,
            config.access_token_ttl,
            &config.refresh_token_secret,
            config.refresh_token_ttl,
        )
    }

    fn keys(&self, kind: TokenKind) -> &RoleKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Configured lifetime of a token role.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.keys(kind).ttl
    }

    /// Sign a token of the given role, valid from now.
    pub fn issue(&self, user_id: Uuid, email: &str, kind: TokenKind) -> Result<String, AppError> {
        self.issue_at(user_id, email, kind, Utc::now())
    }

    /// Sign a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let keys = self.keys(kind);
        let ttl_secs = i64::try_from(keys.ttl.as_secs())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("token lifetime out of range")))?;
        let iat = now.timestamp();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            typ: kind,
            iat,
            exp: iat + ttl_secs,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Verify a token of the given role against the current time.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<VerifiedToken, AppError> {
        self.verify_at(token, kind, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// Signature is checked before expiry, so a forged token that is also
    /// expired reports `InvalidSignature`.
    pub fn verify_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false; // checked below against `now`
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|e| map_jwt_error(e.kind()))?;
        let claims = data.claims;

        if claims.typ != kind {
            return Err(AppError::InvalidSignature);
        }

        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(AppError::MalformedToken)?;
        if now >= expires_at {
            return Err(AppError::ExpiredToken);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::MalformedToken)?;

        Ok(VerifiedToken {
            user_id,
            email: claims.email,
            expires_at,
        })
    }

    /// Check signature and role only. Used by revocation, which must still
    /// identify the owner of a token that has already expired.
    pub fn verify_ignoring_expiry(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<VerifiedToken, AppError> {
        self.verify_at(token, kind, DateTime::<Utc>::MIN_UTC)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AppError {
    match kind {
        ErrorKind::ExpiredSignature => AppError::ExpiredToken,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat => {
            AppError::InvalidSignature
        }
        _ => AppError::MalformedToken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new(
            b"access_secret_for_unit_tests!!!!",
            Duration::from_secs(900),
            b"refresh_secret_for_unit_tests!!!",
            Duration::from_secs(7 * 24 * 3600),
        )
    }

    #[test]
    fn test_access_token_roundtrip() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.issue(user_id, "a@x.com", TokenKind::Access).unwrap();

        let verified = codec.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.email, "a@x.com");
    }

    #[test]
    fn test_access_token_expires_after_ttl() {
        let codec = codec();
        let issued_at = Utc::now();
        let token = codec
            .issue_at(Uuid::new_v4(), "a@x.com", TokenKind::Access, issued_at)
            .unwrap();

        let just_before = issued_at + chrono::Duration::seconds(899);
        assert!(codec.verify_at(&token, TokenKind::Access, just_before).is_ok());

        let at_expiry = issued_at + chrono::Duration::seconds(900);
        assert!(matches!(
            codec.verify_at(&token, TokenKind::Access, at_expiry),
            Err(AppError::ExpiredToken)
        ));
    }

    #[test]
    fn test_roles_do_not_cross_verify() {
        let codec = codec();
        let access = codec.issue(Uuid::new_v4(), "a@x.com", TokenKind::Access).unwrap();
        assert!(matches!(
            codec.verify(&access, TokenKind::Refresh),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_same_secret_wrong_role_is_rejected() {
        let shared = CredentialCodec::new(
            b"shared",
            Duration::from_secs(60),
            b"shared",
            Duration::from_secs(60),
        );
        let refresh = shared.issue(Uuid::new_v4(), "a@x.com", TokenKind::Refresh).unwrap();
        assert!(matches!(
            shared.verify(&refresh, TokenKind::Access),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_token_is_invalid_signature() {
        let codec = codec();
        let token = codec.issue(Uuid::new_v4(), "a@x.com", TokenKind::Access).unwrap();

        // Re-sign the same claims with a different key
        let forged_codec = CredentialCodec::new(
            b"attacker_secret",
            Duration::from_secs(900),
            b"attacker_refresh",
            Duration::from_secs(900),
        );
        let forged = forged_codec
            .issue(Uuid::new_v4(), "a@x.com", TokenKind::Access)
            .unwrap();
        assert!(matches!(
            codec.verify(&forged, TokenKind::Access),
            Err(AppError::InvalidSignature)
        ));

        // Flip the last signature character
        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            codec.verify(&tampered, TokenKind::Access),
            Err(AppError::InvalidSignature) | Err(AppError::MalformedToken)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = codec();
        assert!(matches!(
            codec.verify("not-a-token", TokenKind::Access),
            Err(AppError::MalformedToken)
        ));
        assert!(matches!(
            codec.verify("", TokenKind::Refresh),
            Err(AppError::MalformedToken)
        ));
    }

    #[test]
    fn test_verify_ignoring_expiry_still_checks_signature() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let long_ago = Utc::now() - chrono::Duration::days(30);
        let stale = codec
            .issue_at(user_id, "a@x.com", TokenKind::Access, long_ago)
            .unwrap();

        let verified = codec.verify_ignoring_expiry(&stale, TokenKind::Access).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert!(verified.expires_at < Utc::now());
        assert!(matches!(
            codec.verify_ignoring_expiry(&stale, TokenKind::Refresh),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tokens_issued_in_same_second_differ() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let a = codec.issue_at(user_id, "a@x.com", TokenKind::Refresh, now).unwrap();
        let b = codec.issue_at(user_id, "a@x.com", TokenKind::Refresh, now).unwrap();
        assert_ne!(a, b);
    }
}
