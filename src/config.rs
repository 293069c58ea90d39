// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and kept in memory.

use crate::time_utils::parse_duration;
use hkdf::Hkdf;
use sha2::Sha256;
use std::env;
use std::time::Duration;

/// HKDF info label used when the refresh secret is derived from `JWT_SECRET`.
const REFRESH_SECRET_INFO: &[u8] = b"identity-gateway refresh-token secret v1";

/// Shortest accepted HMAC key (HS256 wants at least the digest size).
const MIN_SECRET_BYTES: usize = 32;

/// What happens to a refresh token once it has been exchanged for a new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Blacklist the presented refresh token for the rest of its lifetime.
    Rotate,
    /// Leave the presented refresh token valid until its natural expiry.
    Sliding,
}

impl std::str::FromStr for RefreshPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" | "rotate-and-revoke" => Ok(RefreshPolicy::Rotate),
            "sliding" | "sliding-window" => Ok(RefreshPolicy::Sliding),
            _ => Err(ConfigError::Invalid("REFRESH_TOKEN_POLICY")),
        }
    }
}

/// Which identity repository implementation backs users and links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Identity repository backend
    pub identity_backend: IdentityBackend,
    /// Redis URL for the session store; in-process store when unset
    pub redis_url: Option<String>,

    // --- Token lifetimes ---
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// How long the issued pair stays in the session store
    pub token_cache_ttl: Duration,
    /// How long the session payload stays in the session store
    pub session_ttl: Duration,

    // --- Failure policy ---
    /// Upper bound for every repository and store call
    pub store_timeout: Duration,
    /// Refresh token handling on refresh
    pub refresh_policy: RefreshPolicy,
    /// Treat a blacklist lookup failure as "not revoked" (accepted risk)
    pub blacklist_fail_open: bool,

    // --- Secrets ---
    /// HS256 key for access tokens
    pub access_token_secret: Vec<u8>,
    /// HS256 key for refresh tokens
    pub refresh_token_secret: Vec<u8>,
    /// HMAC key that provider collaborators sign assertion bodies with
    pub assertion_signing_key: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            identity_backend: IdentityBackend::Memory,
            redis_url: None,
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            token_cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            session_ttl: Duration::from_secs(60 * 60),
            store_timeout: Duration::from_secs(2),
            refresh_policy: RefreshPolicy::Rotate,
            blacklist_fail_open: false,
            access_token_secret: b"test_access_key_32_bytes_minimum!".to_vec(),
            refresh_token_secret: b"test_refresh_key_32_bytes_minimum".to_vec(),
            assertion_signing_key: b"test_assertion_signing_key".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let access_token_secret = parse_secret("JWT_SECRET", env::var("JWT_SECRET").ok())?;

        let refresh_token_secret = match env::var("JWT_REFRESH_SECRET") {
            Ok(v) if !v.trim().is_empty() => parse_secret("JWT_REFRESH_SECRET", Some(v))?,
            _ => {
                tracing::info!("JWT_REFRESH_SECRET not set, deriving it from JWT_SECRET");
                derive_refresh_secret(&access_token_secret)?
            }
        };

        let identity_backend = match env::var("IDENTITY_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => IdentityBackend::Firestore,
            "memory" => IdentityBackend::Memory,
            _ => return Err(ConfigError::Invalid("IDENTITY_BACKEND")),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            identity_backend,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),

            access_token_ttl: duration_var("JWT_EXPIRES_IN", "15m")?,
            refresh_token_ttl: duration_var("JWT_REFRESH_EXPIRES_IN", "7d")?,
            token_cache_ttl: duration_var("TOKEN_CACHE_TTL", "7d")?,
            session_ttl: duration_var("SESSION_TTL", "1h")?,

            store_timeout: Duration::from_millis(
                env::var("STORE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::Invalid("STORE_TIMEOUT_MS"))?,
            ),
            refresh_policy: env::var("REFRESH_TOKEN_POLICY")
                .unwrap_or_else(|_| "rotate".to_string())
                .parse()?,
            blacklist_fail_open: env::var("BLACKLIST_FAIL_OPEN")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),

            access_token_secret,
            refresh_token_secret,
            assertion_signing_key: parse_secret(
                "ASSERTION_SIGNING_KEY",
                env::var("ASSERTION_SIGNING_KEY").ok(),
            )?,
        })
    }
}

/// Check a raw HMAC key. Unset is `Missing`; blank or shorter than
/// `MIN_SECRET_BYTES` after trimming is `Invalid`.
fn parse_secret(name: &'static str, raw: Option<String>) -> Result<Vec<u8>, ConfigError> {
    let raw = raw.ok_or(ConfigError::Missing(name))?;
    let secret = raw.trim();
    if secret.len() < MIN_SECRET_BYTES {
        return Err(ConfigError::Invalid(name));
    }
    Ok(secret.as_bytes().to_vec())
}

/// Read a duration variable, falling back to `default` when unset.
fn duration_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match parse_duration(&raw) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::Invalid(name)),
    }
}

/// Derive a refresh-token key from the access-token key so the two roles never
/// share a secret even when only one is configured.
pub fn derive_refresh_secret(access_secret: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let hk = Hkdf::<Sha256>::new(None, access_secret);
    let mut okm = [0u8; 32];
    hk.expand(REFRESH_SECRET_INFO, &mut okm)
        .map_err(|_| ConfigError::Invalid("JWT_SECRET"))?;
    Ok(okm.to_vec())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
