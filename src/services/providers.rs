// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider profile normalization.
//!
//! Each provider returns its own profile shape. These functions map them onto
//! the `ExternalIdentityAssertion` contract, applying the fallbacks each
//! provider needs (GitHub may hide the email, Graph may omit `mail`).
//! Nothing here performs network I/O; the handshake happens upstream.

use crate::error::AppError;
use crate::models::user::email_local_part;
use crate::models::{ExternalIdentityAssertion, Provider};
use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /auth/callback/{provider}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCallback {
    pub profile: Value,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// GitHub `/user` profile. `id` is numeric on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: Option<Value>,
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Google OIDC userinfo.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    #[serde(alias = "id")]
    pub sub: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

/// Microsoft Graph `/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftProfile {
    pub id: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
    pub display_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Provider subject ids may arrive as strings or numbers.
fn subject_id(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_profile<T: for<'de> Deserialize<'de>>(
    provider: &Provider,
    profile: Value,
) -> Result<T, AppError> {
    serde_json::from_value(profile)
        .map_err(|e| AppError::ProviderFailure(format!("Malformed {} profile: {}", provider, e)))
}

fn missing(provider: &Provider, what: &str) -> AppError {
    AppError::ProviderFailure(format!("Missing {} in {} profile", what, provider))
}

impl GithubProfile {
    pub fn into_assertion(
        self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<ExternalIdentityAssertion, AppError> {
        let id = subject_id(self.id).ok_or_else(|| missing(&Provider::Github, "id"))?;
        let login = non_empty(self.login);

        // GitHub hides private emails; fall back to a stable synthetic address.
        let email = non_empty(self.email).unwrap_or_else(|| match &login {
            Some(login) => format!("{}@github.local", login),
            None => format!("github_{}@github.local", id),
        });

        let name = login
            .or_else(|| non_empty(self.name))
            .unwrap_or_else(|| email_local_part(&email).to_string());

        Ok(ExternalIdentityAssertion {
            provider: Provider::Github.to_string(),
            provider_subject_id: id,
            email,
            name: Some(name),
            avatar_url: non_empty(self.avatar_url),
            provider_access_token: access_token,
            provider_refresh_token: refresh_token,
        })
    }
}

impl GoogleProfile {
    pub fn into_assertion(
        self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<ExternalIdentityAssertion, AppError> {
        let sub = non_empty(self.sub).ok_or_else(|| missing(&Provider::Google, "sub"))?;
        let email = non_empty(self.email).ok_or_else(|| missing(&Provider::Google, "email"))?;

        let given = format!(
            "{} {}",
            self.given_name.unwrap_or_default(),
            self.family_name.unwrap_or_default()
        );
        let name = non_empty(self.name)
            .or_else(|| non_empty(Some(given)))
            .unwrap_or_else(|| email_local_part(&email).to_string());

        Ok(ExternalIdentityAssertion {
            provider: Provider::Google.to_string(),
            provider_subject_id: sub,
            email,
            name: Some(name),
            avatar_url: non_empty(self.picture),
            provider_access_token: access_token,
            provider_refresh_token: refresh_token,
        })
    }
}

impl MicrosoftProfile {
    pub fn into_assertion(
        self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<ExternalIdentityAssertion, AppError> {
        let id = non_empty(self.id).ok_or_else(|| missing(&Provider::Msal, "id"))?;
        let email = non_empty(self.mail)
            .or_else(|| non_empty(self.user_principal_name))
            .ok_or_else(|| missing(&Provider::Msal, "mail"))?;

        Ok(ExternalIdentityAssertion {
            provider: Provider::Msal.to_string(),
            provider_subject_id: id,
            name: non_empty(self.display_name),
            email,
            avatar_url: None,
            provider_access_token: access_token,
            provider_refresh_token: refresh_token,
        })
    }
}

/// Normalize a provider callback into an assertion.
///
/// Only the built-in providers have a known profile shape; any other tag must
/// use the assertion intake endpoint instead.
pub fn normalize(
    provider: &Provider,
    callback: ProviderCallback,
) -> Result<ExternalIdentityAssertion, AppError> {
    let ProviderCallback {
        profile,
        access_token,
        refresh_token,
    } = callback;

    match provider {
        Provider::Github => parse_profile::<GithubProfile>(provider, profile)?
            .into_assertion(access_token, refresh_token),
        Provider::Google => parse_profile::<GoogleProfile>(provider, profile)?
            .into_assertion(access_token, refresh_token),
        Provider::Msal => parse_profile::<MicrosoftProfile>(provider, profile)?
            .into_assertion(access_token, refresh_token),
        Provider::Other(tag) => Err(AppError::BadRequest(format!(
            "No profile normalizer for provider '{}'",
            tag
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn callback(profile: Value) -> ProviderCallback {
        ProviderCallback {
            profile,
            access_token: Some("gho_token".to_string()),
            refresh_token: None,
        }
    }

    #[test]
    fn test_github_numeric_id_and_public_email() {
        let assertion = normalize(
            &Provider::Github,
            callback(json!({
                "id": 42,
                "login": "octocat",
                "email": "octo@example.com",
                "avatar_url": "https://avatars.example/42"
            })),
        )
        .unwrap();

        assert_eq!(assertion.provider, "github");
        assert_eq!(assertion.provider_subject_id, "42");
        assert_eq!(assertion.email, "octo@example.com");
        assert_eq!(assertion.name.as_deref(), Some("octocat"));
        assert_eq!(assertion.provider_access_token.as_deref(), Some("gho_token"));
    }

    #[test]
    fn test_github_email_fallbacks() {
        let with_login = normalize(
            &Provider::Github,
            callback(json!({"id": 7, "login": "ghost"})),
        )
        .unwrap();
        assert_eq!(with_login.email, "ghost@github.local");

        let bare = normalize(&Provider::Github, callback(json!({"id": 7}))).unwrap();
        assert_eq!(bare.email, "github_7@github.local");
        assert_eq!(bare.name.as_deref(), Some("github_7"));
    }

    #[test]
    fn test_github_missing_id_is_provider_failure() {
        let result = normalize(&Provider::Github, callback(json!({"login": "ghost"})));
        assert!(matches!(result, Err(AppError::ProviderFailure(_))));
    }

    #[test]
    fn test_google_requires_email() {
        let result = normalize(&Provider::Google, callback(json!({"sub": "g-1"})));
        assert!(matches!(result, Err(AppError::ProviderFailure(_))));

        let assertion = normalize(
            &Provider::Google,
            callback(json!({
                "sub": "g-1",
                "email": "a@x.com",
                "given_name": "Ada",
                "family_name": "Lovelace",
                "picture": "https://pics.example/a"
            })),
        )
        .unwrap();
        assert_eq!(assertion.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(assertion.avatar_url.as_deref(), Some("https://pics.example/a"));
    }

    #[test]
    fn test_microsoft_upn_fallback() {
        let assertion = normalize(
            &Provider::Msal,
            callback(json!({
                "id": "ms-1",
                "userPrincipalName": "ada@contoso.com",
                "displayName": "Ada"
            })),
        )
        .unwrap();
        assert_eq!(assertion.provider, "msal");
        assert_eq!(assertion.email, "ada@contoso.com");
    }

    #[test]
    fn test_malformed_profile_is_provider_failure() {
        let result = normalize(&Provider::Google, callback(json!(["not", "an", "object"])));
        assert!(matches!(result, Err(AppError::ProviderFailure(_))));
    }

    #[test]
    fn test_custom_provider_has_no_normalizer() {
        let result = normalize(
            &Provider::Other("gitlab".to_string()),
            callback(json!({"id": 1})),
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
