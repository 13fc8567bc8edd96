//! Token and registration value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer access token for one SSO identity.
///
/// Immutable value: every refresh produces a new token that supersedes the
/// previous one. Identity is the session key, not the token material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub start_url: String,
    pub region: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Dynamically registered OAuth client for one identity-provider region.
///
/// One per region, not per user; reused across sessions and restarts until
/// the secret expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub expires_at: DateTime<Utc>,
}

impl ClientRegistration {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Identifies one cache slot and one bearer token session.
///
/// Scopes are sorted on construction so `(url, region, [a, b])` and
/// `(url, region, [b, a])` name the same slot. A scope change is a different
/// key, never an in-place mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    start_url: String,
    region: String,
    scopes: Vec<String>,
}

impl SessionKey {
    pub fn new(
        start_url: impl Into<String>,
        region: impl Into<String>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        scopes.sort();
        Self {
            start_url: start_url.into(),
            region: region.into(),
            scopes,
        }
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Canonical form used by cache adapters to derive storage keys.
    pub fn canonical(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.start_url,
            self.region,
            self.scopes.join(",")
        )
    }
}

/// Device authorization waiting on the user's browser step.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Authentication state derived from the current token and the clock.
///
/// Never stored; recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BearerTokenAuthState {
    Authorized,
    NeedsRefresh,
    NotAuthenticated,
}

impl BearerTokenAuthState {
    /// Pure function of `(now, token)`.
    pub fn derive(token: Option<&AccessToken>, now: DateTime<Utc>) -> Self {
        match token {
            None => Self::NotAuthenticated,
            Some(token) if token.is_expired(now) => {
                if token.refresh_token.is_some() {
                    Self::NeedsRefresh
                } else {
                    Self::NotAuthenticated
                }
            }
            Some(_) => Self::Authorized,
        }
    }
}
