//! Error types for SSO bearer token operations.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Normalized errors across the device-authorization and refresh flows.
///
/// `AuthorizationPending` and `SlowDown` are protocol pacing signals — they
/// are consumed inside the poll loop and never escape
/// [`crate::device::DeviceAuthorizationFlow::run`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization pending")]
    AuthorizationPending,
    #[error("Slow down")]
    SlowDown,
    #[error("Expired or invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Device code expired")]
    ExpiredToken,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Client registration failed: {0}")]
    Registration(String),
    #[error("Login cancelled")]
    Cancelled,
    #[error("Service error: {0}")]
    Service(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// True for failures that force the session to `NOT_AUTHENTICATED` and
    /// require an interactive re-login; transient network and service errors
    /// are not terminal.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(
            self,
            Self::InvalidGrant(_)
                | Self::InvalidRequest(_)
                | Self::ExpiredToken
                | Self::NotAuthenticated
                | Self::Registration(_)
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
