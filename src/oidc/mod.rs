//! OIDC capability consumed by the device-authorization engine.
//!
//! Three calls: register a client, start a device authorization, create a
//! token (device-code or refresh-token grant). [`http::HttpOidcClient`] is
//! the wire implementation; tests and embedders can substitute their own.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use http::HttpOidcClient;

/// OAuth client type used for dynamic registration.
pub const PUBLIC_CLIENT_TYPE: &str = "public";

#[derive(Debug, Clone)]
pub struct RegisterClientRequest {
    pub client_name: String,
    pub client_type: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StartDeviceAuthorizationRequest {
    pub client_id: String,
    pub client_secret: String,
    pub start_url: String,
}

/// Server-issued device authorization. Good for one token, short lived;
/// never cached.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in_secs: u64,
    pub interval_secs: Option<u64>,
}

/// Grant presented to the token endpoint.
#[derive(Debug, Clone)]
pub enum TokenGrant {
    DeviceCode {
        client_id: String,
        client_secret: String,
        device_code: String,
    },
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: u64,
}

/// The identity provider's OIDC surface.
///
/// Implementations map provider failures onto [`crate::AuthError`]:
/// `AuthorizationPending` and `SlowDown` for poll pacing, `InvalidGrant` /
/// `InvalidRequest` / `ExpiredToken` for terminal grant failures, `Service`
/// and `Network` for everything else.
#[async_trait]
pub trait OidcClient: Send + Sync {
    async fn register_client(&self, request: RegisterClientRequest) -> Result<RegisteredClient>;

    async fn start_device_authorization(
        &self,
        request: StartDeviceAuthorizationRequest,
    ) -> Result<DeviceAuthorization>;

    async fn create_token(&self, grant: TokenGrant) -> Result<IssuedToken>;
}
