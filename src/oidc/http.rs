//! HTTP implementation of the OIDC capability.
//!
//! Speaks the identity provider's JSON dialect: camelCase request bodies
//! posted to `/client/register`, `/device_authorization`, and `/token` under
//! a regional endpoint. Error responses carry RFC 6749/8628 `error` codes in
//! the body; those map onto [`AuthError`] variants so the poll loop can react
//! to pacing signals without parsing strings.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AuthError, Result};

use super::{
    DeviceAuthorization, IssuedToken, OidcClient, RegisterClientRequest, RegisteredClient,
    StartDeviceAuthorizationRequest, TokenGrant,
};

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// OIDC client over HTTPS.
pub struct HttpOidcClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOidcClient {
    /// Client for the given identity-provider region.
    pub fn new(region: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://oidc.{region}.amazonaws.com"),
        }
    }

    /// Override the endpoint, e.g. to point at a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_error_body(status.as_u16(), &body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl OidcClient for HttpOidcClient {
    async fn register_client(&self, request: RegisterClientRequest) -> Result<RegisteredClient> {
        tracing::debug!(client_name = %request.client_name, "Registering OIDC client");
        let payload: RegisterClientResponse = self
            .post(
                "/client/register",
                json!({
                    "clientName": request.client_name,
                    "clientType": request.client_type,
                    "scopes": request.scopes,
                }),
            )
            .await
            .map_err(|err| match err {
                AuthError::Network(_) | AuthError::Io(_) => err,
                other => AuthError::Registration(other.to_string()),
            })?;
        Ok(RegisteredClient {
            client_id: payload.client_id,
            client_secret: payload.client_secret,
            expires_at: epoch_secs(payload.client_secret_expires_at),
        })
    }

    async fn start_device_authorization(
        &self,
        request: StartDeviceAuthorizationRequest,
    ) -> Result<DeviceAuthorization> {
        tracing::debug!(start_url = %request.start_url, "Starting device authorization");
        let payload: DeviceAuthorizationResponse = self
            .post(
                "/device_authorization",
                json!({
                    "clientId": request.client_id,
                    "clientSecret": request.client_secret,
                    "startUrl": request.start_url,
                }),
            )
            .await?;
        Ok(DeviceAuthorization {
            device_code: payload.device_code,
            user_code: payload.user_code,
            verification_uri: payload.verification_uri,
            verification_uri_complete: payload.verification_uri_complete,
            expires_in_secs: payload.expires_in,
            interval_secs: payload.interval,
        })
    }

    async fn create_token(&self, grant: TokenGrant) -> Result<IssuedToken> {
        let body = match &grant {
            TokenGrant::DeviceCode {
                client_id,
                client_secret,
                device_code,
            } => json!({
                "clientId": client_id,
                "clientSecret": client_secret,
                "grantType": DEVICE_GRANT_TYPE,
                "deviceCode": device_code,
            }),
            TokenGrant::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => json!({
                "clientId": client_id,
                "clientSecret": client_secret,
                "grantType": REFRESH_GRANT_TYPE,
                "refreshToken": refresh_token,
            }),
        };
        let payload: CreateTokenResponse = self.post("/token", body).await?;
        Ok(IssuedToken {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_in_secs: payload.expires_in,
        })
    }
}

/// Map an error-response body onto the protocol taxonomy.
///
/// The provider puts the useful text in the non-standard `error_description`
/// field; carry it along so terminal failures stay diagnosable.
fn map_error_body(status: u16, body: &str) -> AuthError {
    let payload: ErrorResponse = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(_) => return AuthError::Service(format!("status {status}")),
    };
    let description = payload
        .error_description
        .unwrap_or_else(|| format!("status {status}"));
    match payload.error.as_deref() {
        Some("authorization_pending") => AuthError::AuthorizationPending,
        Some("slow_down") => AuthError::SlowDown,
        Some("invalid_grant") => AuthError::InvalidGrant(description),
        Some("invalid_request") => AuthError::InvalidRequest(description),
        Some("expired_token") => AuthError::ExpiredToken,
        Some("invalid_client") => AuthError::Registration(description),
        Some(other) => AuthError::Service(format!("{other}: {description}")),
        None => AuthError::Service(format!("status {status}")),
    }
}

fn epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH) + chrono::Duration::seconds(secs)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterClientResponse {
    client_id: String,
    client_secret: String,
    client_secret_expires_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceAuthorizationResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    verification_uri_complete: Option<String>,
    expires_in: u64,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}
