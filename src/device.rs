//! Device-authorization grant driver (RFC 8628).
//!
//! Stateless protocol engine over the [`OidcClient`] capability: client
//! registration reuse, device-authorization start, and the cancellable token
//! poll loop with pending/slow-down pacing.

use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::{AuthError, Result};
use crate::oidc::{
    OidcClient, RegisterClientRequest, StartDeviceAuthorizationRequest, TokenGrant,
    PUBLIC_CLIENT_TYPE,
};
use crate::token::{AccessToken, ClientRegistration, PendingAuthorization};

// RFC 8628 §3.5: default poll interval and the fixed slow_down increment.
const DEFAULT_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_DELAY_SECS: u64 = 5;

/// Collaborator that surfaces the browser step to the user.
///
/// `on_pending_authorization` must return promptly; it is called from the
/// poll task before the first token attempt and must not block the loop.
pub trait LoginCallback: Send + Sync {
    fn on_pending_authorization(&self, authorization: &PendingAuthorization);

    fn on_token_retrieved(&self) {}

    fn on_token_retrieval_failure(&self, error: &AuthError) {
        let _ = error;
    }
}

/// Callback for non-interactive use; pending authorizations go nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoginCallback;

impl LoginCallback for NoopLoginCallback {
    fn on_pending_authorization(&self, _authorization: &PendingAuthorization) {}
}

/// Stateless driver for the device-authorization flow.
pub struct DeviceAuthorizationFlow {
    oidc: Arc<dyn OidcClient>,
    clock: Arc<dyn Clock>,
    client_name: String,
}

impl DeviceAuthorizationFlow {
    pub fn new(oidc: Arc<dyn OidcClient>, clock: Arc<dyn Clock>, client_name: String) -> Self {
        Self {
            oidc,
            clock,
            client_name,
        }
    }

    /// Reuse `cached` if it has not expired, otherwise register a new public
    /// client. The caller persists the result. Registration failures are
    /// terminal; there is no fallback identity to register with.
    pub async fn register_client_if_needed(
        &self,
        scopes: &[String],
        cached: Option<ClientRegistration>,
    ) -> Result<ClientRegistration> {
        if let Some(registration) = cached {
            if !registration.is_expired(self.clock.now()) {
                return Ok(registration);
            }
            tracing::debug!("Cached client registration expired; re-registering");
        }

        let response = self
            .oidc
            .register_client(RegisterClientRequest {
                client_name: self.client_name.clone(),
                client_type: PUBLIC_CLIENT_TYPE.to_string(),
                scopes: scopes.to_vec(),
            })
            .await?;

        Ok(ClientRegistration {
            client_id: response.client_id,
            client_secret: response.client_secret,
            expires_at: response.expires_at,
        })
    }

    /// Run the full device-authorization flow: start an authorization,
    /// surface the user code through `callback`, then poll the token endpoint
    /// until success, terminal failure, device-code expiry, or cancellation.
    ///
    /// `AuthorizationPending` keeps the current interval; `SlowDown` adds the
    /// fixed 5 s increment. Every other error stops the loop on first
    /// occurrence. Cancellation returns [`AuthError::Cancelled`] without
    /// invoking the failure callback.
    pub async fn run(
        &self,
        start_url: &str,
        region: &str,
        registration: &ClientRegistration,
        callback: &dyn LoginCallback,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let authorization = self
            .oidc
            .start_device_authorization(StartDeviceAuthorizationRequest {
                client_id: registration.client_id.clone(),
                client_secret: registration.client_secret.clone(),
                start_url: start_url.to_string(),
            })
            .await?;

        let deadline =
            Instant::now() + Duration::from_secs(authorization.expires_in_secs);
        let mut interval = Duration::from_secs(
            authorization
                .interval_secs
                .unwrap_or(DEFAULT_INTERVAL_SECS),
        );

        callback.on_pending_authorization(&PendingAuthorization {
            user_code: authorization.user_code.clone(),
            verification_uri: authorization.verification_uri.clone(),
            verification_uri_complete: authorization.verification_uri_complete.clone(),
            expires_at: self.clock.now()
                + chrono::Duration::seconds(authorization.expires_in_secs as i64),
        });
        tracing::info!(user_code = %authorization.user_code, "Waiting for device authorization");

        loop {
            if Instant::now() >= deadline {
                let error = AuthError::ExpiredToken;
                callback.on_token_retrieval_failure(&error);
                return Err(error);
            }

            let grant = TokenGrant::DeviceCode {
                client_id: registration.client_id.clone(),
                client_secret: registration.client_secret.clone(),
                device_code: authorization.device_code.clone(),
            };
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                result = self.oidc.create_token(grant) => result,
            };

            match attempt {
                Ok(issued) => {
                    callback.on_token_retrieved();
                    return Ok(AccessToken {
                        start_url: start_url.to_string(),
                        region: region.to_string(),
                        access_token: issued.access_token,
                        refresh_token: issued.refresh_token,
                        expires_at: self.clock.now()
                            + chrono::Duration::seconds(issued.expires_in_secs as i64),
                    });
                }
                Err(AuthError::AuthorizationPending) => {}
                Err(AuthError::SlowDown) => {
                    interval += Duration::from_secs(SLOW_DOWN_DELAY_SECS);
                    tracing::debug!(interval_secs = interval.as_secs(), "Server asked to slow down");
                }
                Err(error) => {
                    callback.on_token_retrieval_failure(&error);
                    return Err(error);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
