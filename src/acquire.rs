//! Access token acquisition and refresh for one identity.

use std::sync::Arc;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::TokenCache;
use crate::clock::Clock;
use crate::device::{DeviceAuthorizationFlow, LoginCallback};
use crate::error::{AuthError, Result};
use crate::oidc::{OidcClient, TokenGrant};
use crate::token::{AccessToken, SessionKey};

/// Tokens further than this from expiry are reused without a network call.
/// Guards against refresh storms when callers ask for a token far from
/// expiry.
const REFRESH_REUSE_WINDOW_MINS: i64 = 30;

/// Orchestrates cache lookups, the device-authorization flow, and
/// refresh-token exchange for a single [`SessionKey`].
pub struct AccessTokenAcquirer {
    key: SessionKey,
    cache: Arc<dyn TokenCache>,
    oidc: Arc<dyn OidcClient>,
    clock: Arc<dyn Clock>,
    callback: Arc<dyn LoginCallback>,
    flow: DeviceAuthorizationFlow,
}

impl AccessTokenAcquirer {
    pub fn new(
        key: SessionKey,
        cache: Arc<dyn TokenCache>,
        oidc: Arc<dyn OidcClient>,
        clock: Arc<dyn Clock>,
        callback: Arc<dyn LoginCallback>,
        client_name: String,
    ) -> Self {
        let flow = DeviceAuthorizationFlow::new(Arc::clone(&oidc), Arc::clone(&clock), client_name);
        Self {
            key,
            cache,
            oidc,
            clock,
            callback,
            flow,
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.key
    }

    /// Best currently-persisted token for this identity, if any.
    pub fn load_cached(&self) -> Result<Option<AccessToken>> {
        self.cache.load_access_token(&self.key)
    }

    /// Remove the persisted token. Client registrations are reusable and are
    /// deliberately left in place.
    pub fn invalidate(&self) -> Result<()> {
        self.cache.invalidate_access_token(&self.key)
    }

    /// Return a usable token: the cached one if unexpired, otherwise drive
    /// the interactive device-authorization flow and persist the result.
    pub async fn acquire_token(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        if let Some(token) = self.load_cached()? {
            if !token.is_expired(self.clock.now()) {
                tracing::debug!(start_url = %self.key.start_url(), "Using cached access token");
                return Ok(token);
            }
        }

        let cached_registration = self
            .cache
            .load_client_registration(self.key.region())?;
        let registration = self
            .flow
            .register_client_if_needed(self.key.scopes(), cached_registration)
            .await?;
        self.cache
            .save_client_registration(self.key.region(), &registration)?;

        let token = match self
            .flow
            .run(
                self.key.start_url(),
                self.key.region(),
                &registration,
                self.callback.as_ref(),
                cancel,
            )
            .await
        {
            Ok(token) => token,
            Err(error @ AuthError::Registration(_)) => {
                // The provider rejected the registration; drop it so the
                // next attempt registers fresh.
                if let Err(err) = self
                    .cache
                    .invalidate_client_registration(self.key.region())
                {
                    tracing::warn!(error = %err, "Failed to drop rejected client registration");
                }
                return Err(error);
            }
            Err(error) => return Err(error),
        };

        self.cache.save_access_token(&self.key, &token)?;
        tracing::info!(start_url = %self.key.start_url(), "Obtained access token via device authorization");
        Ok(token)
    }

    /// Exchange `previous` for a fresh token via the refresh-token grant.
    ///
    /// Tokens more than 30 minutes from expiry are returned unchanged with
    /// zero network calls. A missing refresh token is a caller error — the
    /// session state machine must route those through the interactive flow
    /// instead.
    pub async fn refresh_token(&self, previous: &AccessToken) -> Result<AccessToken> {
        let now = self.clock.now();
        if previous.expires_at - now > Duration::minutes(REFRESH_REUSE_WINDOW_MINS) {
            return Ok(previous.clone());
        }

        let refresh_token = previous.refresh_token.clone().ok_or_else(|| {
            AuthError::InvalidRequest(
                "Requested token refresh, but refresh token was absent".to_string(),
            )
        })?;
        let registration = self
            .cache
            .load_client_registration(self.key.region())?
            .ok_or_else(|| {
                AuthError::Registration("Unable to load client registration".to_string())
            })?;

        let issued = self
            .oidc
            .create_token(TokenGrant::RefreshToken {
                client_id: registration.client_id,
                client_secret: registration.client_secret,
                refresh_token,
            })
            .await?;

        let token = AccessToken {
            start_url: previous.start_url.clone(),
            region: previous.region.clone(),
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            expires_at: self.clock.now() + Duration::seconds(issued.expires_in_secs as i64),
        };

        // The exchange succeeded; a failed persist must not read as a failed
        // refresh. Log it and serve the new token from memory.
        if let Err(error) = self.cache.save_access_token(&self.key, &token) {
            tracing::warn!(error = %error, "Failed to persist refreshed token");
        } else {
            tracing::debug!(start_url = %self.key.start_url(), "Refreshed access token");
        }

        Ok(token)
    }
}
