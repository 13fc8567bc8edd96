#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sso_bearer::oidc::{
    DeviceAuthorization, IssuedToken, OidcClient, RegisterClientRequest, RegisteredClient,
    StartDeviceAuthorizationRequest, TokenGrant,
};
use sso_bearer::{AccessToken, AuthError, ClientRegistration, SessionKey};

pub const START_URL: &str = "https://example.awsapps.com/start";
pub const REGION: &str = "us-east-1";

pub fn session_key() -> SessionKey {
    SessionKey::new(START_URL, REGION, ["sso:account:access"])
}

pub fn access_token(expires_in: Duration, refresh_token: Option<&str>) -> AccessToken {
    access_token_at(Utc::now() + expires_in, refresh_token)
}

pub fn access_token_at(expires_at: DateTime<Utc>, refresh_token: Option<&str>) -> AccessToken {
    AccessToken {
        start_url: START_URL.to_string(),
        region: REGION.to_string(),
        access_token: "cached-access".to_string(),
        refresh_token: refresh_token.map(String::from),
        expires_at,
    }
}

pub fn registration() -> ClientRegistration {
    ClientRegistration {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        expires_at: Utc::now() + Duration::days(90),
    }
}

/// Scripted token-endpoint response.
pub enum TokenResponse {
    Pending,
    SlowDown,
    InvalidGrant(&'static str),
    InvalidRequest(&'static str),
    Expired,
    Service(&'static str),
    Issued {
        access_token: &'static str,
        refresh_token: Option<&'static str>,
        expires_in_secs: u64,
    },
}

impl TokenResponse {
    pub fn issued(access_token: &'static str) -> Self {
        Self::Issued {
            access_token,
            refresh_token: Some("new-refresh"),
            expires_in_secs: 8 * 3600,
        }
    }
}

/// In-memory OIDC endpoint with scripted token responses and call counting.
pub struct FakeOidcClient {
    device_interval_secs: Option<u64>,
    device_expires_in_secs: u64,
    token_script: Mutex<VecDeque<TokenResponse>>,
    pub register_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    last_grant: Mutex<Option<TokenGrant>>,
}

impl FakeOidcClient {
    pub fn new() -> Self {
        Self {
            device_interval_secs: Some(1),
            device_expires_in_secs: 600,
            token_script: Mutex::new(VecDeque::new()),
            register_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            last_grant: Mutex::new(None),
        }
    }

    pub fn with_device_interval(mut self, interval_secs: Option<u64>) -> Self {
        self.device_interval_secs = interval_secs;
        self
    }

    pub fn with_device_expires_in(mut self, expires_in_secs: u64) -> Self {
        self.device_expires_in_secs = expires_in_secs;
        self
    }

    pub fn script_tokens(self, responses: impl IntoIterator<Item = TokenResponse>) -> Self {
        self.token_script
            .lock()
            .expect("script lock poisoned")
            .extend(responses);
        self
    }

    pub fn token_call_count(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn last_grant_was_refresh(&self) -> bool {
        matches!(
            *self.last_grant.lock().expect("grant lock poisoned"),
            Some(TokenGrant::RefreshToken { .. })
        )
    }
}

#[async_trait::async_trait]
impl OidcClient for FakeOidcClient {
    async fn register_client(
        &self,
        _request: RegisterClientRequest,
    ) -> Result<RegisteredClient, AuthError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegisteredClient {
            client_id: "registered-id".to_string(),
            client_secret: "registered-secret".to_string(),
            expires_at: Utc::now() + Duration::days(90),
        })
    }

    async fn start_device_authorization(
        &self,
        _request: StartDeviceAuthorizationRequest,
    ) -> Result<DeviceAuthorization, AuthError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceAuthorization {
            device_code: "device-code-1".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            verification_uri: "https://device.sso.example.com".to_string(),
            verification_uri_complete: Some(
                "https://device.sso.example.com?user_code=ABCD-EFGH".to_string(),
            ),
            expires_in_secs: self.device_expires_in_secs,
            interval_secs: self.device_interval_secs,
        })
    }

    async fn create_token(&self, grant: TokenGrant) -> Result<IssuedToken, AuthError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_grant.lock().expect("grant lock poisoned") = Some(grant);
        let next = self
            .token_script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .expect("token script exhausted");
        match next {
            TokenResponse::Pending => Err(AuthError::AuthorizationPending),
            TokenResponse::SlowDown => Err(AuthError::SlowDown),
            TokenResponse::InvalidGrant(message) => Err(AuthError::InvalidGrant(message.into())),
            TokenResponse::InvalidRequest(message) => {
                Err(AuthError::InvalidRequest(message.into()))
            }
            TokenResponse::Expired => Err(AuthError::ExpiredToken),
            TokenResponse::Service(message) => Err(AuthError::Service(message.into())),
            TokenResponse::Issued {
                access_token,
                refresh_token,
                expires_in_secs,
            } => Ok(IssuedToken {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.map(String::from),
                expires_in_secs,
            }),
        }
    }
}
