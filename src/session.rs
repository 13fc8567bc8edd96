//! Stateful bearer token session with a background refresh scheduler.
//!
//! One session per identity per process. Callers that must never block use
//! [`BearerTokenSession::current_token`] / [`BearerTokenSession::state`];
//! callers that need a usable token use [`BearerTokenSession::resolve_token`],
//! which serves the cached token while it is fresh, prefetches in the
//! background once within 20 minutes of expiry, and only waits on the
//! single-flight refresh once within 15 minutes of expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::acquire::AccessTokenAcquirer;
use crate::cache::{FileTokenCache, TokenCache};
use crate::clock::{Clock, SystemClock};
use crate::device::{LoginCallback, NoopLoginCallback};
use crate::error::Result;
use crate::oidc::{HttpOidcClient, OidcClient};
use crate::token::{AccessToken, BearerTokenAuthState, PendingAuthorization, SessionKey};

const PREFETCH_MINS: i64 = 20;
const STALE_MINS: i64 = 15;

/// Fire-and-forget "token changed" notification.
#[derive(Debug, Clone)]
pub struct TokenEvent {
    pub session_id: String,
    pub state: BearerTokenAuthState,
}

struct SessionShared {
    id: String,
    acquirer: AccessTokenAcquirer,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<AccessToken>>,
    pending: Arc<RwLock<Option<PendingAuthorization>>>,
    // Single-flight guard: every mutation of `current` happens while holding
    // this lock.
    refresh_lock: tokio::sync::Mutex<()>,
    prefetch_inflight: AtomicBool,
    events: broadcast::Sender<TokenEvent>,
    cancel: CancellationToken,
}

impl SessionShared {
    fn snapshot(&self) -> Option<AccessToken> {
        self.current.read().expect("session lock poisoned").clone()
    }

    fn install(&self, token: AccessToken) {
        *self.current.write().expect("session lock poisoned") = Some(token);
        self.pending
            .write()
            .expect("session lock poisoned")
            .take();
        self.notify();
    }

    fn clear(&self) {
        self.current.write().expect("session lock poisoned").take();
        self.pending
            .write()
            .expect("session lock poisoned")
            .take();
        self.notify();
    }

    fn state(&self) -> BearerTokenAuthState {
        BearerTokenAuthState::derive(self.snapshot().as_ref(), self.clock.now())
    }

    fn notify(&self) {
        let state = self.state();
        tracing::info!(session_id = %self.id, state = %state, "Token state changed");
        let _ = self.events.send(TokenEvent {
            session_id: self.id.clone(),
            state,
        });
    }
}

/// Bearer token session for one SSO identity.
///
/// Dropping (or [`close`](Self::close)-ing) the session cancels in-flight
/// device-code polling and any scheduled background refresh.
pub struct BearerTokenSession {
    shared: Arc<SessionShared>,
}

impl BearerTokenSession {
    pub fn builder(key: SessionKey) -> BearerTokenSessionBuilder {
        BearerTokenSessionBuilder::new(key)
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn session_key(&self) -> &SessionKey {
        self.shared.acquirer.session_key()
    }

    /// Last known token, possibly expired. Never performs I/O and never
    /// prompts.
    pub fn current_token(&self) -> Option<AccessToken> {
        self.shared.snapshot()
    }

    /// Authentication state derived from [`current_token`](Self::current_token)
    /// and the clock.
    pub fn state(&self) -> BearerTokenAuthState {
        self.shared.state()
    }

    /// Device authorization currently waiting on the user, if an interactive
    /// flow is in progress.
    pub fn pending_authorization(&self) -> Option<PendingAuthorization> {
        self.shared
            .pending
            .read()
            .expect("session lock poisoned")
            .clone()
    }

    /// Subscribe to token-changed events. At-least-once, fire-and-forget;
    /// ordering relative to `current_token` reads is eventual only.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.shared.events.subscribe()
    }

    /// Produce a usable token.
    ///
    /// Fast path: the current token is fresh and is returned as-is (with a
    /// background refresh kicked off once past the prefetch threshold). Slow
    /// path: the token is stale, expired, or absent — the caller joins the
    /// single-flight refresh, or drives the full interactive flow when the
    /// session is not authenticated.
    pub async fn resolve_token(&self) -> Result<AccessToken> {
        let now = self.shared.clock.now();
        if let Some(token) = self.shared.snapshot() {
            if now < token.expires_at - Duration::minutes(STALE_MINS) {
                if now >= token.expires_at - Duration::minutes(PREFETCH_MINS) {
                    self.spawn_prefetch();
                }
                return Ok(token);
            }
        }
        self.refresh_blocking().await
    }

    /// Clear the in-memory and persisted token and notify listeners. The
    /// client registration is reusable and is left in place.
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.shared.refresh_lock.lock().await;
        self.shared.acquirer.invalidate()?;
        self.shared.clear();
        Ok(())
    }

    /// Invalidate, then run the full interactive device-authorization flow.
    pub async fn reauthenticate(&self) -> Result<AccessToken> {
        let _guard = self.shared.refresh_lock.lock().await;
        self.shared.acquirer.invalidate()?;
        self.shared.clear();

        let token = self
            .shared
            .acquirer
            .acquire_token(&self.shared.cancel)
            .await?;
        self.shared.install(token.clone());
        Ok(token)
    }

    /// Cancel in-flight polling and scheduled refreshes.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    async fn refresh_blocking(&self) -> Result<AccessToken> {
        let _guard = self.shared.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        let now = self.shared.clock.now();
        if let Some(token) = self.shared.snapshot() {
            if now < token.expires_at - Duration::minutes(STALE_MINS) {
                return Ok(token);
            }
        }

        match self.shared.snapshot() {
            Some(previous) if previous.refresh_token.is_some() => {
                match self.shared.acquirer.refresh_token(&previous).await {
                    Ok(token) => {
                        self.shared.install(token.clone());
                        Ok(token)
                    }
                    Err(error) => {
                        if error.is_terminal_auth() {
                            tracing::warn!(session_id = %self.shared.id, error = %error, "Refresh grant rejected; session requires re-login");
                            if let Err(err) = self.shared.acquirer.invalidate() {
                                tracing::warn!(error = %err, "Failed to drop invalid persisted token");
                            }
                            self.shared.clear();
                        }
                        Err(error)
                    }
                }
            }
            Some(previous) if !previous.is_expired(self.shared.clock.now()) => {
                // Stale but unexpired with no refresh token: nothing to
                // exchange, serve it until it actually expires.
                Ok(previous)
            }
            _ => {
                // Not authenticated: first use or expired without a refresh
                // token. Blocks on the full interactive flow.
                let token = self
                    .shared
                    .acquirer
                    .acquire_token(&self.shared.cancel)
                    .await?;
                self.shared.install(token.clone());
                Ok(token)
            }
        }
    }

    fn spawn_prefetch(&self) {
        if self
            .shared
            .prefetch_inflight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = background_refresh(&shared) => {}
            }
            shared.prefetch_inflight.store(false, Ordering::SeqCst);
        });
    }
}

/// Opportunistic refresh while the current token is still valid. Failure
/// keeps the last-good token; the synchronous path surfaces the error once a
/// caller actually needs a fresh token.
async fn background_refresh(shared: &SessionShared) {
    let _guard = shared.refresh_lock.lock().await;

    let now = shared.clock.now();
    let Some(previous) = shared.snapshot() else {
        return;
    };
    if now < previous.expires_at - Duration::minutes(PREFETCH_MINS)
        || previous.refresh_token.is_none()
    {
        return;
    }

    match shared.acquirer.refresh_token(&previous).await {
        Ok(token) => shared.install(token),
        Err(error) => {
            tracing::warn!(session_id = %shared.id, error = %error, "Background token refresh failed");
        }
    }
}

impl Drop for BearerTokenSession {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Builder for [`BearerTokenSession`]. Defaults: file cache in the user's
/// home directory, HTTP OIDC client for the key's region, system clock, and
/// a no-op login callback.
pub struct BearerTokenSessionBuilder {
    key: SessionKey,
    id: Option<String>,
    cache: Option<Arc<dyn TokenCache>>,
    oidc: Option<Arc<dyn OidcClient>>,
    clock: Arc<dyn Clock>,
    callback: Arc<dyn LoginCallback>,
    client_name: String,
}

impl BearerTokenSessionBuilder {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            id: None,
            cache: None,
            oidc: None,
            clock: Arc::new(SystemClock),
            callback: Arc::new(NoopLoginCallback),
            client_name: "sso-bearer".to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_oidc(mut self, oidc: Arc<dyn OidcClient>) -> Self {
        self.oidc = Some(oidc);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_login_callback(mut self, callback: Arc<dyn LoginCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn build(self) -> BearerTokenSession {
        let id = self.id.unwrap_or_else(|| self.key.start_url().to_string());
        let cache: Arc<dyn TokenCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(FileTokenCache::new_default()));
        let oidc: Arc<dyn OidcClient> = self
            .oidc
            .unwrap_or_else(|| Arc::new(HttpOidcClient::new(self.key.region())));

        let pending = Arc::new(RwLock::new(None));
        let callback: Arc<dyn LoginCallback> = Arc::new(RecordingLoginCallback {
            pending: Arc::clone(&pending),
            inner: self.callback,
        });

        let acquirer = AccessTokenAcquirer::new(
            self.key,
            cache,
            oidc,
            Arc::clone(&self.clock),
            callback,
            self.client_name,
        );

        // Seed from the persistent cache; load failures degrade to "no
        // token" rather than failing construction.
        let initial = match acquirer.load_cached() {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to seed session from token cache");
                None
            }
        };

        let (events, _) = broadcast::channel(16);
        BearerTokenSession {
            shared: Arc::new(SessionShared {
                id,
                acquirer,
                clock: self.clock,
                current: RwLock::new(initial),
                pending,
                refresh_lock: tokio::sync::Mutex::new(()),
                prefetch_inflight: AtomicBool::new(false),
                events,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

/// Records the pending authorization on the session before forwarding to the
/// embedder's callback.
struct RecordingLoginCallback {
    pending: Arc<RwLock<Option<PendingAuthorization>>>,
    inner: Arc<dyn LoginCallback>,
}

impl LoginCallback for RecordingLoginCallback {
    fn on_pending_authorization(&self, authorization: &PendingAuthorization) {
        *self.pending.write().expect("session lock poisoned") = Some(authorization.clone());
        self.inner.on_pending_authorization(authorization);
    }

    fn on_token_retrieved(&self) {
        self.pending
            .write()
            .expect("session lock poisoned")
            .take();
        self.inner.on_token_retrieved();
    }

    fn on_token_retrieval_failure(&self, error: &crate::error::AuthError) {
        self.pending
            .write()
            .expect("session lock poisoned")
            .take();
        self.inner.on_token_retrieval_failure(error);
    }
}
