mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use sso_bearer::device::NoopLoginCallback;
use sso_bearer::{
    AccessTokenAcquirer, AuthError, ManualClock, MemoryTokenCache, TokenCache,
};
use tokio_util::sync::CancellationToken;

use support::{
    access_token_at, registration, session_key, FakeOidcClient, TokenResponse,
};

fn acquirer(
    cache: Arc<MemoryTokenCache>,
    oidc: Arc<FakeOidcClient>,
    clock: Arc<ManualClock>,
) -> AccessTokenAcquirer {
    AccessTokenAcquirer::new(
        session_key(),
        cache,
        oidc,
        clock,
        Arc::new(NoopLoginCallback),
        "sso-bearer-tests".to_string(),
    )
}

#[tokio::test]
async fn acquire_returns_valid_cached_token_without_network() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    let cached = access_token_at(now + Duration::hours(8), Some("refresh"));
    cache.save_access_token(&session_key(), &cached).unwrap();
    let oidc = Arc::new(FakeOidcClient::new());
    let sut = acquirer(cache, oidc.clone(), Arc::new(ManualClock::new(now)));

    let token = sut
        .acquire_token(&CancellationToken::new())
        .await
        .expect("acquire");

    assert_eq!(token, cached);
    assert_eq!(oidc.register_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(oidc.start_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(oidc.token_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn acquire_runs_device_flow_and_persists_token() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    let oidc = Arc::new(FakeOidcClient::new().script_tokens([
        TokenResponse::Pending,
        TokenResponse::Issued {
            access_token: "fresh-access",
            refresh_token: Some("fresh-refresh"),
            expires_in_secs: 7200,
        },
    ]));
    let sut = acquirer(cache.clone(), oidc.clone(), Arc::new(ManualClock::new(now)));

    let token = sut
        .acquire_token(&CancellationToken::new())
        .await
        .expect("acquire");

    assert_eq!(oidc.start_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(oidc.register_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(token.access_token, "fresh-access");
    assert_eq!(token.expires_at, now + Duration::seconds(7200));
    assert_eq!(
        cache.load_access_token(&session_key()).unwrap().unwrap(),
        token
    );
}

#[tokio::test(start_paused = true)]
async fn acquire_registers_client_when_none_cached() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    let oidc =
        Arc::new(FakeOidcClient::new().script_tokens([TokenResponse::issued("fresh-access")]));
    let sut = acquirer(cache.clone(), oidc.clone(), Arc::new(ManualClock::new(now)));

    sut.acquire_token(&CancellationToken::new())
        .await
        .expect("acquire");

    assert_eq!(oidc.register_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    let persisted = cache
        .load_client_registration(support::REGION)
        .unwrap()
        .expect("registration persisted");
    assert_eq!(persisted.client_id, "registered-id");
}

#[tokio::test]
async fn refresh_far_from_expiry_reuses_token_without_network() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    let oidc = Arc::new(FakeOidcClient::new());
    let sut = acquirer(cache, oidc.clone(), Arc::new(ManualClock::new(now)));
    let previous = access_token_at(now + Duration::hours(2), Some("refresh-1"));

    let token = sut.refresh_token(&previous).await.expect("refresh");

    assert_eq!(token, previous);
    assert_eq!(oidc.token_call_count(), 0);
}

#[tokio::test]
async fn refresh_exchanges_expired_token() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    let oidc = Arc::new(FakeOidcClient::new().script_tokens([TokenResponse::Issued {
        access_token: "refreshed-access",
        refresh_token: Some("refresh-2"),
        expires_in_secs: 3600,
    }]));
    let sut = acquirer(cache.clone(), oidc.clone(), Arc::new(ManualClock::new(now)));
    let previous = access_token_at(now - Duration::seconds(10), Some("refresh-1"));

    let token = sut.refresh_token(&previous).await.expect("refresh");

    assert_eq!(oidc.token_call_count(), 1);
    assert!(oidc.last_grant_was_refresh());
    assert_eq!(token.access_token, "refreshed-access");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(token.expires_at, now + Duration::seconds(3600));
    assert_eq!(token.start_url, previous.start_url);
    assert_eq!(token.region, previous.region);
    assert_eq!(
        cache.load_access_token(&session_key()).unwrap().unwrap(),
        token
    );
}

#[tokio::test]
async fn refresh_without_refresh_token_fails_fast() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    let oidc = Arc::new(FakeOidcClient::new());
    let sut = acquirer(cache, oidc.clone(), Arc::new(ManualClock::new(now)));
    let previous = access_token_at(now - Duration::seconds(10), None);

    let result = sut.refresh_token(&previous).await;

    assert!(matches!(result, Err(AuthError::InvalidRequest(_))));
    assert_eq!(oidc.token_call_count(), 0);
}

#[tokio::test]
async fn refresh_without_cached_registration_fails() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    let oidc = Arc::new(FakeOidcClient::new());
    let sut = acquirer(cache, oidc.clone(), Arc::new(ManualClock::new(now)));
    let previous = access_token_at(now - Duration::seconds(10), Some("refresh-1"));

    let result = sut.refresh_token(&previous).await;

    assert!(matches!(result, Err(AuthError::Registration(_))));
    assert_eq!(oidc.token_call_count(), 0);
}

#[tokio::test]
async fn refresh_failure_propagates_unmodified() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    let oidc = Arc::new(
        FakeOidcClient::new().script_tokens([TokenResponse::InvalidGrant("revoked")]),
    );
    let sut = acquirer(cache, oidc, Arc::new(ManualClock::new(now)));
    let previous = access_token_at(now - Duration::seconds(10), Some("refresh-1"));

    let result = sut.refresh_token(&previous).await;

    assert!(matches!(result, Err(AuthError::InvalidGrant(message)) if message == "revoked"));
}

#[tokio::test]
async fn invalidate_clears_token_but_keeps_registration() {
    let now = Utc::now();
    let cache = Arc::new(MemoryTokenCache::new());
    cache
        .save_client_registration(support::REGION, &registration())
        .unwrap();
    cache
        .save_access_token(
            &session_key(),
            &access_token_at(now + Duration::hours(8), Some("refresh")),
        )
        .unwrap();
    let oidc = Arc::new(FakeOidcClient::new());
    let sut = acquirer(cache.clone(), oidc, Arc::new(ManualClock::new(now)));

    sut.invalidate().expect("invalidate");

    assert!(cache.load_access_token(&session_key()).unwrap().is_none());
    assert!(cache
        .load_client_registration(support::REGION)
        .unwrap()
        .is_some());
}
