mod common;

use std::sync::Arc;

use common::{build_gateway, session_store, test_config, wait_until, Backend, StallingStore};
use ffund_gateway::error::{ApiFailure, GatewayError};
use ffund_gateway::gateway::{Gateway, LogoutReason, SessionEvent};
use ffund_gateway::metrics::Metrics;
use ffund_gateway::models::{ApiRequest, SessionKey};
use ffund_gateway::store::SessionStore;
use reqwest::StatusCode;
use serde_json::{json, Value};

fn token_of(body: &str) -> String {
    let value: Value = serde_json::from_str(body).expect("backend answers JSON");
    value["data"]["token"].as_str().unwrap_or_default().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_auth_failures_share_one_refresh() {
    let (backend, gate) = Backend::new().gated();
    let backend = Arc::new(backend);
    backend.expire();
    let store = session_store(Some("T1"), Some("R1")).await;
    let gateway = build_gateway(&test_config(), backend.clone(), store.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .send(ApiRequest::get(format!("/api/v1/projects/{}", i)))
                    .await
            })
        })
        .collect();

    wait_until("seven requests queued behind the refresh", || {
        gateway.pending_requests() == 7
    })
    .await;
    assert!(gateway.is_refreshing());
    assert_eq!(backend.refresh_calls(), 1);
    gate.notify_one();

    for handle in handles {
        let response = handle.await.unwrap().expect("replay should succeed");
        assert_eq!(token_of(&response.body), "T2");
    }

    assert_eq!(backend.refresh_calls(), 1);
    for i in 0..8 {
        assert_eq!(backend.served_with(&format!("/api/v1/projects/{}", i), "T2"), 1);
    }
    assert!(!gateway.is_refreshing());
    assert_eq!(gateway.pending_requests(), 0);
    assert_eq!(
        store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
        Some("T2")
    );
    assert_eq!(*gateway.loading().borrow(), 0);
}

#[tokio::test]
async fn two_requests_failing_in_the_same_tick_replay_with_the_same_token() {
    let (backend, gate) = Backend::new().gated();
    let backend = Arc::new(backend);
    backend.expire();
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );

    let a = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/reports")).await }
    });
    let b = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/violations")).await }
    });

    wait_until("B queued behind A's refresh", || gateway.pending_requests() == 1).await;
    gate.notify_one();

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert_eq!(token_of(&a.body), "T2");
    assert_eq!(token_of(&b.body), "T2");
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.refresh_bodies(), vec![json!({"token": "R1"})]);
}

#[tokio::test]
async fn failure_seen_during_refresh_but_handled_after_it_does_not_refresh_again() {
    let (backend, gate) = Backend::new().gated();
    let backend = Arc::new(backend);
    backend.expire();
    let store = Arc::new(StallingStore::new(
        session_store(Some("T1"), Some("R1")).await,
    ));
    let gateway = Arc::new(Gateway::new(
        &test_config(),
        backend.clone(),
        store.clone(),
        Metrics::new().expect("metrics registry"),
    ));

    let a = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/teams")).await }
    });
    wait_until("the first request to start refreshing", || {
        gateway.is_refreshing()
    })
    .await;

    // B attaches T1, gets its 403, then stalls reading the stored token
    // while the refresh is still running.
    store.stall_read(1);
    let b = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/projects")).await }
    });
    store.stalled.notified().await;
    assert!(gateway.is_refreshing());

    gate.notify_one();
    let a = a.await.unwrap().unwrap();
    assert_eq!(token_of(&a.body), "T2");
    assert!(!gateway.is_refreshing());

    store.resume.notify_one();
    let b = b.await.unwrap().unwrap();
    assert_eq!(token_of(&b.body), "T2");
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.served_with("/api/v1/projects", "T1"), 1);
    assert_eq!(backend.served_with("/api/v1/projects", "T2"), 1);
}

#[tokio::test]
async fn expired_token_is_replayed_with_refreshed_bearer() {
    let backend = Arc::new(Backend::new());
    backend.expire();
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );
    let mut events = gateway.subscribe();

    let response = gateway
        .send(ApiRequest::get("/api/v1/transactions"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        backend.served(),
        vec![
            ("/api/v1/transactions".to_string(), Some("T1".to_string())),
            ("/api/v1/transactions".to_string(), Some("T2".to_string())),
        ]
    );
    assert!(!gateway.is_refreshing());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::TokenRefreshed);
}

#[tokio::test]
async fn a_request_is_retried_at_most_once() {
    let backend = Arc::new(Backend::new().always_forbidden());
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );

    let err = gateway
        .send(ApiRequest::get("/api/v1/payouts"))
        .await
        .unwrap_err();

    match err {
        GatewayError::Unrecoverable(ApiFailure::Status { status, message, .. }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(message.as_deref(), Some("Access token expired"));
        }
        other => panic!("expected the second 403 to surface, got {:?}", other),
    }
    assert_eq!(backend.served().len(), 2);
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn missing_refresh_token_logs_out_without_refreshing() {
    let backend = Arc::new(Backend::new());
    backend.expire();
    let store = session_store(Some("T1"), None).await;
    let gateway = build_gateway(&test_config(), backend.clone(), store.clone());
    let mut events = gateway.subscribe();

    let err = gateway
        .send(ApiRequest::get("/api/v1/phase-rules"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::SessionExpired));
    assert_eq!(backend.refresh_calls(), 0);
    assert!(store.load().await.unwrap().is_empty());
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::SessionExpired,
            redirect_to: "/login".to_string(),
        }
    );
}

#[tokio::test]
async fn rejected_refresh_clears_session_and_returns_refresh_error() {
    let backend = Arc::new(Backend::new().refresh_status(401));
    backend.expire();
    let store = session_store(Some("T1"), Some("R1")).await;
    let gateway = build_gateway(&test_config(), backend.clone(), store.clone());
    let mut events = gateway.subscribe();

    let err = gateway
        .send(ApiRequest::get("/api/v1/categories"))
        .await
        .unwrap_err();

    match err {
        GatewayError::RefreshFailed(reason) => {
            assert!(reason.contains("Refresh token rejected"), "{}", reason)
        }
        other => panic!("expected a refresh failure, got {:?}", other),
    }
    assert!(store.load().await.unwrap().is_empty());
    assert!(!gateway.is_refreshing());
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed,
            ..
        }
    ));
}

#[tokio::test]
async fn queued_requests_are_rejected_when_refresh_fails() {
    let (backend, gate) = Backend::new().refresh_status(500).gated();
    let backend = Arc::new(backend);
    backend.expire();
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );

    let leader = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/teams")).await }
    });
    let queued = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/requests")).await }
    });

    wait_until("one request queued", || gateway.pending_requests() == 1).await;
    gate.notify_one();

    assert!(matches!(
        leader.await.unwrap(),
        Err(GatewayError::RefreshFailed(_))
    ));
    assert!(matches!(
        queued.await.unwrap(),
        Err(GatewayError::RefreshFailed(_))
    ));
    assert_eq!(backend.refresh_calls(), 1);
    // Neither request was replayed.
    assert_eq!(backend.served().len(), 2);
}

#[tokio::test]
async fn refresh_timeout_is_a_refresh_failure() {
    let (backend, _gate) = Backend::new().gated();
    let backend = Arc::new(backend);
    let mut config = test_config();
    config.gateway.refresh_timeout_in_ms = Some(50);
    let store = session_store(Some("T1"), Some("R1")).await;
    let gateway = build_gateway(&config, backend.clone(), store.clone());
    backend.expire();

    let err = gateway
        .send(ApiRequest::get("/api/v1/dashboard"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RefreshFailed(ref m) if m.contains("50ms")));
    assert!(!gateway.is_refreshing());
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_refresh_releases_queued_requests() {
    let (backend, _gate) = Backend::new().gated();
    let backend = Arc::new(backend);
    backend.expire();
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );

    let leader = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/teams")).await }
    });
    wait_until("the first request to start refreshing", || {
        gateway.is_refreshing()
    })
    .await;

    let queued = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.send(ApiRequest::get("/api/v1/projects")).await }
    });
    wait_until("one request queued", || gateway.pending_requests() == 1).await;
    leader.abort();

    assert!(matches!(
        queued.await.unwrap(),
        Err(GatewayError::RefreshFailed(_))
    ));
    assert!(!gateway.is_refreshing());
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn every_expiry_gets_its_own_refresh_cycle() {
    let backend = Arc::new(Backend::new());
    let store = session_store(Some("T1"), Some("R1")).await;
    let gateway = build_gateway(&test_config(), backend.clone(), store.clone());

    backend.expire();
    let first = gateway.send(ApiRequest::get("/api/v1/teams")).await.unwrap();
    assert_eq!(token_of(&first.body), "T2");

    backend.expire();
    let second = gateway.send(ApiRequest::get("/api/v1/teams")).await.unwrap();
    assert_eq!(token_of(&second.body), "T3");

    assert_eq!(backend.refresh_calls(), 2);
    assert_eq!(
        store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
        Some("T3")
    );
}

#[tokio::test]
async fn successful_requests_never_touch_the_refresh_endpoint() {
    let backend = Arc::new(Backend::new());
    let gateway = build_gateway(
        &test_config(),
        backend.clone(),
        session_store(Some("T1"), Some("R1")).await,
    );

    let response = gateway
        .send(ApiRequest::get("/api/v1/auth/me"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(backend.refresh_calls(), 0);

    let metrics = gateway.metrics().render();
    assert!(metrics.contains("gateway_requests_total{outcome=\"ok\"} 1"));
    assert!(!metrics.contains("gateway_refresh_total{"));
}
