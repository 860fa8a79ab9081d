#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ffund_gateway::config::ConfigV1;
use ffund_gateway::gateway::{Gateway, Transport};
use ffund_gateway::metrics::Metrics;
use ffund_gateway::models::{ApiRequest, ApiResponse, SessionKey};
use ffund_gateway::store::{MemoryStore, SessionStore};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::Notify;

pub const REFRESH_PATH: &str = "/api/v1/auth/refresh-token";

/// An in-process stand-in for the FFund backend.
///
/// Protected paths answer 403 unless the bearer matches the currently valid
/// token. The n-th refresh call issues token `T{n+1}`, optionally waiting on
/// a gate first so tests can pile requests up behind it.
pub struct Backend {
    valid_token: Mutex<String>,
    refresh_calls: AtomicUsize,
    refresh_status: u16,
    refresh_gate: Option<Arc<Notify>>,
    always_forbidden: bool,
    /// Every protected call as (path, bearer).
    served: Mutex<Vec<(String, Option<String>)>>,
    /// Bodies sent to the refresh endpoint.
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
}

impl Backend {
    pub fn new() -> Self {
        Backend {
            valid_token: Mutex::new("T1".to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_status: 200,
            refresh_gate: None,
            always_forbidden: false,
            served: Mutex::new(Vec::new()),
            refresh_bodies: Mutex::new(Vec::new()),
        }
    }

    /// Refresh calls block until the returned gate is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.refresh_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn refresh_status(mut self, status: u16) -> Self {
        self.refresh_status = status;
        self
    }

    pub fn always_forbidden(mut self) -> Self {
        self.always_forbidden = true;
        self
    }

    /// Invalidate whatever token is currently accepted.
    pub fn expire(&self) {
        *self.valid_token.lock().unwrap() = "expired".to_string();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> Vec<(String, Option<String>)> {
        self.served.lock().unwrap().clone()
    }

    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    /// Protected calls to `path` that carried `token`.
    pub fn served_with(&self, path: &str, token: &str) -> usize {
        self.served()
            .iter()
            .filter(|(p, t)| p == path && t.as_deref() == Some(token))
            .count()
    }

    async fn refresh(&self, request: &ApiRequest) -> ApiResponse {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(body) = &request.body {
            self.refresh_bodies.lock().unwrap().push(body.clone());
        }
        if let Some(gate) = &self.refresh_gate {
            gate.notified().await;
        }

        if self.refresh_status != 200 {
            return ApiResponse::new(
                StatusCode::from_u16(self.refresh_status).unwrap(),
                json!({"data": null, "message": "Refresh token rejected", "error": "Unauthorized"})
                    .to_string(),
            );
        }

        let token = format!("T{}", n + 1);
        *self.valid_token.lock().unwrap() = token.clone();
        ApiResponse::new(
            StatusCode::OK,
            json!({"data": {"accessToken": token}, "message": "ok", "error": null}).to_string(),
        )
    }

    fn protected(&self, request: &ApiRequest) -> ApiResponse {
        let bearer = request.bearer().map(str::to_string);
        self.served
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.clone()));

        let valid = self.valid_token.lock().unwrap().clone();
        if self.always_forbidden || bearer.as_deref() != Some(valid.as_str()) {
            return ApiResponse::new(
                StatusCode::FORBIDDEN,
                json!({"data": null, "message": "Access token expired", "error": "Forbidden"})
                    .to_string(),
            );
        }
        ApiResponse::new(
            StatusCode::OK,
            json!({"data": {"path": request.path, "token": valid}, "message": "ok", "error": null})
                .to_string(),
        )
    }
}

#[async_trait]
impl Transport for Backend {
    fn get_name(&self) -> &str {
        "test-backend"
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, String> {
        // Yield so concurrent callers interleave like real network calls.
        tokio::task::yield_now().await;
        if request.path == REFRESH_PATH {
            Ok(self.refresh(request).await)
        } else {
            Ok(self.protected(request))
        }
    }
}

/// Wraps a [`MemoryStore`] and can hold back one access-token read.
///
/// After [`StallingStore::stall_read`], the chosen access-token read takes
/// its value immediately, signals `stalled`, and returns only once `resume`
/// is notified. This reproduces a request that read the old token just
/// before a refresh finished.
pub struct StallingStore {
    inner: Arc<MemoryStore>,
    armed: AtomicBool,
    reads_to_skip: AtomicUsize,
    pub stalled: Notify,
    pub resume: Notify,
}

impl StallingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        StallingStore {
            inner,
            armed: AtomicBool::new(false),
            reads_to_skip: AtomicUsize::new(0),
            stalled: Notify::new(),
            resume: Notify::new(),
        }
    }

    /// Stall the access-token read that comes after `skip` more reads.
    pub fn stall_read(&self, skip: usize) {
        self.reads_to_skip.store(skip, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn take_stall(&self) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = self.reads_to_skip.load(Ordering::SeqCst);
        if remaining > 0 {
            self.reads_to_skip.store(remaining - 1, Ordering::SeqCst);
            return false;
        }
        self.armed.store(false, Ordering::SeqCst);
        true
    }
}

#[async_trait]
impl SessionStore for StallingStore {
    fn get_name(&self) -> &str {
        "stalling"
    }

    async fn get(&self, key: SessionKey) -> Result<Option<String>, String> {
        let value = self.inner.get(key).await?;
        if key == SessionKey::AccessToken && self.take_stall() {
            self.stalled.notify_one();
            self.resume.notified().await;
        }
        Ok(value)
    }

    async fn set(&self, key: SessionKey, value: &str) -> Result<(), String> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: SessionKey) -> Result<(), String> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> Result<(), String> {
        self.inner.clear().await
    }
}

pub fn test_config() -> ConfigV1 {
    ConfigV1::for_base_url("http://backend.test")
}

pub async fn session_store(access: Option<&str>, refresh: Option<&str>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    if let Some(token) = access {
        store.set(SessionKey::AccessToken, token).await.unwrap();
    }
    if let Some(token) = refresh {
        store.set(SessionKey::RefreshToken, token).await.unwrap();
    }
    store.set(SessionKey::Role, "ADMIN").await.unwrap();
    store.set(SessionKey::UserId, "1").await.unwrap();
    store
}

pub fn build_gateway(
    config: &ConfigV1,
    backend: Arc<Backend>,
    store: Arc<MemoryStore>,
) -> Arc<Gateway> {
    Arc::new(Gateway::new(
        config,
        backend,
        store,
        Metrics::new().expect("metrics registry"),
    ))
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}
