use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::events::{LogoutReason, SessionEvent, SessionEvents};
use super::refresh::{RefreshCoordinator, RefreshLease, Ticket};
use super::transport::Transport;
use crate::config::ConfigV1;
use crate::error::{ApiFailure, GatewayError};
use crate::metrics::{Metrics, MetricsRecorder};
use crate::models::envelope::error_message;
use crate::models::{ApiRequest, ApiResponse, RefreshData, SessionKey};
use crate::store::{get_or_none, SessionStore};

/// Wraps every outbound API call: attaches the bearer credential and recovers
/// from an expired one with a single-flight refresh.
///
/// One gateway is built per session and shared behind an `Arc`; the refresh
/// flag and the queue of parked requests live inside it.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    refresh: RefreshCoordinator,
    events: SessionEvents,
    metrics: Metrics,
    loading: watch::Sender<usize>,
    refresh_path: String,
    auth_failure_status: StatusCode,
    refresh_timeout: Option<Duration>,
    login_route: String,
}

impl Gateway {
    pub fn new(
        config: &ConfigV1,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        metrics: Metrics,
    ) -> Self {
        let auth_failure_status = StatusCode::from_u16(config.gateway.auth_failure_status)
            .unwrap_or_else(|_| {
                warn!(
                    "Invalid gateway.auth_failure_status {}, falling back to 403",
                    config.gateway.auth_failure_status
                );
                StatusCode::FORBIDDEN
            });
        let (loading, _) = watch::channel(0);

        info!(
            "Creating gateway with transport '{}' and session store '{}'",
            transport.get_name(),
            store.get_name()
        );

        Gateway {
            transport,
            store,
            refresh: RefreshCoordinator::new(),
            events: SessionEvents::default(),
            metrics,
            loading,
            refresh_path: config.api.refresh_path.clone(),
            auth_failure_status,
            refresh_timeout: config.gateway.refresh_timeout_in_ms.map(Duration::from_millis),
            login_route: config.gateway.login_route.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of requests currently in flight through [`Gateway::send`].
    pub fn loading(&self) -> watch::Receiver<usize> {
        self.loading.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    pub fn pending_requests(&self) -> usize {
        self.refresh.pending_requests()
    }

    /// Set `Authorization: Bearer <access token>` if the session holds one.
    ///
    /// A missing token is not an error; the request goes out unauthenticated.
    pub async fn attach_credential(&self, request: &mut ApiRequest) {
        match get_or_none(self.store.as_ref(), SessionKey::AccessToken).await {
            Some(token) => request.set_bearer(&token),
            None => debug!(request_id = %request.id, "No access token stored, sending unauthenticated"),
        }
    }

    /// Attach the credential, send the request, and handle the response.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let _loading = LoadingGuard::new(&self.loading);

        // Read before the credential so a refresh finishing in between is noticed.
        request.refresh_generation = self.refresh.generation();
        self.attach_credential(&mut request).await;
        let outcome = self.transport.send(&request).await;
        let result = self.handle_response(request, outcome).await;

        self.metrics.record_request(outcome_label(&result));
        result
    }

    /// Send without a credential and without refresh handling (login and other public endpoints).
    pub async fn send_public(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let _loading = LoadingGuard::new(&self.loading);

        let outcome = self.transport.send(&request).await;
        let result = classify(outcome).map_err(GatewayError::Unrecoverable);

        self.metrics.record_request(outcome_label(&result));
        result
    }

    /// Decide what to do with the outcome of `request`.
    ///
    /// Successes pass through. Authorization failures on a request that has
    /// not been retried trigger (or join) a refresh and a single replay;
    /// everything else is returned as [`GatewayError::Unrecoverable`].
    pub async fn handle_response(
        &self,
        mut request: ApiRequest,
        outcome: Result<ApiResponse, String>,
    ) -> Result<ApiResponse, GatewayError> {
        let failure = match classify(outcome) {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        if failure.status() != Some(self.auth_failure_status) || request.retried {
            debug!(
                request_id = %request.id,
                path = %request.path,
                retried = request.retried,
                "Request failed: {}", failure
            );
            return Err(GatewayError::Unrecoverable(failure));
        }

        let Some(refresh_token) = get_or_none(self.store.as_ref(), SessionKey::RefreshToken).await
        else {
            warn!(
                request_id = %request.id,
                path = %request.path,
                "Authorization failed and no refresh token is stored"
            );
            self.logout(LogoutReason::SessionExpired).await;
            return Err(GatewayError::SessionExpired);
        };

        request.retried = true;

        // The request went out before a refresh that has since finished.
        if let Some(current) = get_or_none(self.store.as_ref(), SessionKey::AccessToken).await {
            if request.bearer() != Some(current.as_str()) {
                debug!(request_id = %request.id, "Credential already refreshed, replaying");
                return self.replay(request, &current).await;
            }
        }

        match self.refresh.acquire(request.id, request.refresh_generation) {
            Ticket::Follower(waiter) => {
                self.metrics.record_queued();
                let token = match waiter.await {
                    Ok(outcome) => outcome?,
                    Err(_) => {
                        return Err(GatewayError::RefreshFailed(
                            "refresh ended without a result".to_string(),
                        ))
                    }
                };
                self.replay(request, &token).await
            }
            Ticket::Completed(outcome) => {
                let token = outcome?;
                self.replay(request, &token).await
            }
            Ticket::Leader(lease) => self.refresh_and_replay(lease, request, &refresh_token).await,
        }
    }

    async fn refresh_and_replay(
        &self,
        lease: RefreshLease<'_>,
        request: ApiRequest,
        refresh_token: &str,
    ) -> Result<ApiResponse, GatewayError> {
        info!(request_id = %request.id, path = %request.path, "Access token rejected, refreshing");
        let started = Instant::now();

        match self.request_new_token(refresh_token).await {
            Ok(token) => {
                self.metrics
                    .record_refresh("success", started.elapsed().as_secs_f64());
                if let Err(e) = self.store.set(SessionKey::AccessToken, &token).await {
                    warn!("Failed to persist refreshed access token: {}", e);
                }

                let woken = lease.complete(Ok(token.clone()));
                info!(queued = woken.len(), "Access token refreshed");
                self.events.publish(SessionEvent::TokenRefreshed);

                self.replay(request, &token).await
            }
            Err(e) => {
                self.metrics
                    .record_refresh("failure", started.elapsed().as_secs_f64());
                warn!("Token refresh failed: {}", e);

                self.logout(LogoutReason::RefreshFailed).await;
                let err = GatewayError::RefreshFailed(e);
                let rejected = lease.complete(Err(err.clone()));
                if !rejected.is_empty() {
                    warn!(
                        queued = rejected.len(),
                        "Rejected requests queued behind the failed refresh"
                    );
                }
                Err(err)
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    async fn request_new_token(&self, refresh_token: &str) -> Result<String, String> {
        let request = ApiRequest::post(self.refresh_path.clone(), json!({ "token": refresh_token }));

        let call = self.transport.send(&request);
        let response = match self.refresh_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| format!("no response within {}ms", limit.as_millis()))?,
            None => call.await,
        }?;

        if !response.is_success() {
            let failure = classify(Ok(response))
                .err()
                .map(|f| f.to_string())
                .unwrap_or_default();
            return Err(format!("refresh endpoint answered {}", failure));
        }

        response
            .into_data::<RefreshData>()
            .map(|data| data.access_token)
            .map_err(|e| e.to_string())
    }

    /// Re-send `request` once with `token`. The outcome is final.
    async fn replay(&self, mut request: ApiRequest, token: &str) -> Result<ApiResponse, GatewayError> {
        request.set_bearer(token);
        debug!(request_id = %request.id, path = %request.path, "Replaying request");

        let outcome = self.transport.send(&request).await;
        let result = classify(outcome).map_err(GatewayError::Unrecoverable);
        self.metrics
            .record_replay(if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Clear the stored session and tell subscribers to go to the login route.
    pub async fn logout(&self, reason: LogoutReason) {
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear session store on logout: {}", e);
        }
        self.metrics.record_logout(reason.as_str());
        info!(reason = reason.as_str(), "Session cleared, redirecting to {}", self.login_route);
        self.events.publish(SessionEvent::LoggedOut {
            reason,
            redirect_to: self.login_route.clone(),
        });
    }
}

/// Split a transport outcome into a usable response or a failure.
fn classify(outcome: Result<ApiResponse, String>) -> Result<ApiResponse, ApiFailure> {
    match outcome {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(ApiFailure::Status {
            status: response.status,
            message: error_message(&response.body),
            body: response.body,
        }),
        Err(e) => Err(ApiFailure::Transport(e)),
    }
}

fn outcome_label(result: &Result<ApiResponse, GatewayError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(GatewayError::Unrecoverable(ApiFailure::Transport(_))) => "transport_error",
        Err(GatewayError::Unrecoverable(_)) => "error",
        Err(GatewayError::SessionExpired) => "session_expired",
        Err(GatewayError::RefreshFailed(_)) => "refresh_failed",
        Err(_) => "other",
    }
}

/// Counts a request as in flight for as long as it is alive.
struct LoadingGuard<'a> {
    counter: &'a watch::Sender<usize>,
}

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        LoadingGuard { counter }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}
