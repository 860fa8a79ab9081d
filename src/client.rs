//! Typed API facade used by feature code.
//!
//! Every call goes through the protected-route guard and the [`Gateway`], and
//! decodes the `{ data, message, error }` envelope into the caller's type.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ConfigV1;
use crate::error::GatewayError;
use crate::gateway::{Gateway, LogoutReason};
use crate::models::{ApiRequest, ApiResponse, CredentialPair, LoginData, Session};

pub struct ApiClient {
    gateway: Arc<Gateway>,
    allowed_roles: Vec<String>,
    login_path: String,
}

impl ApiClient {
    pub fn new(gateway: Arc<Gateway>, config: &ConfigV1) -> Self {
        ApiClient {
            gateway,
            allowed_roles: config.session.allowed_roles.clone(),
            login_path: config.api.login_path.clone(),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The protected-route guard.
    ///
    /// Without an access token the session is ended and nothing is sent. A
    /// stored role outside the allowed set is refused.
    pub async fn require_session(&self) -> Result<Session, GatewayError> {
        let session = self
            .gateway
            .store()
            .load()
            .await
            .map_err(GatewayError::Store)?;

        if session.access_token.is_none() {
            warn!("Protected call attempted without an access token");
            self.gateway.logout(LogoutReason::NotAuthenticated).await;
            return Err(GatewayError::NotAuthenticated);
        }
        if !session.has_role(&self.allowed_roles) {
            return Err(GatewayError::Forbidden(format!(
                "role {} may not use the dashboard",
                session.role.as_deref().unwrap_or("<none>")
            )));
        }
        Ok(session)
    }

    /// Send a guarded request and return the raw response.
    pub async fn raw(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.require_session().await?;
        self.gateway.send(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.raw(ApiRequest::get(path)).await?.into_payload()
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let request = query
            .iter()
            .fold(ApiRequest::get(path), |request, (k, v)| request.with_query(*k, *v));
        self.raw(request).await?.into_payload()
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        self.with_body(Method::POST, path, body).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        self.with_body(Method::PUT, path, body).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        self.with_body(Method::PATCH, path, body).await
    }

    /// Delete a resource and return its `data` as raw JSON (`null` when absent).
    pub async fn delete(&self, path: &str) -> Result<Value, GatewayError> {
        self.raw(ApiRequest::new(Method::DELETE, path))
            .await?
            .into_payload()
    }

    async fn with_body<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let body = serde_json::to_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.raw(ApiRequest::new(method, path).with_body(body))
            .await?
            .into_payload()
    }

    /// Log in and persist the session. Roles outside the allowed set are refused
    /// and nothing is stored.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        let request = ApiRequest::post(
            self.login_path.clone(),
            json!({ "email": email, "password": password }),
        );
        let data: LoginData = self.gateway.send_public(request).await?.into_data()?;

        let session = Session::new(
            CredentialPair {
                access_token: data.access_token,
                refresh_token: data.refresh_token,
            },
            data.role,
            data.user_id,
        );
        if !session.has_role(&self.allowed_roles) {
            warn!(role = ?session.role, "Login refused for role");
            return Err(GatewayError::Forbidden(format!(
                "role {} may not use the dashboard",
                session.role.as_deref().unwrap_or("<none>")
            )));
        }

        self.gateway
            .store()
            .save(&session)
            .await
            .map_err(GatewayError::Store)?;
        info!(user_id = ?session.user_id, role = ?session.role, "Logged in");
        Ok(session)
    }

    pub async fn logout(&self) {
        self.gateway.logout(LogoutReason::UserRequested).await;
    }
}
