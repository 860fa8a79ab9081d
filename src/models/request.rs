use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::models::envelope::Envelope;

/// An outbound API call, kept around so it can be replayed after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Correlates log lines for the original call and its replay.
    pub id: Uuid,
    pub method: Method,
    /// Path relative to the configured API base URL, e.g. `/api/v1/categories`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    /// Set once the request has been replayed after an authorization failure.
    pub retried: bool,
    /// Refresh cycles finished when the credential was attached.
    pub refresh_generation: u64,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
            refresh_generation: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Replace the `Authorization` header with `Bearer <token>`.
    ///
    /// Tokens that are not valid header values are dropped with the header left unset.
    pub fn set_bearer(&mut self, token: &str) {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(request_id = %self.id, "Access token is not a valid header value");
                self.headers.remove(AUTHORIZATION);
            }
        }
    }

    /// The bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// A response as returned by a [`Transport`](crate::gateway::Transport).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        ApiResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as an envelope and return its `data`, which must be present.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, GatewayError> {
        Envelope::<T>::parse(&self.body)?.into_data()
    }

    /// Decode the envelope `data` as `T`, reading a null or missing payload as
    /// JSON `null`. An empty body counts as a missing payload.
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T, GatewayError> {
        let data = if self.body.trim().is_empty() {
            Value::Null
        } else {
            Envelope::<Value>::parse(&self.body)?
                .data
                .unwrap_or(Value::Null)
        };
        serde_json::from_value(data).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
