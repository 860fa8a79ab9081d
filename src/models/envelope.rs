use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// The `{ data, message, error }` wrapper every backend response uses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse a response body into an envelope.
    pub fn parse(body: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Unwrap `data`, turning a null/missing payload into a decode error.
    pub fn into_data(self) -> Result<T, GatewayError> {
        match self.data {
            Some(data) => Ok(data),
            None => Err(GatewayError::Decode(format!(
                "response envelope has no data (message: {})",
                self.message.as_deref().unwrap_or("none")
            ))),
        }
    }
}

/// Best-effort extraction of the envelope `message` from an error body.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(str::to_string)
}

/// Payload of a successful `POST /auth/refresh-token`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub access_token: String,
}

/// Payload of a successful login.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "id_as_string")]
    pub user_id: Option<String>,
}

/// User ids arrive as numbers or strings depending on the endpoint.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
