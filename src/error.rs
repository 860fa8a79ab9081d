use reqwest::StatusCode;

/// The failure of a single API call as observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// The backend answered with a non-success status.
    Status {
        status: StatusCode,
        /// `message` field of the `{ data, message, error }` envelope, if the body had one.
        message: Option<String>,
        body: String,
    },
    /// The request never produced a response (connect, timeout, IO).
    Transport(String),
}

impl ApiFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiFailure::Status { status, .. } => Some(*status),
            ApiFailure::Transport(_) => None,
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFailure::Status {
                status,
                message: Some(message),
                ..
            } => write!(f, "{}: {}", status, message),
            ApiFailure::Status { status, .. } => write!(f, "{}", status),
            ApiFailure::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Unified error type for everything that goes through the gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    // ── Request Errors ──────────────────────────────────────────────────
    #[error("Request failed: {0}")]
    Unrecoverable(ApiFailure),

    #[error("Could not decode response: {0}")]
    Decode(String),

    // ── Session Errors ──────────────────────────────────────────────────
    #[error("Session expired")]
    SessionExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Session store error: {0}")]
    Store(String),
}

impl GatewayError {
    /// Status code of the underlying HTTP failure, when there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GatewayError::Unrecoverable(failure) => failure.status(),
            _ => None,
        }
    }

    /// True for the failures that end the session and send the user back to login.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayError::SessionExpired
                | GatewayError::RefreshFailed(_)
                | GatewayError::NotAuthenticated
        )
    }
}
