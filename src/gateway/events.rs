use tokio::sync::broadcast;
use tracing::debug;

/// Why the gateway ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// Authorization failed and no refresh token was stored.
    SessionExpired,
    /// The refresh call was rejected, failed, or timed out.
    RefreshFailed,
    /// A protected call was attempted without an access token.
    NotAuthenticated,
    /// The user logged out.
    UserRequested,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::SessionExpired => "session_expired",
            LogoutReason::RefreshFailed => "refresh_failed",
            LogoutReason::NotAuthenticated => "not_authenticated",
            LogoutReason::UserRequested => "user_requested",
        }
    }
}

/// Session changes the UI layer reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TokenRefreshed,
    /// The session was cleared; navigate to `redirect_to`.
    LoggedOut {
        reason: LogoutReason,
        redirect_to: String,
    },
}

/// Fan-out of [`SessionEvent`]s. Publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        SessionEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("Session event dropped, no subscribers");
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(32)
    }
}
