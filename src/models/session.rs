use serde::{Deserialize, Serialize};

/// The keys the dashboard keeps in client-local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    AccessToken,
    RefreshToken,
    Role,
    UserId,
}

impl SessionKey {
    pub const ALL: [SessionKey; 4] = [
        SessionKey::AccessToken,
        SessionKey::RefreshToken,
        SessionKey::Role,
        SessionKey::UserId,
    ];

    /// The storage key name, as the browser dashboard wrote it.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::AccessToken => "accessToken",
            SessionKey::RefreshToken => "refreshToken",
            SessionKey::Role => "role",
            SessionKey::UserId => "userId",
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An access/refresh token pair.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

// Tokens stay out of logs.
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Everything persisted for a logged-in dashboard user.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<String>,
    pub user_id: Option<String>,
}

impl Session {
    pub fn new(credentials: CredentialPair, role: Option<String>, user_id: Option<String>) -> Self {
        Session {
            access_token: Some(credentials.access_token),
            refresh_token: Some(credentials.refresh_token),
            role,
            user_id,
        }
    }

    pub fn get(&self, key: SessionKey) -> Option<&str> {
        match key {
            SessionKey::AccessToken => self.access_token.as_deref(),
            SessionKey::RefreshToken => self.refresh_token.as_deref(),
            SessionKey::Role => self.role.as_deref(),
            SessionKey::UserId => self.user_id.as_deref(),
        }
    }

    pub fn set(&mut self, key: SessionKey, value: Option<String>) {
        match key {
            SessionKey::AccessToken => self.access_token = value,
            SessionKey::RefreshToken => self.refresh_token = value,
            SessionKey::Role => self.role = value,
            SessionKey::UserId => self.user_id = value,
        }
    }

    /// Both tokens, if the session holds a complete pair.
    pub fn credentials(&self) -> Option<CredentialPair> {
        Some(CredentialPair {
            access_token: self.access_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        SessionKey::ALL.iter().all(|key| self.get(*key).is_none())
    }

    /// Whether the stored role is one of `allowed`.
    pub fn has_role(&self, allowed: &[String]) -> bool {
        match &self.role {
            Some(role) => allowed.iter().any(|a| a == role),
            None => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("role", &self.role)
            .field("user_id", &self.user_id)
            .finish()
    }
}
