//! Session state and the derived authentication state
//!
//! The client holds at most one live session. [`AuthState`] is never stored:
//! it is computed from the token slot and the last remote error code, which
//! are only writable through [`Session::set_token`] and
//! [`Session::set_last_error`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Error code the backend uses to signal that an MFA challenge was issued
pub const MFA_REQUIRED_CODE: i64 = -90041;

/// Default session lifetime in seconds (8 hours)
pub const DEFAULT_SESSION_TTL_SECS: i64 = 28_800;

/// Token values the backend or a cookie jar may hand back for "no session"
const PLACEHOLDER_TOKENS: &[&str] = &["", "None", "null"];

/// Authentication state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotAuthenticated,
    WaitingForMfa,
    Authenticated,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::NotAuthenticated => "not authenticated",
            Self::WaitingForMfa => "waiting for MFA",
            Self::Authenticated => "authenticated",
        };
        f.write_str(state)
    }
}

/// Single-slot session owned by one client
#[derive(Debug, Clone)]
pub struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    username: String,
    last_error_code: Option<i64>,
    ttl: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_SESSION_TTL_SECS))
    }
}

impl Session {
    /// Create an empty session whose tokens live for `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            token: None,
            expires_at: None,
            username: String::new(),
            last_error_code: None,
            ttl,
        }
    }

    /// Current token, or `None` if absent or expired
    pub fn token(&self) -> Option<&str> {
        self.token_at(Utc::now())
    }

    fn token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at && !token.is_empty() => {
                Some(token.as_str())
            }
            _ => None,
        }
    }

    /// Replace the token slot. The previous token, if any, is gone.
    pub fn set_token(&mut self, token: Option<String>) {
        match token {
            Some(token) if !token.is_empty() => {
                self.expires_at = Some(
                    Utc::now()
                        .checked_add_signed(self.ttl)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                );
                self.token = Some(token);
            }
            _ => {
                self.token = None;
                self.expires_at = None;
            }
        }
    }

    /// Expiry of the current token
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token().and(self.expires_at)
    }

    pub fn last_error_code(&self) -> Option<i64> {
        self.last_error_code
    }

    /// Record the first error code of the latest response
    pub fn set_last_error(&mut self, code: Option<i64>) {
        self.last_error_code = code;
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Authentication state derived from the token and the last error
    pub fn auth_state(&self) -> AuthState {
        self.auth_state_at(Utc::now())
    }

    fn auth_state_at(&self, now: DateTime<Utc>) -> AuthState {
        if self.token_at(now).is_some() {
            AuthState::Authenticated
        } else if self.last_error_code == Some(MFA_REQUIRED_CODE) {
            AuthState::WaitingForMfa
        } else {
            AuthState::NotAuthenticated
        }
    }

    /// Local check with no network round trip
    ///
    /// Placeholder tokens still count here; [`EdgeClient::verify_auth_state`]
    /// is where they get cleared.
    ///
    /// [`EdgeClient::verify_auth_state`]: crate::EdgeClient::verify_auth_state
    pub fn is_valid_locally(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    /// Whether the stored token is missing or one of the placeholder values
    pub fn has_placeholder_token(&self) -> bool {
        match self.token() {
            None => true,
            Some(token) => PLACEHOLDER_TOKENS.contains(&token),
        }
    }

    /// Token shortened for log output
    pub(crate) fn redacted_token(&self) -> String {
        match self.token() {
            Some(token) if token.chars().count() > 8 => {
                format!("{}…", token.chars().take(4).collect::<String>())
            }
            Some(_) => "…".to_string(),
            None => "<none>".to_string(),
        }
    }
}
