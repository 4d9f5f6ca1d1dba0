use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error marker the identity layer stamps on a session whose access token
/// could no longer be refreshed.
pub const REFRESH_ACCESS_TOKEN_ERROR: &str = "RefreshAccessTokenError";

/// Failure marker carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionError {
    /// The provider refused to renew the access token. The session is
    /// recognised but can no longer be used.
    RefreshAccessTokenError,
    /// Any other marker, preserved verbatim.
    Other(String),
}

impl From<String> for SessionError {
    fn from(s: String) -> Self {
        if s == REFRESH_ACCESS_TOKEN_ERROR {
            SessionError::RefreshAccessTokenError
        } else {
            SessionError::Other(s)
        }
    }
}

impl From<SessionError> for String {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::RefreshAccessTokenError => REFRESH_ACCESS_TOKEN_ERROR.to_string(),
            SessionError::Other(s) => s,
        }
    }
}

/// Minimal identity subset carried in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// Verified session token recovered from a signed cookie.
///
/// Instances only come out of a `TokenVerifier`; the gate never builds one
/// from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<SessionError>,
    #[serde(default)]
    pub user: Option<SessionUser>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl SessionToken {
    /// True when the identity layer flagged the session as no longer renewable.
    pub fn refresh_failed(&self) -> bool {
        matches!(self.error, Some(SessionError::RefreshAccessTokenError))
    }

    /// User id, falling back to the `sub` claim.
    pub fn user_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.id.as_deref())
            .or(self.sub.as_deref())
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.email.as_deref())
    }
}
