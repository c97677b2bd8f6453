use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Terminal authentication failures.
///
/// `Clone` because a single refresh outcome is handed to every request
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No refresh token is stored; the backend was not contacted.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The login endpoint rejected the credentials.
    #[error("Login rejected (status {status}): {detail}")]
    LoginRejected { status: u16, detail: String },

    /// The refresh endpoint rejected the refresh token.
    #[error("Token refresh rejected (status {status}): {detail}")]
    RefreshRejected { status: u16, detail: String },

    /// The refresh exchange failed before a response arrived.
    #[error("Token refresh failed: {0}")]
    Exchange(String),

    /// The refresh exchange did not settle within the configured bound.
    #[error("Token refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The refresh task ended without an outcome.
    #[error("Token refresh abandoned")]
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// 401 that survived the single refresh-and-replay cycle.
    #[error("Unauthorized: {path}")]
    Unauthorized { path: String, detail: String },

    /// Any other non-success status, passed through as-is.
    #[error("{path} failed with status {status}")]
    Api {
        path: String,
        status: u16,
        body: String,
    },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status behind this error, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Api { status, .. } => Some(*status),
            Self::Auth(AuthError::LoginRejected { status, .. })
            | Self::Auth(AuthError::RefreshRejected { status, .. }) => Some(*status),
            #[cfg(feature = "http")]
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Parsed backend error body, when the failure carried one.
    #[must_use]
    pub fn payload(&self) -> Option<ErrorPayload> {
        let body = match self {
            Self::Api { body, .. } => body.as_str(),
            Self::Unauthorized { detail, .. } => detail.as_str(),
            _ => return None,
        };
        serde_json::from_str(body).ok()
    }

    /// Whether the user has to sign in again before retrying.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Unauthorized { .. })
    }
}

/// Error body as returned by the backend.
///
/// Every field is optional; the backend uses `detail` for framework
/// errors and `errors` for field validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ErrorPayload {
    /// Most specific human-readable message in the payload.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.first_field_error()
            .or(self.message.as_deref())
            .or(self.error.as_deref())
            .or(self.detail.as_deref())
    }

    /// First message of the first field in `errors`.
    #[must_use]
    pub fn first_field_error(&self) -> Option<&str> {
        self.errors
            .values()
            .next()
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }
}

/// Short description of a failed response body for `detail` fields.
pub(crate) fn detail_from_body(body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|p| p.summary().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
