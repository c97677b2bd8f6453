use crate::error::{AuthError, Error, ErrorPayload};

/// User-facing description of a failed request.
///
/// `status` is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: u16,
    pub message: String,
    pub payload: Option<ErrorPayload>,
}

impl ErrorReport {
    /// Build the report for `error` and log it.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let status = status_of(error);
        let payload = error.payload();
        let message = message_for(status, payload.as_ref());

        tracing::error!(status, message = %message, error = %error, "API request failed");

        Self {
            status,
            message,
            payload,
        }
    }

    /// Whether the message should be shown to the user.
    ///
    /// 401s are left to the refresh flow.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        self.status != 401
    }
}

fn status_of(error: &Error) -> u16 {
    match error {
        // The session is gone either way.
        Error::Auth(
            AuthError::NoRefreshToken | AuthError::Abandoned | AuthError::RefreshRejected { .. },
        ) => 401,
        other => other.status().unwrap_or(0),
    }
}

fn message_for(status: u16, payload: Option<&ErrorPayload>) -> String {
    let backend_message =
        || payload.and_then(|p| p.message.as_deref().or(p.error.as_deref()));

    match status {
        0 => "Cannot reach the server. Check your internet connection.".to_owned(),
        400 => payload
            .and_then(ErrorPayload::first_field_error)
            .or_else(backend_message)
            .unwrap_or("Invalid request")
            .to_owned(),
        401 => "Your session has expired. Please sign in again.".to_owned(),
        403 => "You are not allowed to perform this action.".to_owned(),
        404 => "The requested resource was not found.".to_owned(),
        500 => "A server error occurred. Please try again later.".to_owned(),
        503 => "The service is currently unavailable. Please try again later.".to_owned(),
        other => backend_message()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Request failed with status {other}")),
    }
}
