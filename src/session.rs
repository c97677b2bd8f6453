use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::{ApiRequest, Transport};
use crate::config::ClientConfig;
use crate::error::{AuthError, Error, detail_from_body};
use crate::storage::Storage;
use crate::types::{AccessToken, CredentialPair, RefreshToken, Role};
use crate::user::{LoginRequest, LoginResponse, RegisterRequest, TokenRefreshRequest, TokenRefreshResponse, User};

/// Authentication state as seen by the UI.
///
/// The user and the authenticated flag only change together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<User>,
    authenticated: bool,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            authenticated: true,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Owns the in-memory session and the credential exchanges.
///
/// Login, register and refresh go straight to the transport: they are
/// never authorized with a bearer and never re-enter the refresh flow.
pub struct SessionManager<T> {
    transport: Arc<T>,
    storage: Storage,
    login_path: String,
    register_path: String,
    refresh_path: String,
    refresh_timeout: Duration,
    state: watch::Sender<Session>,
}

impl<T: Transport> SessionManager<T> {
    /// Seed the session from storage.
    ///
    /// A stored access token plus a stored user starts the session
    /// authenticated without a network round trip; the token is trusted
    /// until a request proves otherwise.
    #[must_use]
    pub fn new(transport: Arc<T>, storage: Storage, config: &ClientConfig) -> Self {
        let initial = match (storage.access_token(), storage.current_user()) {
            (Some(_), Some(user)) => Session::authenticated(user),
            _ => Session::anonymous(),
        };
        let (state, _) = watch::channel(initial);
        Self {
            transport,
            storage,
            login_path: config.login_path.clone(),
            register_path: config.register_path.clone(),
            refresh_path: config.refresh_path.clone(),
            refresh_timeout: config.refresh_timeout,
            state,
        }
    }

    /// Exchange username and password for a token pair and user record.
    ///
    /// Nothing is stored unless the whole response is valid.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::LoginRejected`] for a non-success status,
    /// [`Error::Json`] for a malformed body, or a transport error.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, Error> {
        let request = ApiRequest::post(self.login_path.as_str()).with_json(credentials)?;
        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            let detail = detail_from_body(&response.text());
            tracing::warn!(status = response.status, username = %credentials.username, "Login rejected");
            return Err(AuthError::LoginRejected {
                status: response.status,
                detail,
            }
            .into());
        }

        let login: LoginResponse = response.parse()?;
        self.storage.set_credentials(&CredentialPair {
            access: login.access,
            refresh: login.refresh,
        });
        self.storage.set_current_user(&login.user);

        let session = Session::authenticated(login.user);
        self.state.send_replace(session.clone());
        tracing::info!(user_id = %login_user_id(&session), "Login successful");
        Ok(session)
    }

    /// Create an account. The session is not changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for a non-success status, or a transport error.
    pub async fn register(&self, data: &RegisterRequest) -> Result<serde_json::Value, Error> {
        let request = ApiRequest::post(self.register_path.as_str()).with_json(data)?;
        let response = self
            .transport
            .send(&request)
            .await?
            .ensure_success(&self.register_path)?;
        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        response.parse()
    }

    /// Clear credentials and user. Never fails; a no-op when already signed out.
    pub fn logout(&self) {
        self.storage.remove_tokens();
        self.storage.remove_current_user();
        let changed = self.state.send_if_modified(|session| {
            if *session == Session::anonymous() {
                return false;
            }
            *session = Session::anonymous();
            true
        });
        if changed {
            tracing::info!("Logged out");
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Any failure after the backend is contacted (rejection, transport
    /// error, timeout) signs the user out.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoRefreshToken`] without contacting the backend when
    /// nothing is stored; otherwise [`AuthError::RefreshRejected`],
    /// [`AuthError::Exchange`] or [`AuthError::TimedOut`].
    pub async fn refresh(&self) -> Result<CredentialPair, AuthError> {
        let Some(refresh) = self.storage.refresh_token() else {
            return Err(AuthError::NoRefreshToken);
        };

        let outcome = match tokio::time::timeout(self.refresh_timeout, self.exchange(&refresh)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::TimedOut(self.refresh_timeout)),
        };

        match outcome {
            Ok(response) => {
                let pair = CredentialPair {
                    access: response.access,
                    refresh: response.refresh.unwrap_or(refresh),
                };
                self.storage.set_credentials(&pair);
                tracing::debug!("Access token refreshed");
                Ok(pair)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.logout();
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        refresh: &RefreshToken,
    ) -> Result<TokenRefreshResponse, AuthError> {
        let request = ApiRequest::post(self.refresh_path.as_str())
            .with_json(&TokenRefreshRequest {
                refresh: refresh.as_str(),
            })
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::RefreshRejected {
                status: response.status,
                detail: detail_from_body(&response.text()),
            });
        }
        response
            .parse()
            .map_err(|e| AuthError::Exchange(e.to_string()))
    }

    /// Record a freshly fetched profile.
    pub(crate) fn apply_profile(&self, user: User) {
        self.storage.set_current_user(&user);
        if self.storage.access_token().is_some() {
            self.state.send_replace(Session::authenticated(user));
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receive every session change (login, logout, profile updates).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.with_user(|u| u.user_type == role)
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.with_user(|u| roles.contains(&u.user_type))
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.with_user(User::is_admin)
    }

    #[must_use]
    pub fn is_editor(&self) -> bool {
        self.with_user(User::is_editor)
    }

    #[must_use]
    pub fn is_author(&self) -> bool {
        self.with_user(User::is_author)
    }

    #[must_use]
    pub fn has_admin_access(&self) -> bool {
        self.with_user(User::has_admin_access)
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.storage.access_token()
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.access_token().is_some()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn with_user(&self, f: impl FnOnce(&User) -> bool) -> bool {
        self.state.borrow().user.as_ref().is_some_and(f)
    }
}

fn login_user_id(session: &Session) -> String {
    session
        .user()
        .map(|u| u.id.to_string())
        .unwrap_or_default()
}
