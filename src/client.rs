use std::sync::Arc;

use crate::api::Transport;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::guard::{Guard, NavigationAttempt, NavigationState};
use crate::pipeline::AuthPipeline;
use crate::services::{Account, Articles, Bookmarks, Comments, Taxonomy};
use crate::session::{Session, SessionManager};
use crate::storage::{CredentialStore, Storage};
use crate::user::{LoginRequest, RegisterRequest};

/// Entry point wiring storage, session, pipeline and services together.
///
/// One client owns one refresh coordinator: requests made through the same
/// client share a single token refresh.
pub struct NewsClient<T> {
    pipeline: AuthPipeline<T>,
}

#[cfg(feature = "http")]
impl NewsClient<crate::http::HttpTransport> {
    /// Client talking HTTP to `config.api_url()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig, store: impl CredentialStore) -> Result<Self, Error> {
        let transport = crate::http::HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(transport, config, store))
    }
}

impl<T: Transport> NewsClient<T> {
    /// Client over any [`Transport`].
    ///
    /// `store` is ignored in [`ExecutionContext::Server`](crate::ExecutionContext::Server).
    #[must_use]
    pub fn with_transport(transport: T, config: ClientConfig, store: impl CredentialStore) -> Self {
        let transport = Arc::new(transport);
        let storage = Storage::for_context(config.context(), store);
        let session = Arc::new(SessionManager::new(transport.clone(), storage, &config));
        tracing::debug!(api_url = %config.api_url(), context = ?config.context(), "Client initialized");
        Self {
            pipeline: AuthPipeline::new(transport, session, config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.pipeline.config()
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager<T> {
        self.pipeline.session()
    }

    #[must_use]
    pub fn pipeline(&self) -> &AuthPipeline<T> {
        &self.pipeline
    }

    /// # Errors
    ///
    /// See [`SessionManager::login`].
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, Error> {
        self.session().login(&LoginRequest::new(username, password)).await
    }

    /// # Errors
    ///
    /// See [`SessionManager::register`].
    pub async fn register(&self, data: &RegisterRequest) -> Result<serde_json::Value, Error> {
        self.session().register(data).await
    }

    pub fn logout(&self) {
        self.session().logout();
    }

    #[must_use]
    pub fn account(&self) -> Account<'_, T> {
        Account::new(&self.pipeline)
    }

    #[must_use]
    pub fn articles(&self) -> Articles<'_, T> {
        Articles::new(&self.pipeline)
    }

    #[must_use]
    pub fn comments(&self) -> Comments<'_, T> {
        Comments::new(&self.pipeline)
    }

    #[must_use]
    pub fn bookmarks(&self) -> Bookmarks<'_, T> {
        Bookmarks::new(&self.pipeline)
    }

    #[must_use]
    pub fn taxonomy(&self) -> Taxonomy<'_, T> {
        Taxonomy::new(&self.pipeline)
    }

    /// Resolve a navigation to `path` through `guards`.
    #[must_use]
    pub fn navigate(&self, path: &str, guards: &[Guard]) -> NavigationState {
        let mut attempt = NavigationAttempt::new(path);
        attempt
            .resolve(guards, self.session(), self.config())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiRequest;
    use crate::config::ExecutionContext;
    use crate::guard::Redirect;
    use crate::session::tests::FakeBackend;
    use crate::storage::MemoryStore;

    fn client(config: ClientConfig) -> NewsClient<FakeBackend> {
        NewsClient::with_transport(FakeBackend::new(), config, MemoryStore::new())
    }

    #[tokio::test]
    async fn login_unlocks_guarded_routes() {
        let client = client(ClientConfig::development());

        assert_eq!(
            client.navigate("/profile", &[Guard::Authenticated]),
            NavigationState::Redirected(Redirect {
                to: "/auth/login".into(),
                return_to: Some("/profile".into()),
            })
        );

        client.login("a", "b").await.unwrap();

        assert_eq!(client.navigate("/profile", &[Guard::Authenticated]), NavigationState::Allowed);
        assert_eq!(client.navigate("/admin", &[Guard::Admin]), NavigationState::Redirected(Redirect {
            to: "/".into(),
            return_to: None,
        }));
        assert_eq!(client.navigate("/auth/login", &[Guard::Guest]), NavigationState::Redirected(Redirect {
            to: "/".into(),
            return_to: None,
        }));

        client.logout();
        assert_eq!(client.navigate("/auth/login", &[Guard::Guest]), NavigationState::Allowed);
    }

    #[tokio::test]
    async fn requests_use_the_session_token() {
        let client = client(ClientConfig::development());
        client.login("a", "b").await.unwrap();

        let response = client.pipeline().execute(ApiRequest::get("/articles/")).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn server_context_keeps_nothing() {
        let config = ClientConfig::development().with_context(ExecutionContext::Server);
        let client = client(config);

        client.login("a", "b").await.unwrap();

        assert!(!client.session().has_token());
        assert!(client.session().storage().current_user().is_none());
        assert_eq!(client.navigate("/admin", &[Guard::Admin]), NavigationState::Allowed);
    }
}
