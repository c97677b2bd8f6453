use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{AuthError, Error};
use crate::session::SessionManager;
use crate::types::AccessToken;

type RefreshOutcome = Result<AccessToken, AuthError>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Single-flight coordination of token refreshes.
///
/// The first request to join while idle starts the exchange on a detached
/// task; every request joining before it settles, the starter included,
/// queues for that task's outcome. Dropping a queued request never
/// cancels the exchange.
#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

struct Ticket {
    outcome: oneshot::Receiver<RefreshOutcome>,
    /// Whether this request has to start the exchange.
    starts: bool,
}

impl RefreshCoordinator {
    /// Leadership is decided and the flag set in one critical section.
    fn join(&self) -> Ticket {
        let mut state = self.state.lock();
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        let starts = !state.refreshing;
        state.refreshing = true;
        Ticket { outcome: rx, starts }
    }

    /// Clear the flag and hand `outcome` to every queued request, in order.
    fn settle(&self, outcome: &RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        let released = waiters.len();
        for waiter in waiters {
            // A request that was dropped has nobody left to tell.
            let _ = waiter.send(outcome.clone());
        }
        released
    }

    fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// Settles the coordinator even if the refresh task dies without an outcome.
struct SettleGuard {
    coordinator: Arc<RefreshCoordinator>,
    settled: bool,
}

impl SettleGuard {
    fn settle(mut self, outcome: &RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.coordinator.settle(&Err(AuthError::Abandoned));
            tracing::warn!(waiters = released, "Token refresh task ended without an outcome");
        }
    }
}

/// Authorizes outgoing requests and recovers from expired access tokens.
///
/// Every request gets the stored access token as a bearer, except login
/// and registration. A 401 triggers at most one refresh per pipeline no
/// matter how many requests fail at once, after which each failed request
/// is replayed exactly once.
pub struct AuthPipeline<T> {
    transport: Arc<T>,
    session: Arc<SessionManager<T>>,
    config: ClientConfig,
    refresh: Arc<RefreshCoordinator>,
}

impl<T: Transport> AuthPipeline<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, session: Arc<SessionManager<T>>, config: ClientConfig) -> Self {
        Self {
            transport,
            session,
            config,
            refresh: Arc::default(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager<T>> {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a refresh exchange is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Requests currently queued behind an in-flight refresh.
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.refresh.pending_waiters()
    }

    /// Send a request, refreshing and replaying once on 401.
    ///
    /// Every status other than a recoverable 401 is returned unmodified.
    /// A 401 on the replay is returned as-is and not retried.
    ///
    /// # Errors
    ///
    /// Transport failures, or [`Error::Auth`] when the refresh fails (the
    /// session is signed out in that case).
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, Error> {
        let exempt = self.config.is_auth_exempt(&request.path);
        request.bearer = if exempt {
            None
        } else {
            self.session.access_token()
        };

        let response = self.transport.send(&request).await?;
        if exempt || !response.is_unauthorized() {
            return Ok(response);
        }

        let token = self.recover(request.bearer.as_ref(), &request.path).await?;
        request.bearer = Some(token);
        let replayed = self.transport.send(&request).await?;
        if replayed.is_unauthorized() {
            tracing::warn!(path = %request.path, "Request still unauthorized after token refresh");
        }
        Ok(replayed)
    }

    /// Send a request and decode a successful JSON body.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`Error::Unauthorized`] /
    /// [`Error::Api`] for non-success statuses and [`Error::Json`] for
    /// malformed bodies.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, Error> {
        let path = request.path.clone();
        self.execute(request).await?.ensure_success(&path)?.parse()
    }

    /// Send a request whose successful body is ignored.
    ///
    /// # Errors
    ///
    /// As [`send_json`](Self::send_json), minus decoding.
    pub async fn send_empty(&self, request: ApiRequest) -> Result<(), Error> {
        let path = request.path.clone();
        self.execute(request).await?.ensure_success(&path)?;
        Ok(())
    }

    /// Token to replay a 401 with.
    ///
    /// Any failure signs the session out.
    async fn recover(&self, sent: Option<&AccessToken>, path: &str) -> Result<AccessToken, AuthError> {
        // The stored token changed after dispatch: a refresh or a login
        // already produced a newer one.
        if let Some(current) = self.session.access_token() {
            if sent.is_none_or(|sent| *sent != current) {
                tracing::debug!(path, "Replaying with token stored since dispatch");
                return Ok(current);
            }
        }

        let ticket = self.refresh.join();
        if ticket.starts {
            tracing::debug!(path, "Access token rejected, refreshing");
            self.spawn_refresh();
        } else {
            tracing::debug!(path, "Waiting for in-flight token refresh");
        }

        let outcome = ticket
            .outcome
            .await
            .unwrap_or(Err(AuthError::Abandoned));
        if outcome.is_err() {
            self.session.logout();
        }
        outcome
    }

    /// Run the exchange to completion regardless of who is still waiting.
    fn spawn_refresh(&self) {
        let session = Arc::clone(&self.session);
        let guard = SettleGuard {
            coordinator: Arc::clone(&self.refresh),
            settled: false,
        };
        tokio::spawn(async move {
            let outcome = session.refresh().await.map(|pair| pair.access);
            if outcome.is_err() {
                session.logout();
            }
            let released = guard.settle(&outcome);
            tracing::debug!(waiters = released, ok = outcome.is_ok(), "Token refresh settled");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::task::JoinSet;

    use super::*;
    use crate::session::tests::FakeBackend;
    use crate::storage::Storage;
    use crate::types::{RefreshToken, Role, UserId};
    use crate::user::{LoginRequest, User};

    fn pipeline_with(backend: Arc<FakeBackend>, storage: Storage, config: ClientConfig) -> Arc<AuthPipeline<FakeBackend>> {
        let session = Arc::new(SessionManager::new(backend.clone(), storage, &config));
        Arc::new(AuthPipeline::new(backend, session, config))
    }

    fn pipeline(backend: Arc<FakeBackend>, storage: Storage) -> Arc<AuthPipeline<FakeBackend>> {
        pipeline_with(backend, storage, ClientConfig::development())
    }

    /// Signed-in storage whose access token the backend no longer accepts.
    fn expired_session() -> Storage {
        let storage = Storage::in_memory();
        storage.set_access_token(&"T1".into());
        storage.set_refresh_token(&"R1".into());
        storage.set_current_user(&User::new(UserId(1), "a", Role::Reader));
        storage
    }

    async fn wait_for_waiters(pipeline: &AuthPipeline<FakeBackend>, n: usize) {
        while pipeline.pending_waiters() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn login_then_refresh_scenario() {
        let backend = Arc::new(FakeBackend::new());
        let storage = Storage::in_memory();
        let pipeline = pipeline(backend.clone(), storage.clone());

        pipeline
            .session()
            .login(&LoginRequest::new("a", "b"))
            .await
            .unwrap();

        // First request is accepted with T1.
        let first: Value = pipeline.send_json(ApiRequest::get("/articles/")).await.unwrap();
        assert_eq!(first["ok"], true);
        assert_eq!(backend.requests_to("/articles/"), vec![Some("T1".into())]);

        // Backend expires T1.
        *backend.valid_access.lock() = Some("T-rotated-server-side".into());
        let second: Value = pipeline.send_json(ApiRequest::get("/bookmarks/history/")).await.unwrap();

        assert_eq!(second["ok"], true);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(
            backend.requests_to("/bookmarks/history/"),
            vec![Some("T1".into()), Some("T2".into())]
        );
        assert_eq!(storage.access_token(), Some("T2".into()));
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_401s_share_one_refresh() {
        const N: usize = 8;
        let backend = Arc::new(FakeBackend::gated());
        let pipeline = pipeline(backend.clone(), expired_session());

        let mut tasks = JoinSet::new();
        for i in 0..N {
            let pipeline = pipeline.clone();
            tasks.spawn(async move {
                pipeline
                    .send_json::<Value>(ApiRequest::get(format!("/articles/{i}/")))
                    .await
            });
        }

        wait_for_waiters(&pipeline, N).await;
        assert!(pipeline.is_refreshing());
        backend.release_refresh();

        while let Some(joined) = tasks.join_next().await {
            let body = joined.unwrap().unwrap();
            assert_eq!(body["ok"], true);
        }

        assert_eq!(backend.refresh_calls(), 1);
        assert!(!pipeline.is_refreshing());
        assert_eq!(pipeline.pending_waiters(), 0);
        for i in 0..N {
            assert_eq!(
                backend.requests_to(&format!("/articles/{i}/")),
                vec![Some("T1".into()), Some("T2".into())]
            );
        }
    }

    #[tokio::test]
    async fn request_during_refresh_does_not_refresh_again() {
        let backend = Arc::new(FakeBackend::gated());
        let pipeline = pipeline(backend.clone(), expired_session());

        let leader = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/a/")).await }
        });
        while !pipeline.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let follower = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/b/")).await }
        });
        wait_for_waiters(&pipeline, 2).await;

        backend.release_refresh();
        leader.await.unwrap().unwrap();
        follower.await.unwrap().unwrap();

        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn login_and_register_are_exempt() {
        let backend = Arc::new(FakeBackend::new());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage.clone());

        let response = pipeline
            .execute(
                ApiRequest::post("/auth/login/")
                    .with_json(&LoginRequest::new("a", "wrong"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 401);

        let response = pipeline
            .execute(ApiRequest::post("/auth/register/").with_bearer("stale".into()))
            .await
            .unwrap();
        assert_eq!(response.status, 401);

        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.requests_to("/auth/login/"), vec![None]);
        assert_eq!(backend.requests_to("/auth/register/"), vec![None]);
        assert!(pipeline.session().is_authenticated());
        assert_eq!(storage.refresh_token(), Some(RefreshToken::from("R1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_refresh_fails_every_waiter_and_logs_out() {
        const N: usize = 5;
        let backend = Arc::new(FakeBackend::gated());
        *backend.valid_refresh.lock() = Some("revoked".into());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage.clone());

        let mut tasks = JoinSet::new();
        for i in 0..N {
            let pipeline = pipeline.clone();
            tasks.spawn(async move { pipeline.send_empty(ApiRequest::get(format!("/c/{i}/"))).await });
        }
        wait_for_waiters(&pipeline, N).await;
        backend.release_refresh();

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            let err = joined.unwrap().unwrap_err();
            assert!(
                matches!(err, Error::Auth(AuthError::RefreshRejected { status: 401, .. })),
                "unexpected error: {err:?}"
            );
            failures += 1;
        }

        assert_eq!(failures, N);
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!pipeline.session().is_authenticated());
        assert!(storage.access_token().is_none());
        assert!(storage.refresh_token().is_none());
        assert!(storage.current_user().is_none());
    }

    #[tokio::test]
    async fn anonymous_401_logs_out_without_contacting_refresh() {
        let backend = Arc::new(FakeBackend::new());
        let pipeline = pipeline(backend.clone(), Storage::in_memory());

        let err = pipeline
            .send_empty(ApiRequest::get("/bookmarks/folders/"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(AuthError::NoRefreshToken)));
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.requests_to("/bookmarks/folders/"), vec![None]);
    }

    #[tokio::test]
    async fn second_401_after_refresh_is_surfaced() {
        let backend = Arc::new(FakeBackend {
            always_unauthorized: true,
            ..FakeBackend::new()
        });
        let pipeline = pipeline(backend.clone(), expired_session());

        let err = pipeline
            .send_empty(ApiRequest::get("/admin-only/"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unauthorized { .. }));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.requests_to("/admin-only/").len(), 2);
        // Refresh succeeded, so the session is kept.
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn non_401_errors_pass_through() {
        let backend = Arc::new(FakeBackend::new());
        let pipeline = pipeline(backend.clone(), Storage::in_memory());
        pipeline
            .session()
            .login(&LoginRequest::new("a", "b"))
            .await
            .unwrap();

        let response = pipeline.execute(ApiRequest::get("/missing/")).await.unwrap();
        assert_eq!(response.status, 404);

        let err = pipeline.send_empty(ApiRequest::get("/missing/")).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.requests_to("/missing/").len(), 2);
    }

    #[tokio::test]
    async fn refresh_server_error_counts_as_rejection() {
        let backend = Arc::new(FakeBackend::new());
        *backend.next_access.lock() = Vec::new();
        let pipeline = pipeline(backend.clone(), expired_session());

        let err = pipeline.send_empty(ApiRequest::get("/x/")).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Auth(AuthError::RefreshRejected { status: 500, .. })
        ));
        assert!(!pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn stale_token_after_settled_refresh_replays_without_exchange() {
        let backend = Arc::new(FakeBackend::new());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage.clone());

        // Another request already refreshed while this one was in flight.
        storage.set_access_token(&"T2".into());

        let token = pipeline
            .recover(Some(&AccessToken::from("T1")), "/late/")
            .await
            .unwrap();
        assert_eq!(token, AccessToken::from("T2"));
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn stale_token_while_refresh_unsettled_replays_at_once() {
        let backend = Arc::new(FakeBackend::gated());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage.clone());

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/a/")).await }
        });
        while !pipeline.is_refreshing() {
            tokio::task::yield_now().await;
        }

        // The new token is stored but the exchange has not settled yet.
        storage.set_access_token(&"T2".into());
        let token = pipeline
            .recover(Some(&AccessToken::from("T1")), "/late/")
            .await
            .unwrap();
        assert_eq!(token, AccessToken::from("T2"));
        assert_eq!(pipeline.pending_waiters(), 1);

        backend.release_refresh();
        first.await.unwrap().unwrap();
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!pipeline.is_refreshing());
    }

    #[tokio::test]
    async fn tokenless_401_replays_with_token_stored_since() {
        let backend = Arc::new(FakeBackend::new());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage);

        // Sent before login completed, answered after.
        let token = pipeline.recover(None, "/x/").await.unwrap();

        assert_eq!(token, AccessToken::from("T1"));
        assert_eq!(backend.refresh_calls(), 0);
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn exempt_path_spelling_variants_skip_bearer_and_refresh() {
        let backend = Arc::new(FakeBackend::new());
        let pipeline = pipeline(backend.clone(), expired_session());

        let response = pipeline.execute(ApiRequest::post("auth/login/")).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.requests_to("auth/login/"), vec![None]);
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn aborted_starter_does_not_cancel_refresh() {
        let backend = Arc::new(FakeBackend::gated());
        let storage = expired_session();
        let pipeline = pipeline(backend.clone(), storage.clone());

        let starter = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/a/")).await }
        });
        while !pipeline.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/b/")).await }
        });
        wait_for_waiters(&pipeline, 2).await;

        starter.abort();
        assert!(starter.await.unwrap_err().is_cancelled());
        backend.release_refresh();

        follower.await.unwrap().unwrap();
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(storage.access_token(), Some("T2".into()));
        assert!(pipeline.session().is_authenticated());
        assert!(!pipeline.is_refreshing());
        assert_eq!(backend.requests_to("/b/"), vec![Some("T1".into()), Some("T2".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_refresh_times_out_for_all_waiters() {
        let backend = Arc::new(FakeBackend::gated());
        let storage = expired_session();
        let config = ClientConfig::development().with_refresh_timeout(Duration::from_secs(3));
        let pipeline = pipeline_with(backend.clone(), storage.clone(), config);

        let leader = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/a/")).await }
        });
        while !pipeline.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send_empty(ApiRequest::get("/b/")).await }
        });
        wait_for_waiters(&pipeline, 2).await;

        for handle in [leader, follower] {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::Auth(AuthError::TimedOut(_))));
        }
        assert!(!pipeline.session().is_authenticated());
        assert!(storage.access_token().is_none());
    }
}
