use std::time::Duration;

use url::Url;

use crate::endpoints;
use crate::error::Error;

/// Where the client is running.
///
/// Server-side rendering has no persistent medium and no interactive
/// user, so storage is disabled and guards let everything through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    #[default]
    Interactive,
    Server,
}

impl ExecutionContext {
    #[must_use]
    pub fn is_interactive(self) -> bool {
        self == Self::Interactive
    }
}

/// Client configuration.
///
/// The API base URL is the only required field and is a constructor
/// parameter. Everything else has a default and a `with_*` override.
///
/// ```rust,ignore
/// use haber_client::ClientConfig;
///
/// let config = ClientConfig::new("https://api.example.com/api/v1".parse()?)
///     .with_refresh_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_url: Url,
    pub(crate) media_url: Url,
    pub(crate) static_url: Url,
    pub(crate) refresh_timeout: Duration,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) login_path: String,
    pub(crate) register_path: String,
    pub(crate) refresh_path: String,
    pub(crate) login_route: String,
    pub(crate) home_route: String,
    pub(crate) context: ExecutionContext,
}

impl ClientConfig {
    pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a configuration for the given API base URL.
    ///
    /// Media and static URLs default to `/media` and `/static` on the
    /// same origin.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        let media_url = api_url.join("/media").unwrap_or_else(|_| api_url.clone());
        let static_url = api_url.join("/static").unwrap_or_else(|_| api_url.clone());
        Self {
            api_url,
            media_url,
            static_url,
            refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
            request_timeout: None,
            login_path: endpoints::auth::LOGIN.into(),
            register_path: endpoints::auth::REGISTER.into(),
            refresh_path: endpoints::auth::TOKEN_REFRESH.into(),
            login_route: "/auth/login".into(),
            home_route: "/".into(),
            context: ExecutionContext::Interactive,
        }
    }

    /// Local development backend (`http://localhost:8000/api/v1`).
    #[must_use]
    pub fn development() -> Self {
        Self::new(
            "http://localhost:8000/api/v1"
                .parse()
                .expect("valid default URL"),
        )
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `HABER_API_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `HABER_MEDIA_URL`: Override media base URL
    /// - `HABER_STATIC_URL`: Override static base URL
    /// - `HABER_REFRESH_TIMEOUT_SECS`: Bound on the token refresh exchange
    /// - `HABER_REQUEST_TIMEOUT_SECS`: Per-request transport timeout
    /// - `HABER_SSR`: Set to `"1"` or `"true"` for server-side rendering
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API URL is missing or any value is malformed.
    pub fn from_env() -> Result<Self, Error> {
        let api_url = std::env::var("HABER_API_URL")
            .map_err(|_| Error::Config("HABER_API_URL is required".into()))?;
        let mut config = Self::new(parse_url("HABER_API_URL", &api_url)?);

        if let Ok(s) = std::env::var("HABER_MEDIA_URL") {
            config = config.with_media_url(parse_url("HABER_MEDIA_URL", &s)?);
        }
        if let Ok(s) = std::env::var("HABER_STATIC_URL") {
            config = config.with_static_url(parse_url("HABER_STATIC_URL", &s)?);
        }
        if let Ok(s) = std::env::var("HABER_REFRESH_TIMEOUT_SECS") {
            config = config.with_refresh_timeout(parse_secs("HABER_REFRESH_TIMEOUT_SECS", &s)?);
        }
        if let Ok(s) = std::env::var("HABER_REQUEST_TIMEOUT_SECS") {
            config = config.with_request_timeout(parse_secs("HABER_REQUEST_TIMEOUT_SECS", &s)?);
        }

        let ssr = matches!(std::env::var("HABER_SSR").as_deref(), Ok("1") | Ok("true"));
        if ssr {
            config = config.with_context(ExecutionContext::Server);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_media_url(mut self, url: Url) -> Self {
        self.media_url = url;
        self
    }

    #[must_use]
    pub fn with_static_url(mut self, url: Url) -> Self {
        self.static_url = url;
        self
    }

    /// Bound on a single token refresh exchange. Expiry forces logout.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Client-side route that guards redirect unauthenticated users to.
    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn with_home_route(mut self, route: impl Into<String>) -> Self {
        self.home_route = route.into();
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    #[must_use]
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    #[must_use]
    pub fn home_route(&self) -> &str {
        &self.home_route
    }

    /// Requests to these paths never carry a bearer and never trigger a refresh.
    ///
    /// Leading and trailing slashes and any query string are ignored.
    pub(crate) fn is_auth_exempt(&self, path: &str) -> bool {
        let key = endpoint_key(path);
        key == endpoint_key(&self.login_path) || key == endpoint_key(&self.register_path)
    }

    /// Full URL for an uploaded media file.
    #[must_use]
    pub fn media_url(&self, path: &str) -> String {
        resolve_asset(&self.media_url, path)
    }

    /// Full URL for a static asset.
    #[must_use]
    pub fn static_url(&self, path: &str) -> String {
        resolve_asset(&self.static_url, path)
    }
}

fn resolve_asset(base: &Url, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if path.starts_with("http") {
        return path.to_owned();
    }
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_url(var: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}

fn parse_secs(var: &str, value: &str) -> Result<Duration, Error> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}

fn endpoint_key(path: &str) -> &str {
    path.split_once('?')
        .map_or(path, |(path, _)| path)
        .trim_matches('/')
}
