use crate::api::Transport;
use crate::config::{ClientConfig, ExecutionContext};
use crate::session::SessionManager;

/// Access rule attached to a client-side route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Signed-in users only.
    Authenticated,
    /// Admin role, staff or superuser.
    Admin,
    /// Editor or admin role, or superuser.
    Editor,
    /// Author, editor or admin role, or superuser.
    Author,
    /// Signed-out users only (login and registration pages).
    Guest,
}

/// Where a denied navigation is sent instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Originally requested path, for returning after sign-in.
    pub return_to: Option<String>,
}

impl Redirect {
    /// Target as a URL path, with the return target as `returnUrl`.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.return_to {
            Some(path) => format!("{}?returnUrl={}", self.to, urlencoding::encode(path)),
            None => self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationState {
    Pending,
    Allowed,
    Redirected(Redirect),
}

/// One navigation attempt through a route's guards.
///
/// Guards only read session state; they never touch the network.
#[derive(Debug, Clone)]
pub struct NavigationAttempt {
    path: String,
    state: NavigationState,
}

impl NavigationAttempt {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: NavigationState::Pending,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    /// Evaluate `guards` in order; the first denial wins.
    ///
    /// Server-side rendering is always allowed: authorization here is a
    /// client-side gate only.
    pub fn resolve<T: Transport>(
        &mut self,
        guards: &[Guard],
        session: &SessionManager<T>,
        config: &ClientConfig,
    ) -> &NavigationState {
        if self.state != NavigationState::Pending {
            return &self.state;
        }

        self.state = if config.context() == ExecutionContext::Server {
            NavigationState::Allowed
        } else {
            guards
                .iter()
                .find_map(|guard| guard.check(session, config, &self.path))
                .map_or(NavigationState::Allowed, NavigationState::Redirected)
        };

        if let NavigationState::Redirected(redirect) = &self.state {
            tracing::debug!(path = %self.path, to = %redirect.to, "Navigation denied");
        }
        &self.state
    }
}

impl Guard {
    /// `None` when the guard passes, otherwise where to go instead.
    fn check<T: Transport>(
        self,
        session: &SessionManager<T>,
        config: &ClientConfig,
        path: &str,
    ) -> Option<Redirect> {
        let to_login = || Redirect {
            to: config.login_route().to_owned(),
            return_to: Some(path.to_owned()),
        };
        let to_home = || Redirect {
            to: config.home_route().to_owned(),
            return_to: None,
        };

        match self {
            Self::Authenticated => (!session.is_authenticated()).then(to_login),
            Self::Guest => session.has_token().then(to_home),
            Self::Admin | Self::Editor | Self::Author => {
                if !session.has_token() {
                    return Some(to_login());
                }
                let permitted = match self {
                    Self::Admin => session.has_admin_access(),
                    Self::Editor => session.is_editor(),
                    _ => session.is_author(),
                };
                (!permitted).then(to_home)
            }
        }
    }
}
