//! Navigation guard.
//!
//! Every navigation is checked against the session before it happens. The
//! guard always waits for the auth policy to resolve first, so it never
//! decides on a guess.

use std::sync::Arc;

use crate::session::{Session, SessionState};

/// Path of the login view.
pub const LOGIN_PATH: &str = "/login";

/// Path of the home view.
pub const HOME_PATH: &str = "/";

/// Notice shown when a non-administrator reaches an admin view.
pub const ADMIN_DENIED_NOTICE: &str = "Access denied: administrator privileges required";

/// A navigable destination and its access requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Route name.
    pub name: &'static str,

    /// Path pattern (`:param` matches one segment, `:param*` the rest).
    pub pattern: &'static str,

    /// Whether the destination needs an authenticated session.
    pub requires_auth: bool,

    /// Whether the destination needs an administrator.
    pub requires_admin: bool,
}

impl Route {
    /// A destination open to everyone.
    #[must_use]
    pub const fn public(name: &'static str, pattern: &'static str) -> Self {
        Self {
            name,
            pattern,
            requires_auth: false,
            requires_admin: false,
        }
    }

    /// A destination that needs an authenticated session.
    #[must_use]
    pub const fn protected(name: &'static str, pattern: &'static str) -> Self {
        Self {
            name,
            pattern,
            requires_auth: true,
            requires_admin: false,
        }
    }

    /// A destination that needs an administrator.
    #[must_use]
    pub const fn admin(name: &'static str, pattern: &'static str) -> Self {
        Self {
            name,
            pattern,
            requires_auth: true,
            requires_admin: true,
        }
    }

    /// Returns true if `path` matches this route's pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut pattern = segments(self.pattern);
        let mut path = segments(path);

        loop {
            match (pattern.next(), path.next()) {
                (None, None) => return true,
                (Some(p), Some(_)) if p.starts_with(':') && p.ends_with('*') => return true,
                (Some(p), Some(s)) if p.starts_with(':') || p == s => {}
                _ => return false,
            }
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
}

/// The console's navigable destinations.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(vec![
            Route::protected("home", HOME_PATH),
            Route::protected("repository", "/repository/:name*"),
            Route::protected("upload", "/upload"),
            Route::public("login", LOGIN_PATH),
            Route::admin("users", "/admin/users"),
            Route::admin("permissions", "/admin/permissions"),
        ])
    }
}

impl RouteTable {
    /// Creates a table from a list of routes; the first match wins.
    #[must_use]
    pub const fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Returns the route matching `path`.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }
}

/// Outcome of a guarded navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Proceed to the destination.
    Allow,

    /// Go to the login view, then resume at `redirect`.
    RedirectToLogin {
        /// The path originally requested.
        redirect: String,
    },

    /// Go to the home view, optionally telling the user why.
    RedirectHome {
        /// Notice to display.
        notice: Option<String>,
    },
}

impl Navigation {
    /// Returns the path to navigate to instead, if any.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin { redirect } => {
                Some(format!("{LOGIN_PATH}?redirect={}", escape_query_value(redirect)))
            }
            Self::RedirectHome { .. } => Some(HOME_PATH.to_string()),
        }
    }

    /// Returns true if navigation proceeds.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Escapes the characters that would end or corrupt a query value; path
/// separators stay readable.
fn escape_query_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '&' => escaped.push_str("%26"),
            '#' => escaped.push_str("%23"),
            '+' => escaped.push_str("%2B"),
            ' ' => escaped.push_str("%20"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Consults the session before every navigation.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: Arc<Session>,
    routes: RouteTable,
}

impl RouteGuard {
    /// Creates a guard over the default route table.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self::with_routes(session, RouteTable::default())
    }

    /// Creates a guard over a custom route table.
    #[must_use]
    pub const fn with_routes(session: Arc<Session>, routes: RouteTable) -> Self {
        Self { session, routes }
    }

    /// Returns the route table.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decides whether navigation to `path` may proceed.
    pub async fn before_each(&self, path: &str) -> Navigation {
        self.session.ensure_config().await;
        let decision = self.decide(path);
        tracing::debug!(path, state = %self.session.state(), ?decision, "Guarded navigation");
        decision
    }

    /// Decides against the current state without waiting for the policy.
    /// While the policy is unknown every protected destination is refused
    /// and the login view stays open, so a redirect always has somewhere to land.
    #[must_use]
    pub fn decide(&self, path: &str) -> Navigation {
        let state = self.session.state();

        if self.routes.find(path).is_some_and(|r| r.pattern == LOGIN_PATH) {
            return if matches!(state, SessionState::LoggedOut | SessionState::Uninitialized) {
                Navigation::Allow
            } else {
                Navigation::RedirectHome { notice: None }
            };
        }

        let Some(route) = self.routes.find(path) else {
            return Navigation::Allow;
        };

        if route.requires_auth && !self.session.is_authenticated() {
            return Navigation::RedirectToLogin {
                redirect: path.to_string(),
            };
        }

        if route.requires_admin && !self.session.is_admin() {
            return Navigation::RedirectHome {
                notice: Some(ADMIN_DENIED_NOTICE.to_string()),
            };
        }

        Navigation::Allow
    }

    /// Returns where to go after a successful login. Only local absolute
    /// paths are honored.
    #[must_use]
    pub fn resume_target(redirect: Option<&str>) -> String {
        match redirect {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && !path.contains('\\')
                    && segments(path).next() != Some("login") =>
            {
                path.to_string()
            }
            _ => HOME_PATH.to_string(),
        }
    }
}
