//! The session state machine.
//!
//! ```text
//!                 gate: disabled
//!  UNINITIALIZED ───────────────▶ DISABLED   (terminal)
//!       │
//!       │ gate: enabled
//!       ▼
//!   LOGGED_OUT ◀──── logout / 401 ────┐
//!       │                             │
//!       └── login / login_anonymous ─▶ LOGGED_IN
//! ```
//!
//! The state is never stored. It is projected on every read from the gate's
//! resolution and the held credential, so `is_authenticated` and `is_admin`
//! can never go stale.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::{ApiError, LoginError};
use crate::gate::{AuthConfigGate, AuthConfiguration};
use crate::identity::Identity;
use crate::store::{CredentialStore, StoredCredential};
use crate::token::{self, Credential};

/// Path of the token-issuance endpoint.
pub const TOKEN_PATH: &str = "/v2/token";

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The auth policy is not known yet.
    Uninitialized,

    /// The registry does not enforce authentication.
    Disabled,

    /// Authentication is enforced and no valid credential is held.
    LoggedOut,

    /// Authentication is enforced and a valid credential is held.
    LoggedIn,
}

impl SessionState {
    /// Returns a string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Disabled => "disabled",
            Self::LoggedOut => "logged_out",
            Self::LoggedIn => "logged_in",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A credential and the identity derived from it. Always swapped as one unit.
#[derive(Debug)]
struct Held {
    credential: Credential,
    identity: Arc<Identity>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token: Option<String>,
}

/// The authoritative authentication state of the console.
///
/// One `Session` is created per process and shared by reference with the
/// dispatcher and the route guard.
#[derive(Debug)]
pub struct Session {
    config: ClientConfig,
    http: reqwest::Client,
    gate: AuthConfigGate,
    store: Arc<dyn CredentialStore>,
    held: RwLock<Option<Arc<Held>>>,
}

impl Session {
    /// Creates a session for the registry in `config`, restoring any
    /// credential left in `store` by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http = config.build_http_client()?;
        let gate = AuthConfigGate::new(&config, http.clone());
        Ok(Self::with_gate(config, http, gate, store))
    }

    /// Creates a session around an existing gate.
    #[must_use]
    pub fn with_gate(
        config: ClientConfig,
        http: reqwest::Client,
        gate: AuthConfigGate,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let held = restore(store.as_ref());
        Self {
            config,
            http,
            gate,
            store,
            held: RwLock::new(held.map(Arc::new)),
        }
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the HTTP client shared with the dispatcher.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the auth configuration gate.
    #[must_use]
    pub const fn gate(&self) -> &AuthConfigGate {
        &self.gate
    }

    /// Resolves the auth policy (once per process) and returns it.
    pub async fn ensure_config(&self) -> AuthConfiguration {
        self.gate.check().await
    }

    /// Returns the auth policy if it is already known.
    #[must_use]
    pub fn auth_configuration(&self) -> Option<&AuthConfiguration> {
        self.gate.resolved()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.gate.resolved() {
            None => SessionState::Uninitialized,
            Some(c) if !c.enabled => SessionState::Disabled,
            Some(_) if self.valid_held().is_some() => SessionState::LoggedIn,
            Some(_) => SessionState::LoggedOut,
        }
    }

    /// Returns true if the current visitor may see protected content.
    ///
    /// Always true once the registry reports authentication disabled; false
    /// while the policy is still unknown.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Disabled | SessionState::LoggedIn
        )
    }

    /// Returns true if the current identity holds the administrator role.
    ///
    /// Never true when authentication is disabled or unknown.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state() == SessionState::LoggedIn
            && self
                .valid_held()
                .is_some_and(|held| held.identity.has_role(&self.config.admin_role))
    }

    /// Returns the identity of the held credential.
    #[must_use]
    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.valid_held().map(|held| Arc::clone(&held.identity))
    }

    /// Returns the `Authorization` header value for the held credential.
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        self.valid_held()
            .map(|held| format!("Bearer {}", held.credential.token()))
    }

    /// Logs in with a username and password.
    ///
    /// Logging in again while logged in replaces the credential.
    ///
    /// # Errors
    ///
    /// Returns a failure result and leaves the session unchanged if the
    /// registry rejects the credentials, cannot be reached, issues an
    /// unusable token, or authentication is disabled.
    pub async fn login(&self, username: &str, password: &str) -> Result<Arc<Identity>, LoginError> {
        if !self.ensure_config().await.enabled {
            return Err(LoginError::NotEnforced);
        }

        let url = self.config.endpoint(TOKEN_PATH).map_err(|source| LoginError::Unreachable { source })?;
        let request = self
            .http
            .post(url.clone())
            .query(&[
                ("service", self.config.service.as_str()),
                ("scope", self.config.scope.as_str()),
                ("account", username),
            ])
            .basic_auth(username, Some(password));

        let token = match self.request_token(request, url.as_str()).await {
            Err(LoginError::Rejected { status, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                tracing::info!(username, "Login rejected");
                return Err(LoginError::InvalidCredentials);
            }
            other => other?,
        };

        let credential = token::decode(&token)?;
        if credential.is_expired() {
            return Err(LoginError::InvalidResponse {
                message: "issued token is already expired".to_string(),
            });
        }

        let identity = Identity::from_credential(&credential);
        let identity = self.install(credential, identity)?;
        tracing::info!(username = %identity.username, roles = ?identity.roles, "Logged in");
        Ok(identity)
    }

    /// Logs in anonymously.
    ///
    /// # Errors
    ///
    /// Returns a failure result and leaves the session unchanged if the
    /// registry does not issue anonymous tokens or cannot be reached.
    pub async fn login_anonymous(&self) -> Result<Arc<Identity>, LoginError> {
        if !self.ensure_config().await.enabled {
            return Err(LoginError::NotEnforced);
        }

        let url = self.config.endpoint(TOKEN_PATH).map_err(|source| LoginError::Unreachable { source })?;
        let request = self.http.get(url.clone()).query(&[
            ("service", self.config.service.as_str()),
            ("scope", self.config.anonymous_scope.as_str()),
        ]);

        let token = match self.request_token(request, url.as_str()).await {
            Err(LoginError::Rejected { status, .. }) if status < 500 => {
                return Err(LoginError::AnonymousUnsupported);
            }
            Err(LoginError::Unreachable { .. }) => return Err(LoginError::AnonymousUnsupported),
            other => other?,
        };

        let credential = match token::decode(&token) {
            Ok(credential) if credential.is_expired() => {
                return Err(LoginError::InvalidResponse {
                    message: "issued token is already expired".to_string(),
                });
            }
            Ok(credential) => credential,
            Err(e) => {
                tracing::debug!(error = %e, "Anonymous token is opaque");
                token::opaque(&token, crate::identity::ANONYMOUS_USERNAME)
            }
        };

        let identity = self.install(credential, Identity::anonymous())?;
        tracing::info!("Logged in anonymously");
        Ok(identity)
    }

    /// Drops the credential and clears the persisted store.
    pub fn logout(&self) {
        let previous = self.held.write().take();
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear credential store");
        }
        if let Some(held) = previous {
            tracing::info!(username = %held.identity.username, "Logged out");
        }
    }

    /// Persists and then installs a new credential. Nothing changes if the
    /// store rejects it.
    fn install(
        &self,
        credential: Credential,
        identity: Identity,
    ) -> Result<Arc<Identity>, LoginError> {
        self.store.save(&StoredCredential {
            token: credential.token().to_string(),
            user: identity.clone(),
        })?;

        let identity = Arc::new(identity);
        *self.held.write() = Some(Arc::new(Held {
            credential,
            identity: Arc::clone(&identity),
        }));
        Ok(identity)
    }

    async fn request_token(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<String, LoginError> {
        let response = request
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| LoginError::Unreachable {
                source: ApiError::from_reqwest(url, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| LoginError::InvalidResponse {
            message: e.to_string(),
        })?;

        body.access_token
            .or(body.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| LoginError::InvalidResponse {
                message: "response carries neither access_token nor token".to_string(),
            })
    }

    /// Returns the held credential unless it has expired since it was issued.
    fn valid_held(&self) -> Option<Arc<Held>> {
        self.held
            .read()
            .as_ref()
            .filter(|held| !held.credential.is_expired())
            .map(Arc::clone)
    }
}

/// Reads the credential left by a previous run, discarding it (and wiping
/// the store) if it is incomplete, undecodable or expired.
fn restore(store: &dyn CredentialStore) -> Option<Held> {
    let stored = match store.load() {
        Ok(Some(stored)) => stored,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable credential store, discarding");
            discard(store);
            return None;
        }
    };

    let credential = match token::decode(&stored.token) {
        Ok(credential) => credential,
        Err(e) if stored.user.is_anonymous() && !stored.token.is_empty() => {
            tracing::debug!(error = %e, "Stored anonymous token is opaque");
            token::opaque(&stored.token, &stored.user.username)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stored token is invalid, discarding");
            discard(store);
            return None;
        }
    };

    if credential.is_expired() {
        tracing::info!(username = %credential.subject(), "Stored token has expired, discarding");
        discard(store);
        return None;
    }

    let identity = if stored.user.is_anonymous() {
        stored.user
    } else {
        let derived = Identity::from_credential(&credential);
        if derived != stored.user {
            tracing::debug!(username = %derived.username, "Stored identity differs from token claims, using claims");
        }
        derived
    };

    tracing::debug!(username = %identity.username, "Restored credential");
    Some(Held {
        credential,
        identity: Arc::new(identity),
    })
}

fn discard(store: &dyn CredentialStore) {
    if let Err(e) = store.clear() {
        tracing::warn!(error = %e, "Failed to clear credential store");
    }
}
