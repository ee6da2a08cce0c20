//! One-time discovery of whether the registry enforces authentication.
//!
//! The policy is an immutable server setting, so it is fetched at most once
//! per process. Every caller of [`AuthConfigGate::check`] that arrives while
//! the fetch is in flight waits on the same cell and sees the same value.
//! Any failure resolves to "enabled": a login prompt is always safer than
//! letting an unknown deployment through unauthenticated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::ClientConfig;
use crate::error::ApiError;

/// Path of the auth-policy endpoint.
pub const AUTH_CONFIG_PATH: &str = "/funeral_addition/config/auth";

/// Server-side authentication policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfiguration {
    /// Whether requests must carry a credential.
    pub enabled: bool,

    /// Whether pulls are allowed without a credential.
    #[serde(default)]
    pub allow_anonymous_pull: bool,

    /// Token realm advertised by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl AuthConfiguration {
    /// The fail-secure policy used when the real one cannot be read.
    #[must_use]
    pub const fn fail_secure() -> Self {
        Self {
            enabled: true,
            allow_anonymous_pull: false,
            realm: None,
        }
    }
}

/// Memoized, single-flight reader of the auth policy.
#[derive(Debug)]
pub struct AuthConfigGate {
    http: reqwest::Client,
    endpoint: Result<url::Url, String>,
    timeout: Duration,
    resolved: OnceCell<AuthConfiguration>,
    fetches: AtomicUsize,
}

impl AuthConfigGate {
    /// Creates a gate reading the policy of the registry in `config`.
    #[must_use]
    pub fn new(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: config.endpoint(AUTH_CONFIG_PATH).map_err(|e| e.to_string()),
            timeout: config.config_timeout,
            resolved: OnceCell::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Creates a gate that is already resolved, without any network access.
    #[must_use]
    pub fn resolved_with(configuration: AuthConfiguration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: Err("pre-resolved".to_string()),
            timeout: Duration::ZERO,
            resolved: OnceCell::new_with(Some(configuration)),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Returns the auth policy, fetching it on first use.
    ///
    /// Concurrent callers share a single fetch. Never fails: a fetch error
    /// resolves to [`AuthConfiguration::fail_secure`].
    pub async fn check(&self) -> AuthConfiguration {
        self.resolved
            .get_or_init(|| self.fetch_or_fail_secure())
            .await
            .clone()
    }

    /// Returns true once the policy is known.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// Returns the policy if it is already known.
    #[must_use]
    pub fn resolved(&self) -> Option<&AuthConfiguration> {
        self.resolved.get()
    }

    /// Number of policy fetches issued so far (zero or one).
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn fetch_or_fail_secure(&self) -> AuthConfiguration {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.fetch().await {
            Ok(configuration) => {
                tracing::debug!(enabled = configuration.enabled, "Resolved auth configuration");
                configuration
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auth configuration unavailable, assuming authentication is enabled");
                AuthConfiguration::fail_secure()
            }
        }
    }

    async fn fetch(&self) -> Result<AuthConfiguration, ApiError> {
        let url = self
            .endpoint
            .clone()
            .map_err(|url| ApiError::InvalidUrl { url })?;

        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse {
            message: format!("Malformed auth configuration: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn gate_for(server: &MockServer) -> AuthConfigGate {
        let config = ClientConfig::new(server.base_url())
            .with_config_timeout(Duration::from_millis(500));
        AuthConfigGate::new(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_check_reads_policy() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path(AUTH_CONFIG_PATH);
            then.status(200).json_body(json!({
                "enabled": false,
                "allowAnonymousPull": true,
                "realm": "http://localhost:8911/v2/token"
            }));
        });

        let gate = gate_for(&server);
        assert!(!gate.is_resolved());

        let configuration = gate.check().await;
        assert!(!configuration.enabled);
        assert!(configuration.allow_anonymous_pull);
        assert_eq!(
            configuration.realm.as_deref(),
            Some("http://localhost:8911/v2/token")
        );
        assert!(gate.is_resolved());
        assert_eq!(gate.resolved(), Some(&configuration));
        mock.assert();
    }

    #[tokio::test]
    async fn test_check_is_memoized() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path(AUTH_CONFIG_PATH);
            then.status(200).json_body(json!({"enabled": true}));
        });

        let gate = gate_for(&server);
        for _ in 0..3 {
            assert!(gate.check().await.enabled);
        }
        assert_eq!(gate.fetch_count(), 1);
        mock.assert();
    }

    #[tokio::test]
    async fn test_server_error_fails_secure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(AUTH_CONFIG_PATH);
            then.status(500).body("boom");
        });

        let gate = gate_for(&server);
        assert_eq!(gate.check().await, AuthConfiguration::fail_secure());
    }

    #[tokio::test]
    async fn test_malformed_response_fails_secure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(AUTH_CONFIG_PATH);
            then.status(200).body("<html>not json</html>");
        });

        let gate = gate_for(&server);
        assert!(gate.check().await.enabled);
    }

    #[tokio::test]
    async fn test_unreachable_fails_secure() {
        let config = ClientConfig::new("http://127.0.0.1:1");
        let gate = AuthConfigGate::new(&config, reqwest::Client::new());
        assert!(gate.check().await.enabled);
        assert_eq!(gate.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_secure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(AUTH_CONFIG_PATH);
            then.status(200)
                .json_body(json!({"enabled": false}))
                .delay(Duration::from_secs(3));
        });

        let config = ClientConfig::new(server.base_url())
            .with_config_timeout(Duration::from_millis(100));
        let gate = AuthConfigGate::new(&config, reqwest::Client::new());
        assert!(gate.check().await.enabled);
    }

    #[tokio::test]
    async fn test_pre_resolved_gate_never_fetches() {
        let gate = AuthConfigGate::resolved_with(AuthConfiguration {
            enabled: false,
            allow_anonymous_pull: false,
            realm: None,
        });
        assert!(gate.is_resolved());
        assert!(!gate.check().await.enabled);
        assert_eq!(gate.fetch_count(), 0);
    }
}
