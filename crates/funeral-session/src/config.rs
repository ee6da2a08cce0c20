//! Configuration types for the registry console.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Role name that marks an identity as an administrator.
pub const DEFAULT_ADMIN_ROLE: &str = "ADMIN";

/// Configuration shared by the session, the gate and the dispatcher.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Registry URL (e.g., "<https://registry.example.com>").
    pub url: String,

    /// Timeout applied to every dispatched API call.
    pub timeout: Duration,

    /// Upper bound on the auth-policy fetch.
    pub config_timeout: Duration,

    /// `service` parameter sent to the token endpoint.
    pub service: String,

    /// Scope requested by a username/password login.
    pub scope: String,

    /// Scope requested by an anonymous login.
    pub anonymous_scope: String,

    /// Role granting administrator privileges.
    pub admin_role: String,

    /// TLS configuration.
    pub tls: Option<TlsConfig>,

    /// User agent string.
    pub user_agent: String,

    /// Location of the persisted credential file.
    pub credentials_path: PathBuf,
}

impl ClientConfig {
    /// Creates a new configuration for the given registry URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use funeral_session::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://registry.example.com/");
    /// assert_eq!(config.url, "https://registry.example.com");
    /// assert_eq!(config.admin_role, "ADMIN");
    /// ```
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            config_timeout: Duration::from_secs(5),
            service: "funeral-registry".to_string(),
            scope: "pull,push".to_string(),
            anonymous_scope: "pull".to_string(),
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            tls: None,
            user_agent: format!("funeral/{}", env!("CARGO_PKG_VERSION")),
            credentials_path: default_credentials_path(),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the upper bound on the auth-policy fetch.
    #[must_use]
    pub const fn with_config_timeout(mut self, timeout: Duration) -> Self {
        self.config_timeout = timeout;
        self
    }

    /// Sets the token service name.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Sets the scope requested on login.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the administrator role name.
    #[must_use]
    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = role.into();
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the credential file location.
    #[must_use]
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    /// Resolves an API path against the registry URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting URL is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use funeral_session::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://registry.example.com");
    /// let url = config.endpoint("/v2/_catalog").unwrap();
    /// assert_eq!(url.as_str(), "https://registry.example.com/v2/_catalog");
    /// ```
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!("{}/{}", self.url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|_| ApiError::InvalidUrl { url: joined })
    }

    /// Builds the HTTP client with proper configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material cannot be loaded or the client
    /// cannot be built.
    pub fn build_http_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);

        if let Some(ref tls) = self.tls {
            if tls.insecure_skip_verify {
                tracing::warn!("TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| ApiError::InvalidResponse {
                    message: format!("Cannot read CA certificate {}: {e}", ca_cert.display()),
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    ApiError::InvalidResponse {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(|e| ApiError::Transport {
            url: self.url.clone(),
            source: e,
        })
    }
}

/// Default credential file location, `<config dir>/funeral/credentials.json`.
#[must_use]
pub fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("funeral")
        .join("credentials.json")
}

/// TLS configuration for registry connections.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to an additional CA certificate file.
    pub ca_cert: Option<PathBuf>,

    /// Whether to skip certificate verification (NOT recommended for production).
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    ///
    /// # Warning
    ///
    /// This should only be used for testing. Never use in production.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ClientConfig::new("https://example.com");
        assert_eq!(config.url, "https://example.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.config_timeout, Duration::from_secs(5));
        assert_eq!(config.service, "funeral-registry");
        assert_eq!(config.scope, "pull,push");
        assert_eq!(config.anonymous_scope, "pull");
        assert!(config.credentials_path.ends_with("funeral/credentials.json"));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("https://example.com")
            .with_timeout(Duration::from_secs(5))
            .with_config_timeout(Duration::from_millis(250))
            .with_admin_role("registry-admins")
            .with_credentials_path("/tmp/creds.json");

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.config_timeout, Duration::from_millis(250));
        assert_eq!(config.admin_role, "registry-admins");
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/creds.json"));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let config = ClientConfig::new("http://localhost:8911/");
        let url = config.endpoint("v2/library/nginx/tags/list").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8911/v2/library/nginx/tags/list");
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        let config = ClientConfig::new("not a url");
        assert!(matches!(
            config.endpoint("/v2/"),
            Err(ApiError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_tls_config() {
        let tls = TlsConfig::new().with_ca_cert("/path/to/ca.crt");
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/path/to/ca.crt")));
        assert!(!tls.insecure_skip_verify);
        assert!(tls.insecure().insecure_skip_verify);
    }
}
