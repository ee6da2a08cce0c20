//! Error types for the session core.
//!
//! Each concern gets its own enum so call sites can match on exactly the
//! failures they are expected to handle:
//!
//! - [`DecodeError`] never reaches the user; a malformed credential is discarded.
//! - [`ApiError`] is what every dispatched API call returns.
//! - [`LoginError`] is the failure result of `login` / `login_anonymous`.
//! - [`StoreError`] covers the persisted credential store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while decoding a bearer token's claims.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The token is not made of three dot-separated segments.
    #[error("Malformed token: expected 3 segments, found {segments}")]
    Malformed {
        /// Number of segments found.
        segments: usize,
    },

    /// The claims segment is not valid base64url.
    #[error("Invalid claims encoding: {source}")]
    Encoding {
        /// Underlying error.
        #[source]
        source: base64::DecodeError,
    },

    /// The claims segment is not a JSON object.
    #[error("Invalid claims payload: {source}")]
    Payload {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The claims carry no `sub`.
    #[error("Token has no subject claim")]
    MissingSubject,
}

/// Errors raised by the persisted credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O error.
    #[error("Credential store I/O error at {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stored document is not valid JSON.
    #[error("Credential store is corrupt: {source}")]
    Json {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json { source: err }
    }
}

/// Errors returned by the authorized request dispatcher.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The registry rejected the credential. The session has already been
    /// logged out when this is returned.
    #[error("Authentication required")]
    AuthRequired,

    /// Any other non-success response, passed through verbatim.
    #[error("HTTP error from registry: {status} - {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// No response was received.
    #[error("Failed to reach registry at {url}: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete in time.
    #[error("Request to {url} timed out")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// A success response could not be decoded as declared.
    #[error("Invalid response from registry: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// The request URL could not be built.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// The credential cannot be carried in an HTTP header.
    #[error("Credential contains characters not allowed in a header")]
    InvalidHeader,
}

impl ApiError {
    /// Returns true if the caller should defer to the login flow.
    #[must_use]
    pub const fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }

    /// Returns true if no response was received at all.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns the HTTP status, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AuthRequired => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Failure results of `login` and `login_anonymous`.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The registry rejected the username/password pair.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The registry does not hand out anonymous tokens.
    #[error("Anonymous access is not supported by this registry")]
    AnonymousUnsupported,

    /// Authentication is disabled; there is nothing to log in to.
    #[error("Authentication is not enabled on this registry")]
    NotEnforced,

    /// The token endpoint could not be reached.
    #[error("Registry unreachable: {source}")]
    Unreachable {
        /// Underlying error.
        #[source]
        source: ApiError,
    },

    /// The token endpoint answered with an unexpected status.
    #[error("Token request rejected: {status} - {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The issued token cannot be decoded.
    #[error("Registry issued an unusable token: {0}")]
    InvalidToken(#[from] DecodeError),

    /// The token response is malformed.
    #[error("Invalid token response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// The credential could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_http() {
        let err = ApiError::Http {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error from registry: 500 - boom");
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_auth_required());
    }

    #[test]
    fn test_auth_required_reports_401() {
        let err = ApiError::AuthRequired;
        assert!(err.is_auth_required());
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_timeout_is_transport() {
        let err = ApiError::Timeout {
            url: "http://registry/v2/".to_string(),
        };
        assert!(err.is_transport());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_login_error_display() {
        assert_eq!(
            LoginError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
        let err = LoginError::from(DecodeError::MissingSubject);
        assert!(err.to_string().contains("no subject"));
    }
}
