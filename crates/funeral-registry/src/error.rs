//! Error types for registry operations.

use funeral_session::ApiError;
use thiserror::Error;

use crate::oci::ErrorResponse;

/// Errors that can occur during registry and administration operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The call failed before or while talking to the registry.
    #[error(transparent)]
    Api(ApiError),

    /// The registry refused the call and said why.
    #[error("Registry rejected the request ({status} {code}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Registry error code, e.g. `MANIFEST_UNKNOWN`.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The requested object does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// What was looked up.
        resource: String,
    },

    /// Downloaded content does not match its digest.
    #[error("Checksum mismatch for {resource}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// What was downloaded.
        resource: String,
        /// Expected digest.
        expected: String,
        /// Actual digest.
        actual: String,
    },

    /// A manifest could not be parsed.
    #[error("Invalid manifest for {resource}: {message}")]
    InvalidManifest {
        /// Manifest reference.
        resource: String,
        /// Error message.
        message: String,
    },

    /// A repository name, reference or digest is malformed.
    #[error("Invalid reference: {reference}")]
    InvalidReference {
        /// Reference string.
        reference: String,
    },

    /// A request was rejected locally before being sent.
    #[error("Invalid request: {message}")]
    Validation {
        /// Error message.
        message: String,
    },
}

impl RegistryError {
    /// Returns true if the session was logged out and the caller should
    /// send the user back to the login flow.
    #[must_use]
    pub const fn is_auth_required(&self) -> bool {
        matches!(self, Self::Api(ApiError::AuthRequired))
    }

    /// Returns the HTTP status of the failed call, if one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.status(),
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Maps a 404 to [`RegistryError::NotFound`] for `resource`.
    pub(crate) fn not_found_as(err: ApiError, resource: impl FnOnce() -> String) -> Self {
        match err {
            ApiError::Http { status: 404, .. } => Self::NotFound {
                resource: resource(),
            },
            other => other.into(),
        }
    }
}

impl From<ApiError> for RegistryError {
    fn from(err: ApiError) -> Self {
        if let ApiError::Http { status, ref body } = err {
            if let Some(first) = ErrorResponse::parse(body).and_then(|r| r.errors.into_iter().next())
            {
                return Self::Rejected {
                    status,
                    code: first.code,
                    message: first.message,
                };
            }
        }
        Self::Api(err)
    }
}
