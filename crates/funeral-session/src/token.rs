//! Bearer token decoding.
//!
//! Tokens issued by the registry are JWTs. The console only reads their
//! claims to drive the UI (who is logged in, which groups they belong to,
//! when the token runs out); the signature is never checked here, the
//! registry verifies it on every request.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::DecodeError;

/// A bearer token together with its decoded claims.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    subject: String,
    groups: Vec<String>,
    expires_at: Option<i64>,
}

impl Credential {
    /// Returns the raw bearer string.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the `sub` claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the `groups` claim.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Returns the `exp` claim in seconds since the epoch.
    #[must_use]
    pub const fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Returns true if the credential is expired at `now` (epoch seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Returns true if the credential is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("subject", &self.subject)
            .field("groups", &self.groups)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(default)]
    groups: serde_json::Value,
    exp: Option<i64>,
}

/// Decodes a bearer token without verifying its signature.
///
/// # Errors
///
/// Returns an error if the token is not a three-segment JWT, its claims
/// segment is not base64url-encoded JSON, or it carries no `sub`.
///
/// # Examples
///
/// ```
/// use funeral_session::decode;
///
/// // {"sub":"alice","groups":["ADMIN"],"exp":4102444800}
/// let token = "e30.eyJzdWIiOiJhbGljZSIsImdyb3VwcyI6WyJBRE1JTiJdLCJleHAiOjQxMDI0NDQ4MDB9.c2ln";
/// let credential = decode(token).unwrap();
/// assert_eq!(credential.subject(), "alice");
/// assert_eq!(credential.groups(), ["ADMIN"]);
/// assert_eq!(credential.expires_at(), Some(4_102_444_800));
/// ```
pub fn decode(token: &str) -> Result<Credential, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Malformed {
            segments: segments.len(),
        });
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|source| DecodeError::Encoding { source })?;
    let claims: Claims =
        serde_json::from_slice(&payload).map_err(|source| DecodeError::Payload { source })?;

    let subject = claims.sub.ok_or(DecodeError::MissingSubject)?;

    Ok(Credential {
        token: token.to_string(),
        subject,
        groups: string_sequence(&claims.groups),
        expires_at: claims.exp,
    })
}

/// Wraps an opaque (non-JWT) token issued for anonymous access.
pub(crate) fn opaque(token: &str, subject: &str) -> Credential {
    Credential {
        token: token.to_string(),
        subject: subject.to_string(),
        groups: Vec::new(),
        expires_at: None,
    }
}

/// Returns the strings of a JSON array, or nothing if it is anything else.
fn string_sequence(value: &serde_json::Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| item.as_str().map(String::from))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}
