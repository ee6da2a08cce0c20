//! The logged-in user as the console sees it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::token::Credential;

/// Username given to anonymous sessions.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Who the session belongs to.
///
/// Identities are never patched: login and logout replace them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Username (the token subject).
    pub username: String,

    /// Group claims of the token.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Identity {
    /// Creates an identity.
    #[must_use]
    pub fn new(username: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// The identity used for anonymous access: no roles at all.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            username: ANONYMOUS_USERNAME.to_string(),
            roles: BTreeSet::new(),
        }
    }

    /// Derives the identity carried by a credential's claims.
    #[must_use]
    pub fn from_credential(credential: &Credential) -> Self {
        Self::new(credential.subject(), credential.groups().iter().cloned())
    }

    /// Returns true for the anonymous identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username == ANONYMOUS_USERNAME && self.roles.is_empty()
    }

    /// Returns true if the identity carries `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
