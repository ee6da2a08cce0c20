//! User and permission administration.
//!
//! These endpoints answer `403` to anyone without the administrator role;
//! callers are expected to have passed the admin route guard first.

use std::fmt;

use chrono::NaiveDateTime;
use funeral_session::Dispatcher;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Root of the administration API.
pub const ADMIN_PATH: &str = "/funeral_addition/admin";

/// Shortest password the registry accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A registry account as reported by the administration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Login name.
    pub username: String,

    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,

    /// Whether the account may log in.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Granted roles.
    #[serde(default)]
    pub roles: Option<Vec<String>>,

    /// Repositories the account is restricted to.
    #[serde(default)]
    pub allowed_repositories: Option<Vec<String>>,

    /// Creation time.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,

    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

impl User {
    /// Returns true if the account holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.as_ref().is_some_and(|r| r.iter().any(|x| x == role))
    }
}

/// Fields sent when creating or updating an account. Unset fields are left
/// unchanged on update.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    /// Login name (required on create).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// New password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Contact address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the account may log in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Granted roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Repositories the account is restricted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_repositories: Option<Vec<String>>,
}

impl fmt::Debug for UserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRequest")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("enabled", &self.enabled)
            .field("roles", &self.roles)
            .field("allowed_repositories", &self.allowed_repositories)
            .finish()
    }
}

impl UserRequest {
    /// Starts a request for a new account.
    #[must_use]
    pub fn create(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Starts an update that changes nothing yet.
    #[must_use]
    pub fn update() -> Self {
        Self::default()
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Enables or disables the account.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Replaces the roles.
    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the allowed repositories.
    #[must_use]
    pub fn with_allowed_repositories(
        mut self,
        repositories: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_repositories = Some(repositories.into_iter().map(Into::into).collect());
        self
    }

    /// Checks the request the way the registry does for a new account.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] if the username is blank or the
    /// password is missing or too short.
    pub fn validate_create(&self) -> Result<(), RegistryError> {
        if self.username.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(validation("Username is required"));
        }
        match self.password.as_deref() {
            Some(p) if p.chars().count() >= MIN_PASSWORD_LEN => Ok(()),
            _ => Err(password_too_short()),
        }
    }

    /// Checks the request the way the registry does for an update. An empty
    /// password means "keep the current one".
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] if a new password is too short.
    pub fn validate_update(&self) -> Result<(), RegistryError> {
        match self.password.as_deref() {
            Some(p) if !p.is_empty() && p.chars().count() < MIN_PASSWORD_LEN => {
                Err(password_too_short())
            }
            _ => Ok(()),
        }
    }
}

fn validation(message: &str) -> RegistryError {
    RegistryError::Validation {
        message: message.to_string(),
    }
}

fn password_too_short() -> RegistryError {
    validation("Password must be at least 6 characters")
}

/// Pull/push rights of one account on one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPermission {
    /// Account name.
    pub username: String,

    /// Repository name.
    pub repository_name: String,

    /// Whether the account may pull.
    #[serde(default)]
    pub can_pull: bool,

    /// Whether the account may push.
    #[serde(default)]
    pub can_push: bool,

    /// Creation time.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,

    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

/// Rights to grant with [`AdminClient::set_permission`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    /// Allow pulls.
    pub can_pull: bool,

    /// Allow pushes.
    pub can_push: bool,
}

impl PermissionGrant {
    /// Pull-only access.
    #[must_use]
    pub const fn pull() -> Self {
        Self {
            can_pull: true,
            can_push: false,
        }
    }

    /// Pull and push access.
    #[must_use]
    pub const fn pull_push() -> Self {
        Self {
            can_pull: true,
            can_push: true,
        }
    }
}

/// Client for the administration endpoints.
#[derive(Debug, Clone)]
pub struct AdminClient {
    dispatcher: Dispatcher,
}

impl AdminClient {
    /// Creates a client over an authorized dispatcher.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Lists all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not an administrator or the call fails.
    pub async fn list_users(&self) -> Result<Vec<User>, RegistryError> {
        Ok(self.dispatcher.get_json(&format!("{ADMIN_PATH}/users")).await?)
    }

    /// Fetches one account.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown account.
    pub async fn get_user(&self, username: &str) -> Result<User, RegistryError> {
        let username = required("Username", username)?;
        self.dispatcher
            .get_json(&user_path(username))
            .await
            .map_err(|e| RegistryError::not_found_as(e, || format!("user {username}")))
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] before sending an invalid
    /// request, and the registry's rejection (e.g. `409` for an existing
    /// account) otherwise.
    pub async fn create_user(&self, request: &UserRequest) -> Result<User, RegistryError> {
        request.validate_create()?;
        let user: User = self
            .dispatcher
            .post_json(&format!("{ADMIN_PATH}/users"), request)
            .await?
            .json()?;
        tracing::info!(username = %user.username, "Created user");
        Ok(user)
    }

    /// Updates an account; unset fields keep their value.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for a short password and
    /// [`RegistryError::NotFound`] for an unknown account.
    pub async fn update_user(
        &self,
        username: &str,
        request: &UserRequest,
    ) -> Result<User, RegistryError> {
        let username = required("Username", username)?;
        request.validate_update()?;
        let user: User = self
            .dispatcher
            .put_json(&user_path(username), request)
            .await
            .map_err(|e| RegistryError::not_found_as(e, || format!("user {username}")))?
            .json()?;
        tracing::info!(username, "Updated user");
        Ok(user)
    }

    /// Deletes an account.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown account.
    pub async fn delete_user(&self, username: &str) -> Result<(), RegistryError> {
        let username = required("Username", username)?;
        self.dispatcher
            .delete(&user_path(username))
            .await
            .map_err(|e| RegistryError::not_found_as(e, || format!("user {username}")))?;
        tracing::info!(username, "Deleted user");
        Ok(())
    }

    /// Lists every permission entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not an administrator or the call fails.
    pub async fn list_permissions(&self) -> Result<Vec<RepositoryPermission>, RegistryError> {
        Ok(self
            .dispatcher
            .get_json(&format!("{ADMIN_PATH}/permissions"))
            .await?)
    }

    /// Lists the permission entries of one account.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn user_permissions(
        &self,
        username: &str,
    ) -> Result<Vec<RepositoryPermission>, RegistryError> {
        let username = required("Username", username)?;
        Ok(self
            .dispatcher
            .get_json(&format!("{ADMIN_PATH}/permissions/{username}"))
            .await?)
    }

    /// Grants (or replaces) an account's rights on a repository.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown account.
    pub async fn set_permission(
        &self,
        username: &str,
        repository: &str,
        grant: PermissionGrant,
    ) -> Result<RepositoryPermission, RegistryError> {
        let username = required("Username", username)?;
        let repository = required("Repository", repository)?;
        let permission: RepositoryPermission = self
            .dispatcher
            .post_json(&permission_path(username, repository), &grant)
            .await
            .map_err(|e| RegistryError::not_found_as(e, || format!("user {username}")))?
            .json()?;
        tracing::info!(
            username,
            repository,
            can_pull = grant.can_pull,
            can_push = grant.can_push,
            "Set permission"
        );
        Ok(permission)
    }

    /// Removes an account's rights on a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn revoke_permission(
        &self,
        username: &str,
        repository: &str,
    ) -> Result<(), RegistryError> {
        let username = required("Username", username)?;
        let repository = required("Repository", repository)?;
        self.dispatcher
            .delete(&permission_path(username, repository))
            .await?;
        tracing::info!(username, repository, "Revoked permission");
        Ok(())
    }
}

fn user_path(username: &str) -> String {
    format!("{ADMIN_PATH}/users/{username}")
}

fn permission_path(username: &str, repository: &str) -> String {
    format!("{ADMIN_PATH}/permissions/{username}/{repository}")
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(validation(&format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_validation() {
        assert!(UserRequest::create("alice", "secret").validate_create().is_ok());

        let blank = UserRequest::create("  ", "secret").validate_create();
        assert_eq!(
            blank.unwrap_err().to_string(),
            "Invalid request: Username is required"
        );

        let short = UserRequest::create("alice", "12345").validate_create();
        assert_eq!(
            short.unwrap_err().to_string(),
            "Invalid request: Password must be at least 6 characters"
        );

        assert!(UserRequest::update().validate_create().is_err());
    }

    #[test]
    fn test_user_request_debug_redacts_password() {
        let debug = format!("{:?}", UserRequest::create("alice", "hunter22"));
        assert!(debug.contains("alice"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter22"));

        let debug = format!("{:?}", UserRequest::update().with_enabled(true));
        assert!(debug.contains("password: None"));
    }

    #[test]
    fn test_update_validation() {
        assert!(UserRequest::update().validate_update().is_ok());
        assert!(UserRequest::update().with_password("").validate_update().is_ok());
        assert!(UserRequest::update().with_password("abc").validate_update().is_err());
        assert!(UserRequest::update().with_password("abcdef").validate_update().is_ok());
    }

    #[test]
    fn test_user_request_serialization_skips_unset_fields() {
        let request = UserRequest::update()
            .with_enabled(false)
            .with_allowed_repositories(["library/nginx"]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"enabled": false, "allowedRepositories": ["library/nginx"]})
        );
    }

    #[test]
    fn test_user_deserialization() {
        let user: User = serde_json::from_str(
            r#"{"username":"admin","email":null,"enabled":true,"roles":["ADMIN"],"allowedRepositories":null,"createdAt":"2025-01-02T03:04:05","updatedAt":"2025-01-02T03:04:05.5"}"#,
        )
        .unwrap();
        assert!(user.has_role("ADMIN"));
        assert!(!user.has_role("DEV"));
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_permission_grant_serialization() {
        let json = serde_json::to_value(PermissionGrant::pull()).unwrap();
        assert_eq!(json, serde_json::json!({"canPull": true, "canPush": false}));
    }
}
