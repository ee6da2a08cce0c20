//! # Funeral Registry
//!
//! Registry browsing and administration client for the Funeral console.
//!
//! Every call is routed through the session's authorized dispatcher, so the
//! bearer credential is attached automatically and an unauthorized answer
//! logs the session out ([`RegistryError::is_auth_required`]).
//!
//! ## Features
//!
//! - **OCI Distribution API**: catalog, tags, manifests (image and index), blobs
//! - **Content verification**: sha256 digests checked on every download
//! - **Administration**: users and per-repository pull/push permissions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use funeral_registry::RegistryClient;
//! use funeral_session::{ClientConfig, Dispatcher, FileCredentialStore, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("http://localhost:8911");
//!     let store = Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
//!     let session = Arc::new(Session::new(config, store)?);
//!     session.login("admin", "secret").await?;
//!
//!     let client = RegistryClient::new(Dispatcher::new(session));
//!     for repository in client.repositories().await? {
//!         println!("{} ({} tags)", repository.name, repository.tag_count);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod admin;
mod client;
mod error;
mod oci;

pub use admin::{
    AdminClient, PermissionGrant, RepositoryPermission, User, UserRequest, ADMIN_PATH,
    MIN_PASSWORD_LEN,
};
pub use client::{compute_digest, RegistryClient};
pub use error::RegistryError;
pub use oci::{
    Catalog, Descriptor, ErrorResponse, Manifest, ManifestInfo, MediaType, Platform,
    RegistryApiError, RepositoryInfo, TagList,
};
