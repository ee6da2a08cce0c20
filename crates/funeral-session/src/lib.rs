//! # Funeral Session
//!
//! Authentication and session core for the Funeral registry console.
//!
//! This crate decides whether the registry enforces authentication at all,
//! holds and validates the bearer credential, projects who counts as an
//! administrator, guards navigation, and turns unauthorized API responses
//! into a consistent forced logout.
//!
//! ## Features
//!
//! - **Single-flight policy discovery**: one auth-policy fetch per process, fail secure
//! - **Durable credentials**: token and identity persisted together, atomically
//! - **Authorized dispatch**: bearer header on every call, logout on `401`
//! - **Route guard**: allow, redirect to login, or redirect home
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use funeral_session::{
//!     ClientConfig, Dispatcher, FileCredentialStore, RouteGuard, Session,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("http://localhost:8911");
//!     let store = Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
//!     let session = Arc::new(Session::new(config, store)?);
//!
//!     let guard = RouteGuard::new(Arc::clone(&session));
//!     if guard.before_each("/").await.is_allowed() {
//!         let dispatcher = Dispatcher::new(Arc::clone(&session));
//!         let catalog: serde_json::Value = dispatcher.get_json("/v2/_catalog").await?;
//!         println!("{catalog}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  AuthConfigGate  │   │ Token codec  │   │ CredentialStore  │
//! └────────┬─────────┘   └──────┬───────┘   └────────┬─────────┘
//!          └────────────────────┼────────────────────┘
//!                               ▼
//!                     ┌──────────────────┐
//!                     │     Session      │
//!                     └────────┬─────────┘
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!          ┌──────────────┐        ┌──────────────┐
//!          │  Dispatcher  │        │  RouteGuard  │
//!          └──────────────┘        └──────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod dispatcher;
mod error;
mod gate;
mod guard;
mod identity;
mod session;
mod store;
mod token;

pub use config::{default_credentials_path, ClientConfig, TlsConfig, DEFAULT_ADMIN_ROLE};
pub use dispatcher::{
    ApiRequest, ApiResponse, Dispatcher, ResponseBody, APPLICATION_JSON, APPLICATION_OCTET_STREAM,
};
pub use error::{ApiError, DecodeError, LoginError, StoreError};
pub use gate::{AuthConfigGate, AuthConfiguration, AUTH_CONFIG_PATH};
pub use guard::{
    Navigation, Route, RouteGuard, RouteTable, ADMIN_DENIED_NOTICE, HOME_PATH, LOGIN_PATH,
};
pub use identity::{Identity, ANONYMOUS_USERNAME};
pub use session::{Session, SessionState, TOKEN_PATH};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredential};
pub use token::{decode, Credential};
