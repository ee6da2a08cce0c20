//! CLI commands and argument parsing.

pub mod admin;
pub mod auth;
pub mod browse;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use funeral_registry::{AdminClient, RegistryClient, RegistryError};
use funeral_session::{
    ClientConfig, CredentialStore, Dispatcher, FileCredentialStore, MemoryCredentialStore,
    Navigation, RouteGuard, Session, TlsConfig,
};

/// Funeral - console for the Funeral container registry
#[derive(Parser)]
#[command(name = "funeral")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Registry URL
    #[arg(
        short,
        long,
        global = true,
        env = "FUNERAL_REGISTRY_URL",
        default_value = "http://localhost:8911"
    )]
    pub registry: String,

    /// Credential file (defaults to the user config directory)
    #[arg(long, global = true, env = "FUNERAL_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Keep the credential in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub timeout: u64,

    /// CA certificate for the registry
    #[arg(long, global = true, env = "FUNERAL_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for listing commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Log in to the registry
    Login(auth::LoginArgs),

    /// Forget the stored credential
    Logout,

    /// Show the session state
    Status,

    /// List repositories
    Repos,

    /// List the tags of a repository
    Tags(browse::TagsArgs),

    /// Show a manifest
    Manifest(browse::ManifestArgs),

    /// Download a blob
    Blob(browse::BlobArgs),

    /// Delete a tag or a whole repository
    Delete(browse::DeleteArgs),

    /// Manage user accounts (administrators only)
    #[command(subcommand)]
    Users(admin::UsersCommand),

    /// Manage repository permissions (administrators only)
    #[command(subcommand)]
    Permissions(admin::PermissionsCommand),

    /// Print version information
    Version,
}

impl GlobalArgs {
    /// Builds the client configuration from the command line.
    pub fn client_config(&self) -> ClientConfig {
        let mut config =
            ClientConfig::new(&self.registry).with_timeout(Duration::from_secs(self.timeout));

        if let Some(ref path) = self.credentials {
            config = config.with_credentials_path(path);
        }

        if self.insecure || self.ca_cert.is_some() {
            let mut tls = TlsConfig::new();
            if let Some(ref ca_cert) = self.ca_cert {
                tls = tls.with_ca_cert(ca_cert);
            }
            if self.insecure {
                tls = tls.insecure();
            }
            config = config.with_tls(tls);
        }

        config
    }
}

/// Everything a command needs to talk to the registry.
pub struct Context {
    pub session: Arc<Session>,
    pub guard: RouteGuard,
    pub registry: RegistryClient,
    pub admin: AdminClient,
    pub format: OutputFormat,
}

impl Context {
    /// Opens the session described by `args`, restoring any stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn open(args: &GlobalArgs) -> Result<Self> {
        let config = args.client_config();
        let store: Arc<dyn CredentialStore> = if args.ephemeral {
            Arc::new(MemoryCredentialStore::new())
        } else {
            Arc::new(FileCredentialStore::new(config.credentials_path.clone()))
        };

        let session =
            Arc::new(Session::new(config, store).context("Failed to create registry client")?);
        let dispatcher = Dispatcher::new(Arc::clone(&session));

        Ok(Self {
            guard: RouteGuard::new(Arc::clone(&session)),
            registry: RegistryClient::new(dispatcher.clone()),
            admin: AdminClient::new(dispatcher),
            session,
            format: args.format,
        })
    }

    /// Checks the route a command stands for, failing with an instruction
    /// when the session may not go there.
    ///
    /// # Errors
    ///
    /// Returns an error unless navigation to `path` is allowed.
    pub async fn enter(&self, path: &str) -> Result<()> {
        match self.guard.before_each(path).await {
            Navigation::Allow => Ok(()),
            Navigation::RedirectToLogin { redirect } => anyhow::bail!(
                "Login required to open {redirect}: run `funeral login` first"
            ),
            Navigation::RedirectHome {
                notice: Some(notice),
            } => anyhow::bail!("{notice}"),
            Navigation::RedirectHome { notice: None } => {
                anyhow::bail!("{path} is not available in the current session")
            }
        }
    }
}

/// Turns a registry failure into a user-facing error.
pub fn explain(err: RegistryError) -> anyhow::Error {
    if err.is_auth_required() {
        anyhow::anyhow!("The registry rejected the stored credential and you have been logged out: run `funeral login` again")
    } else {
        anyhow::Error::new(err)
    }
}

/// Prints `value` as pretty JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
