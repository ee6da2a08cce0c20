//! User and permission administration commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use funeral_registry::{PermissionGrant, RepositoryPermission, User, UserRequest};

use super::browse::format_time;
use super::{explain, print_json, Context, OutputFormat};

/// Console page for user administration.
const USERS_PAGE: &str = "/admin/users";

/// Console page for permission administration.
const PERMISSIONS_PAGE: &str = "/admin/permissions";

/// User administration subcommands.
#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    /// List all accounts
    List,

    /// Show one account
    Get {
        /// Username
        username: String,
    },

    /// Create an account
    Create(CreateUserArgs),

    /// Update an account; omitted fields keep their value
    Update(UpdateUserArgs),

    /// Delete an account
    Delete {
        /// Username
        username: String,
    },
}

/// Arguments for creating an account.
#[derive(Args, Debug)]
pub struct CreateUserArgs {
    /// Username
    pub username: String,

    /// Password (at least 6 characters)
    #[arg(long, env = "FUNERAL_NEW_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Email address
    #[arg(long)]
    pub email: Option<String>,

    /// Role to grant (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,

    /// Repository the account is restricted to (repeatable)
    #[arg(long = "repository")]
    pub repositories: Vec<String>,

    /// Create the account disabled
    #[arg(long)]
    pub disabled: bool,
}

/// Arguments for updating an account.
#[derive(Args, Debug)]
pub struct UpdateUserArgs {
    /// Username
    pub username: String,

    /// New password
    #[arg(long, env = "FUNERAL_NEW_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// New email address
    #[arg(long)]
    pub email: Option<String>,

    /// Replace the roles (repeatable)
    #[arg(long = "role")]
    pub roles: Option<Vec<String>>,

    /// Replace the repository restrictions (repeatable)
    #[arg(long = "repository")]
    pub repositories: Option<Vec<String>>,

    /// Enable or disable the account
    #[arg(long)]
    pub enabled: Option<bool>,
}

/// Permission administration subcommands.
#[derive(Subcommand, Debug)]
pub enum PermissionsCommand {
    /// List every permission entry
    List,

    /// Show the permissions of one account
    Show {
        /// Username
        username: String,
    },

    /// Grant an account rights on a repository
    Set(SetPermissionArgs),

    /// Remove an account's rights on a repository
    Revoke {
        /// Username
        username: String,

        /// Repository name
        repository: String,
    },
}

/// Arguments for granting a permission.
#[derive(Args, Debug)]
pub struct SetPermissionArgs {
    /// Username
    pub username: String,

    /// Repository name
    pub repository: String,

    /// Also allow pushes
    #[arg(long)]
    pub push: bool,

    /// Deny pulls
    #[arg(long)]
    pub no_pull: bool,
}

impl CreateUserArgs {
    fn to_request(&self) -> UserRequest {
        let mut request = UserRequest::create(&self.username, &self.password)
            .with_enabled(!self.disabled);
        if let Some(ref email) = self.email {
            request = request.with_email(email);
        }
        if !self.roles.is_empty() {
            request = request.with_roles(&self.roles);
        }
        if !self.repositories.is_empty() {
            request = request.with_allowed_repositories(&self.repositories);
        }
        request
    }
}

impl UpdateUserArgs {
    fn to_request(&self) -> UserRequest {
        let mut request = UserRequest::update();
        if let Some(ref password) = self.password {
            request = request.with_password(password);
        }
        if let Some(ref email) = self.email {
            request = request.with_email(email);
        }
        if let Some(enabled) = self.enabled {
            request = request.with_enabled(enabled);
        }
        if let Some(ref roles) = self.roles {
            request = request.with_roles(roles);
        }
        if let Some(ref repositories) = self.repositories {
            request = request.with_allowed_repositories(repositories);
        }
        request
    }
}

impl SetPermissionArgs {
    const fn grant(&self) -> PermissionGrant {
        PermissionGrant {
            can_pull: !self.no_pull,
            can_push: self.push,
        }
    }
}

/// Runs a user administration subcommand.
pub async fn users(ctx: &Context, command: UsersCommand) -> Result<()> {
    ctx.enter(USERS_PAGE).await?;

    match command {
        UsersCommand::List => {
            let users = ctx.admin.list_users().await.map_err(explain)?;
            if ctx.format == OutputFormat::Json {
                return print_json(&users);
            }
            println!("{:<24} {:<8} {:<24} CREATED", "USERNAME", "ENABLED", "ROLES");
            for user in &users {
                println!("{}", user_row(user));
            }
        }
        UsersCommand::Get { username } => {
            let user = ctx.admin.get_user(&username).await.map_err(explain)?;
            if ctx.format == OutputFormat::Json {
                return print_json(&user);
            }
            print_user(&user);
        }
        UsersCommand::Create(args) => {
            let user = ctx
                .admin
                .create_user(&args.to_request())
                .await
                .map_err(explain)?;
            println!("Created user {}", user.username);
        }
        UsersCommand::Update(args) => {
            let user = ctx
                .admin
                .update_user(&args.username, &args.to_request())
                .await
                .map_err(explain)?;
            println!("Updated user {}", user.username);
        }
        UsersCommand::Delete { username } => {
            ctx.admin.delete_user(&username).await.map_err(explain)?;
            println!("Deleted user {username}");
        }
    }
    Ok(())
}

/// Runs a permission administration subcommand.
pub async fn permissions(ctx: &Context, command: PermissionsCommand) -> Result<()> {
    ctx.enter(PERMISSIONS_PAGE).await?;

    match command {
        PermissionsCommand::List => {
            let permissions = ctx.admin.list_permissions().await.map_err(explain)?;
            print_permissions(ctx.format, &permissions)?;
        }
        PermissionsCommand::Show { username } => {
            let permissions = ctx
                .admin
                .user_permissions(&username)
                .await
                .map_err(explain)?;
            print_permissions(ctx.format, &permissions)?;
        }
        PermissionsCommand::Set(args) => {
            let permission = ctx
                .admin
                .set_permission(&args.username, &args.repository, args.grant())
                .await
                .map_err(explain)?;
            println!("{}", permission_row(&permission));
        }
        PermissionsCommand::Revoke {
            username,
            repository,
        } => {
            ctx.admin
                .revoke_permission(&username, &repository)
                .await
                .map_err(explain)?;
            println!("Revoked {username} on {repository}");
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("Username:     {}", user.username);
    println!("Email:        {}", user.email.as_deref().unwrap_or("-"));
    println!("Enabled:      {}", yes_no(user.enabled.unwrap_or(true)));
    println!("Roles:        {}", join_or_dash(user.roles.as_deref()));
    println!(
        "Repositories: {}",
        join_or_dash(user.allowed_repositories.as_deref())
    );
    println!("Created:      {}", format_time(user.created_at));
    println!("Updated:      {}", format_time(user.updated_at));
}

fn print_permissions(format: OutputFormat, permissions: &[RepositoryPermission]) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&permissions);
    }
    if permissions.is_empty() {
        println!("No permissions");
        return Ok(());
    }
    println!("{:<24} {:<40} ACCESS", "USERNAME", "REPOSITORY");
    for permission in permissions {
        println!("{}", permission_row(permission));
    }
    Ok(())
}

fn user_row(user: &User) -> String {
    format!(
        "{:<24} {:<8} {:<24} {}",
        user.username,
        yes_no(user.enabled.unwrap_or(true)),
        join_or_dash(user.roles.as_deref()),
        format_time(user.created_at)
    )
}

fn permission_row(permission: &RepositoryPermission) -> String {
    format!(
        "{:<24} {:<40} {}",
        permission.username,
        permission.repository_name,
        access(permission.can_pull, permission.can_push)
    )
}

const fn access(can_pull: bool, can_push: bool) -> &'static str {
    match (can_pull, can_push) {
        (true, true) => "pull,push",
        (true, false) => "pull",
        (false, true) => "push",
        (false, false) => "none",
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn join_or_dash(values: Option<&[String]>) -> String {
    match values {
        Some(values) if !values.is_empty() => values.join(","),
        _ => "-".to_string(),
    }
}
