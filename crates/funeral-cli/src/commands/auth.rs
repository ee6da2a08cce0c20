//! Login, logout and session status commands.

use anyhow::{Context as _, Result};
use clap::Args;
use funeral_session::{AuthConfiguration, LoginError, RouteGuard, SessionState};

use super::{print_json, Context, OutputFormat};

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Username
    #[arg(short, long, env = "FUNERAL_USERNAME", required_unless_present = "anonymous")]
    pub username: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(long, env = "FUNERAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log in anonymously with pull-only access
    #[arg(long, conflicts_with_all = ["username", "password"])]
    pub anonymous: bool,

    /// Page to continue to after logging in
    #[arg(long)]
    pub redirect: Option<String>,
}

/// Runs the login command.
pub async fn login(ctx: &Context, args: &LoginArgs) -> Result<()> {
    let result = if args.anonymous {
        ctx.session.login_anonymous().await
    } else {
        let username = args
            .username
            .as_deref()
            .context("A username is required")?;
        let password = match args.password {
            Some(ref password) => password.clone(),
            None => rpassword::prompt_password(format!("Password for {username}: "))
                .context("Failed to read password")?,
        };
        ctx.session.login(username, &password).await
    };

    match result {
        Ok(identity) => {
            println!("Logged in as {}", identity.username);
            if ctx.session.is_admin() {
                println!("  Administrator access granted");
            }
            println!(
                "  Continue at: {}",
                RouteGuard::resume_target(args.redirect.as_deref())
            );
            Ok(())
        }
        Err(LoginError::NotEnforced) => {
            println!("Authentication is disabled on {}; no login needed", ctx.session.config().url);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Login failed")),
    }
}

/// Runs the logout command.
pub fn logout(ctx: &Context) {
    let username = ctx.session.identity().map(|i| i.username.clone());
    ctx.session.logout();
    match username {
        Some(username) => println!("Logged out {username}"),
        None => println!("No stored session"),
    }
}

/// Runs the status command.
pub async fn status(ctx: &Context) -> Result<()> {
    let policy = ctx.session.ensure_config().await;
    let state = ctx.session.state();
    let identity = ctx.session.identity();

    if ctx.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "registry": ctx.session.config().url,
            "policy": {
                "enabled": policy.enabled,
                "allowAnonymousPull": policy.allow_anonymous_pull,
                "realm": policy.realm,
            },
            "state": state.as_str(),
            "user": identity.as_deref(),
            "admin": ctx.session.is_admin(),
        }));
    }

    println!("Registry: {}", ctx.session.config().url);
    println!("Authentication: {}", describe_policy(&policy));
    println!("Session: {}", describe_state(state));
    if let Some(identity) = identity {
        println!("User: {}", identity.username);
        if !identity.roles.is_empty() {
            let roles: Vec<&str> = identity.roles.iter().map(String::as_str).collect();
            println!("Roles: {}", roles.join(", "));
        }
    }
    println!("Admin: {}", if ctx.session.is_admin() { "yes" } else { "no" });

    Ok(())
}

fn describe_policy(policy: &AuthConfiguration) -> String {
    if !policy.enabled {
        return "disabled".to_string();
    }
    let mut text = "enabled".to_string();
    if policy.allow_anonymous_pull {
        text.push_str(", anonymous pull allowed");
    }
    if let Some(ref realm) = policy.realm {
        text.push_str(&format!(" (realm {realm})"));
    }
    text
}

const fn describe_state(state: SessionState) -> &'static str {
    match state {
        SessionState::Uninitialized => "not initialized",
        SessionState::Disabled => "open (authentication disabled)",
        SessionState::LoggedOut => "logged out",
        SessionState::LoggedIn => "logged in",
    }
}
