//! Funeral CLI - Command-line console for the Funeral container registry.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands, Context};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funeral=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("funeral {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = Context::open(&cli.global)?;

    match cli.command {
        Commands::Login(args) => commands::auth::login(&ctx, &args).await,
        Commands::Logout => {
            commands::auth::logout(&ctx);
            Ok(())
        }
        Commands::Status => commands::auth::status(&ctx).await,
        Commands::Repos => commands::browse::repos(&ctx).await,
        Commands::Tags(args) => commands::browse::tags(&ctx, &args).await,
        Commands::Manifest(args) => commands::browse::manifest(&ctx, &args).await,
        Commands::Blob(args) => commands::browse::blob(&ctx, &args).await,
        Commands::Delete(args) => commands::browse::delete(&ctx, &args).await,
        Commands::Users(cmd) => commands::admin::users(&ctx, cmd).await,
        Commands::Permissions(cmd) => commands::admin::permissions(&ctx, cmd).await,
        Commands::Version => Ok(()),
    }
}
