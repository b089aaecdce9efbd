//! background-work - background recording session controller
//!
//! Entry point for the background-work CLI and daemon.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use background_work::cli::{Cli, Commands};
use background_work::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        background_work::cli::completions::print(shell);
        return Ok(());
    }

    // Load configuration only for runtime commands.
    let settings = Settings::load()?;

    // Initialize logging
    let default_level = if cli.verbose {
        "debug"
    } else {
        settings.general.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Execute command
    match cli.command {
        Commands::Start {
            destination,
            entrypoint,
        } => {
            background_work::cli::commands::start_session(&settings, destination, entrypoint)
                .await?;
        }
        Commands::Record => {
            background_work::cli::commands::record(&settings).await?;
        }
        Commands::Save => {
            background_work::cli::commands::save(&settings).await?;
        }
        Commands::Stop => {
            background_work::cli::commands::stop(&settings).await?;
        }
        Commands::Status { json } => {
            background_work::cli::commands::show_status(&settings, json).await?;
        }
        Commands::Reset => {
            background_work::cli::commands::reset_state(&settings).await?;
        }
        Commands::Notification => {
            background_work::cli::commands::show_notification(&settings).await?;
        }
        Commands::Tap { action } => {
            background_work::cli::commands::tap(&settings, action).await?;
        }
        Commands::Daemon(daemon_cmd) => {
            background_work::cli::commands::daemon_command(&settings, daemon_cmd).await?;
        }
        Commands::Config(config_cmd) => {
            background_work::cli::commands::config_command(&settings, config_cmd)?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
