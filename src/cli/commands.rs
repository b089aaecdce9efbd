//! CLI command implementations

use anyhow::Result;
use std::time::Duration;

use crate::cli::args::{ConfigCommand, DaemonCommand};
use crate::config::Settings;
use crate::daemon::client::DaemonClient;
use crate::daemon::ipc::{DaemonRequest, DaemonResponse};
use crate::notification::{present, Action, Prompt};
use crate::storage::{Database, Phase, PhaseStore};

/// How long `daemon stop` and `daemon restart` wait for the old daemon to go away
const EXIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Send a lifecycle command and return the resulting phase
async fn send_command(settings: &Settings, request: DaemonRequest) -> Result<Phase> {
    let mut client = DaemonClient::connect(settings).await?;

    match client.send(request).await? {
        DaemonResponse::Phase(phase) => Ok(phase),
        DaemonResponse::Error { message, .. } => anyhow::bail!("{}", message),
        _ => anyhow::bail!("Unexpected response from daemon"),
    }
}

/// Start a new session
pub async fn start_session(
    settings: &Settings,
    destination: String,
    entrypoint: Option<String>,
) -> Result<()> {
    let phase = send_command(
        settings,
        DaemonRequest::Start {
            entrypoint,
            destination: destination.clone(),
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to start: {}", e))?;

    println!("Session started: {} ({})", destination, phase);
    Ok(())
}

/// Begin recording
pub async fn record(settings: &Settings) -> Result<()> {
    let phase = send_command(settings, DaemonRequest::Record).await?;
    println!("Phase: {}", phase);
    Ok(())
}

/// Save and end the session
pub async fn save(settings: &Settings) -> Result<()> {
    let phase = send_command(settings, DaemonRequest::Save).await?;
    println!("Recording saved ({})", phase);
    Ok(())
}

/// Stop the session
pub async fn stop(settings: &Settings) -> Result<()> {
    let phase = send_command(settings, DaemonRequest::Stop).await?;
    println!("Session stopped ({})", phase);
    Ok(())
}

/// Tap a notification button
pub async fn tap(settings: &Settings, action: Action) -> Result<()> {
    let phase = send_command(settings, DaemonRequest::Tap { action }).await?;
    println!("{} -> {}", action.label(), phase);
    Ok(())
}

/// Show the persisted phase.
///
/// Reads the database directly so it works after restarts and without a daemon.
pub async fn show_status(settings: &Settings, json: bool) -> Result<()> {
    let db = Database::open(settings)?;
    let record = db.record()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    match record {
        Some(record) => {
            println!("Phase: {}", record.phase);
            if let Some(destination) = record.destination {
                println!("  Destination: {}", destination);
            }
            println!(
                "  Updated: {}",
                record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => println!("Phase: {}", Phase::Stopped),
    }

    Ok(())
}

/// Clear the persisted phase
pub async fn reset_state(settings: &Settings) -> Result<()> {
    match DaemonClient::connect(settings).await {
        Ok(mut client) => match client.send(DaemonRequest::ResetState).await? {
            DaemonResponse::Ok => {}
            DaemonResponse::Error { message, .. } => {
                anyhow::bail!("Failed to reset state: {}", message)
            }
            _ => anyhow::bail!("Unexpected response from daemon"),
        },
        // No daemon means no live worker; clearing the record directly is safe.
        Err(_) => Database::open(settings)?.clear()?,
    }

    println!("Persisted state cleared");
    Ok(())
}

/// Show the notification prompt for the persisted phase
pub async fn show_notification(settings: &Settings) -> Result<()> {
    let db = Database::open(settings)?;

    match present(db.read()?) {
        Some(prompt) => print_prompt(&prompt),
        None => println!("(no notification)"),
    }

    Ok(())
}

fn print_prompt(prompt: &Prompt) {
    println!("{}", prompt.title);
    println!("  {}", prompt.body);
    if !prompt.actions.is_empty() {
        let labels: Vec<&str> = prompt.actions.iter().map(|a| a.label()).collect();
        println!("  [{}]", labels.join("] ["));
    }
}

/// Handle daemon subcommands
pub async fn daemon_command(settings: &Settings, cmd: DaemonCommand) -> Result<()> {
    match cmd {
        DaemonCommand::Start { foreground } => {
            if foreground {
                crate::daemon::run_foreground(settings).await?;
            } else {
                crate::daemon::start_daemon(settings).await?;
                println!("Daemon started");
            }
        }
        DaemonCommand::Stop => {
            let mut client = DaemonClient::connect(settings).await?;
            client.send(DaemonRequest::Shutdown).await?;
            if !crate::daemon::wait_for_exit(settings, EXIT_TIMEOUT).await {
                anyhow::bail!("Daemon did not exit within {:?}", EXIT_TIMEOUT);
            }
            println!("Daemon stopped");
        }
        DaemonCommand::Restart => {
            if let Ok(mut client) = DaemonClient::connect(settings).await {
                let _ = client.send(DaemonRequest::Shutdown).await;
                if !crate::daemon::wait_for_exit(settings, EXIT_TIMEOUT).await {
                    anyhow::bail!("Daemon did not exit within {:?}", EXIT_TIMEOUT);
                }
            }
            crate::daemon::start_daemon(settings).await?;
            println!("Daemon restarted");
        }
        DaemonCommand::Status => {
            if crate::daemon::is_running(settings).await {
                println!("Daemon is running");
            } else {
                println!("Daemon is not running");
            }
        }
    }

    Ok(())
}

/// Handle config subcommands
pub fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}
