//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::notification::Action;

/// background-work - keep a background recording session alive
#[derive(Parser, Debug)]
#[command(name = "background-work")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a background session writing to DESTINATION
    Start {
        /// Where the worker should write its output
        destination: String,

        /// Worker entrypoint (`builtin:<name>` or an executable path)
        #[arg(short, long)]
        entrypoint: Option<String>,
    },

    /// Begin recording
    Record,

    /// Save the recording and end the session
    Save,

    /// Stop the session
    Stop,

    /// Show the persisted phase (works without a running daemon)
    Status {
        /// Print the persisted record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the persisted phase without stopping anything
    Reset,

    /// Show the notification prompt for the current phase
    Notification,

    /// Simulate tapping a notification button
    Tap {
        /// Button to tap
        #[arg(value_enum)]
        action: Action,
    },

    /// Daemon management commands
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completion script
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start the background daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Restart the daemon
    Restart,

    /// Check daemon status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_takes_destination_and_optional_entrypoint() {
        let cli = Cli::try_parse_from(["background-work", "start", "out.wav", "-e", "builtin:log"])
            .unwrap();
        match cli.command {
            Commands::Start {
                destination,
                entrypoint,
            } => {
                assert_eq!(destination, "out.wav");
                assert_eq!(entrypoint.as_deref(), Some("builtin:log"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn tap_accepts_only_known_actions() {
        let cli = Cli::try_parse_from(["background-work", "tap", "save"]).unwrap();
        assert!(matches!(cli.command, Commands::Tap { action: Action::Save }));
        assert!(Cli::try_parse_from(["background-work", "tap", "pause"]).is_err());
    }
}
