//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Daemon process settings
    #[serde(default)]
    pub daemon: DaemonSettings,

    /// Background worker settings
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Notification settings
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for the phase database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Exit the daemon once the session is stopped
    #[serde(default)]
    pub exit_when_idle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Entrypoint used when `start` is given none (`builtin:<name>` or an executable path)
    #[serde(default = "default_entrypoint")]
    pub default_entrypoint: String,

    /// How long the worker has to acknowledge its destination
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    /// How long teardown may take before the worker is abandoned
    #[serde(default = "default_release_timeout_ms")]
    pub release_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Render phase prompts
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "background-work", "background-work")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/background-work"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_entrypoint() -> String {
    "builtin:log".to_string()
}

fn default_start_timeout_ms() -> u64 {
    5000
}

fn default_release_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            default_entrypoint: default_entrypoint(),
            start_timeout_ms: default_start_timeout_ms(),
            release_timeout_ms: default_release_timeout_ms(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl WorkerSettings {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::debug!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(entrypoint) = std::env::var("BACKGROUND_WORK_ENTRYPOINT") {
            if !entrypoint.trim().is_empty() {
                self.worker.default_entrypoint = entrypoint;
            }
        }
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "background-work", "background-work")
            .context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &PathBuf) -> Result<()> {
        let settings = Self::default();
        let content = toml::to_string_pretty(&settings)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the database path
    pub fn database_path(&self) -> PathBuf {
        self.general.data_dir.join("background-work.db")
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        runtime_dir().join("background-work.sock")
    }

    /// Get the PID file path
    pub fn pid_path(&self) -> PathBuf {
        runtime_dir().join("background-work.pid")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        Ok(())
    }
}

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_builtin_entrypoint() {
        let settings = Settings::default();
        assert_eq!(settings.worker.default_entrypoint, "builtin:log");
        assert_eq!(settings.worker.start_timeout(), Duration::from_secs(5));
        assert!(!settings.daemon.exit_when_idle);
        assert!(settings.notifications.enabled);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [worker]
            release_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(settings.worker.release_timeout(), Duration::from_millis(250));
        assert_eq!(settings.worker.start_timeout_ms, 5000);
        assert_eq!(settings.general.log_level, "info");
    }
}
