//! Configuration types for a run and its hosts

use std::path::PathBuf;

use inmars_exec::SshSettings;
use serde::{Deserialize, Serialize};

/// Settings the orchestration layer reads during a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// SSH settings shared by every host
    #[serde(default)]
    pub ssh: SshSettings,
    /// Staging and debug settings
    #[serde(default)]
    pub core: CoreSettings,
}

/// Core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Remote directory the staging folder is created under
    #[serde(default = "default_remote_base_dir")]
    pub remote_base_dir: String,
    /// Log script output of every host
    #[serde(default)]
    pub debug: bool,
    /// Run the remote script without its debug-suppression flag
    #[serde(default)]
    pub special_debug: bool,
    /// Keep the local temporary script after the run
    #[serde(default)]
    pub keep_temp_files: bool,
    /// Number of hosts processed at the same time
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            remote_base_dir: default_remote_base_dir(),
            debug: false,
            special_debug: false,
            keep_temp_files: false,
            parallelism: default_parallelism(),
            log_level: default_log_level(),
        }
    }
}

fn default_remote_base_dir() -> String {
    "$HOME".to_string()
}

fn default_parallelism() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration for a single target host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// IP address or hostname for SSH connection
    pub address: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-host login user
    #[serde(default)]
    pub username: Option<String>,
    /// Per-host private key path
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Per-host password
    #[serde(default)]
    pub password: Option<String>,
    /// Skip this host entirely
    #[serde(default)]
    pub disable: bool,
}

fn default_port() -> u16 {
    22
}

impl HostConfig {
    /// Whether any credential setting is overridden for this host
    #[must_use]
    pub fn has_overrides(&self) -> bool {
        self.username.is_some() || self.private_key.is_some() || self.password.is_some()
    }

    /// Overlay this host's credential overrides onto the shared SSH settings
    ///
    /// Returns `None` when the host has no overrides and uses the shared profile.
    #[must_use]
    pub fn credential_settings(&self, base: &SshSettings) -> Option<SshSettings> {
        if !self.has_overrides() {
            return None;
        }

        let mut settings = base.clone();
        if let Some(username) = &self.username {
            settings.username.clone_from(username);
        }
        if let Some(key) = &self.private_key {
            settings.private_key = Some(key.clone());
            settings.private_key_env = None;
        }
        if let Some(password) = &self.password {
            settings.password = Some(password.clone());
        }
        Some(settings)
    }
}
