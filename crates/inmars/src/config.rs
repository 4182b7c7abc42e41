//! Configuration loading and host selection

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use inmars_core::{CoreError, CoreSettings, HostConfig, HostMap, HostRecord, RunConfig};
use inmars_exec::SshSettings;
use serde::{Deserialize, Serialize};

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared SSH settings
    #[serde(default)]
    pub ssh: SshSettings,
    /// Staging, debug and logging settings
    #[serde(default)]
    pub core: CoreSettings,
    /// Target hosts by identifier
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from the first default location that exists
    ///
    /// # Errors
    /// Returns error if no configuration file is found or it cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        // Check environment variable
        if let Ok(path) = std::env::var("INMARS_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("inmars.toml"),
            PathBuf::from("/etc/inmars/inmars.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("inmars/inmars.toml"));
        }

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        eyre::bail!("no configuration file found (set INMARS_CONFIG or pass -c)")
    }

    /// Settings handed to the orchestration layer
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            ssh: self.ssh.clone(),
            core: self.core.clone(),
        }
    }

    /// Build host records for the selected hosts
    ///
    /// An empty `limit` selects every configured host.
    ///
    /// # Errors
    /// Returns `CoreError::Config` for unknown host names and
    /// `CoreError::Credentials` for host overrides that do not resolve
    pub fn select_hosts(&self, limit: &[String]) -> Result<HostMap, CoreError> {
        let names: Vec<&String> = if limit.is_empty() {
            self.hosts.keys().collect()
        } else {
            limit.iter().collect()
        };

        let mut selected = HostMap::with_capacity(names.len());
        for name in names {
            let host = self
                .hosts
                .get(name)
                .ok_or_else(|| CoreError::Config(format!("unknown host {name:?}")))?;
            selected.insert(
                name.clone(),
                HostRecord::from_config(name.clone(), host, &self.ssh)?,
            );
        }

        if selected.is_empty() {
            return Err(CoreError::Config("no hosts configured".to_string()));
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [ssh]
        username = "deploy"
        password = "secret"
        timeout = "10s"

        [core]
        remote_base_dir = "/home/deploy"
        special_debug = true

        [hosts.web1]
        address = "10.0.0.5"

        [hosts.web2]
        address = "10.0.0.6"
        port = 2222
        username = "admin"

        [hosts.old]
        address = "10.0.0.7"
        disable = true
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.ssh.username, "deploy");
        assert_eq!(config.core.remote_base_dir, "/home/deploy");
        assert!(config.core.special_debug);
        assert_eq!(config.core.parallelism, 1);
        assert_eq!(config.hosts.len(), 3);
        assert_eq!(config.hosts["web2"].port, 2222);
        assert_eq!(config.hosts["web1"].port, 22);
    }

    #[test]
    fn test_select_all_hosts() {
        let config = Config::parse(SAMPLE).unwrap();
        let hosts = config.select_hosts(&[]).unwrap();

        assert_eq!(hosts.len(), 3);
        assert!(hosts["old"].is_disabled());
        assert!(!hosts["web1"].is_disabled());
        assert_eq!(hosts["web2"].endpoint().port, 2222);
    }

    #[test]
    fn test_select_limited_hosts() {
        let config = Config::parse(SAMPLE).unwrap();
        let hosts = config.select_hosts(&["web2".to_string()]).unwrap();

        assert_eq!(hosts.len(), 1);
        assert!(hosts.contains_key("web2"));
    }

    #[test]
    fn test_select_unknown_host() {
        let config = Config::parse(SAMPLE).unwrap();
        let result = config.select_hosts(&["db9".to_string()]);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_select_without_hosts() {
        let config = Config::parse("[ssh]\nusername = \"deploy\"\n").unwrap();
        assert!(matches!(config.select_hosts(&[]), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/inmars/inmars.toml")).is_err());
    }
}
