//! Host records and their cached connections

use std::collections::HashMap;
use std::sync::Arc;

use inmars_exec::{Connector, CredentialProfile, Endpoint, RemoteExecutor};
use tracing::{debug, instrument, warn};

use crate::config::HostConfig;
use crate::error::CoreError;

/// Hosts of a run, keyed by host identifier
pub type HostMap = HashMap<String, HostRecord>;

/// A target host plus its runtime connection state
///
/// The connection is owned by the record and never shared with another one.
pub struct HostRecord {
    name: String,
    endpoint: Endpoint,
    /// Profile used instead of the run's shared profile
    profile: Option<Arc<CredentialProfile>>,
    disabled: bool,
    connection: Option<Box<dyn RemoteExecutor>>,
}

impl std::fmt::Debug for HostRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRecord")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("own_profile", &self.profile.is_some())
            .field("disabled", &self.disabled)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl HostRecord {
    /// Create an enabled, unconnected record
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            profile: None,
            disabled: false,
            connection: None,
        }
    }

    /// Build a record from its configuration
    ///
    /// Credential overrides are resolved here, once, into the record's own profile.
    ///
    /// # Errors
    /// Returns `CoreError::Credentials` if the overridden credentials do not resolve
    pub fn from_config(
        name: impl Into<String>,
        config: &HostConfig,
        shared: &inmars_exec::SshSettings,
    ) -> Result<Self, CoreError> {
        let endpoint = Endpoint::new(config.address.clone()).with_port(config.port);
        let mut record = Self::new(name, endpoint);

        if let Some(settings) = config.credential_settings(shared) {
            let profile = CredentialProfile::resolve(&settings)?;
            record = record.with_profile(Arc::new(profile));
        }
        if config.disable {
            record.disable();
        }

        Ok(record)
    }

    /// Use a host-specific credential profile
    #[must_use]
    pub fn with_profile(mut self, profile: Arc<CredentialProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Host identifier
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Exclude the host from the rest of the run
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    /// Whether a connection is cached
    #[must_use]
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Make sure a connection is cached
    ///
    /// A cached connection is returned as-is without checking it is still alive.
    /// On failure the record is left untouched.
    ///
    /// # Errors
    /// Returns `CoreError::Connect` carrying the host identifier
    #[instrument(skip_all, fields(host = %self.name))]
    pub async fn ensure_connected(
        &mut self,
        connector: &dyn Connector,
        shared: &CredentialProfile,
    ) -> Result<&dyn RemoteExecutor, CoreError> {
        if self.connection.is_none() {
            let profile = self.profile.as_deref().unwrap_or(shared);
            let connection = connector
                .connect(&self.endpoint, profile)
                .await
                .map_err(|source| CoreError::Connect {
                    host: self.name.clone(),
                    source,
                })?;

            debug!(host = %self.name, transport = connection.executor_type(), "connection cached");
            self.connection = Some(connection);
        }

        self.connection
            .as_deref()
            .ok_or_else(|| CoreError::Config(format!("{}: connection missing", self.name)))
    }

    /// Disconnect and drop the cached connection
    pub async fn release(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.disconnect().await
        {
            warn!(host = %self.name, error = %e, "failed to disconnect");
        }
    }

    /// A copy without the connection, marked disabled
    ///
    /// Stands in for a record lost with a panicked task.
    pub(crate) fn detached(&self) -> Self {
        Self {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            profile: self.profile.clone(),
            disabled: true,
            connection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inmars_exec::SshSettings;

    #[test]
    fn test_from_config_disabled() {
        let config = HostConfig {
            address: "10.0.0.9".to_string(),
            port: 2222,
            disable: true,
            ..HostConfig::default()
        };
        let record = HostRecord::from_config("db1", &config, &SshSettings::default()).unwrap();

        assert_eq!(record.name(), "db1");
        assert_eq!(record.endpoint(), &Endpoint::new("10.0.0.9").with_port(2222));
        assert!(record.is_disabled());
        assert!(!record.has_connection());
    }

    #[test]
    fn test_from_config_bad_override() {
        let config = HostConfig {
            address: "10.0.0.9".to_string(),
            username: Some(String::new()),
            ..HostConfig::default()
        };
        let shared = SshSettings {
            username: "deploy".to_string(),
            password: Some("secret".to_string()),
            ..SshSettings::default()
        };

        let result = HostRecord::from_config("db1", &config, &shared);
        assert!(matches!(result, Err(CoreError::Credentials(_))));
    }

    #[test]
    fn test_detached_is_disabled() {
        let record = HostRecord::new("web1", Endpoint::new("10.0.0.5"));
        let copy = record.detached();
        assert_eq!(copy.name(), "web1");
        assert!(copy.is_disabled());
        assert!(!record.is_disabled());
    }
}
