//! `Orchestrator`: runs the upload and execute phases over a host map
//!
//! Hosts are processed in batches of `core.parallelism`, one task per host.
//! A task takes its host record out of the map and hands it back with its
//! result, so every connection stays owned by exactly one record.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use inmars_exec::{Connector, CredentialProfile, UploadUnit};
use tracing::{error, info, instrument};

use crate::config::RunConfig;
use crate::error::CoreError;
use crate::execute::{execute_on_host, staged_name};
use crate::host::{HostMap, HostRecord};
use crate::response::{ExecutionReport, HostOutcome};
use crate::upload::upload_or_disable;

/// Drives one run against a fleet
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<RunConfig>,
    profile: Arc<CredentialProfile>,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Resolve the shared credential profile and prepare a run
    ///
    /// # Errors
    /// Returns `CoreError::Credentials` if the SSH settings do not resolve
    pub fn new(config: RunConfig, connector: Arc<dyn Connector>) -> Result<Self, CoreError> {
        let profile = CredentialProfile::resolve(&config.ssh)?;
        Ok(Self::with_profile(config, profile, connector))
    }

    /// Prepare a run with an already resolved profile
    #[must_use]
    pub fn with_profile(
        config: RunConfig,
        profile: CredentialProfile,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            profile: Arc::new(profile),
            connector,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn profile(&self) -> &CredentialProfile {
        &self.profile
    }

    /// Upload the script at `script` to every enabled host
    ///
    /// Hosts that fail are disabled and the others continue.
    ///
    /// # Errors
    /// Returns `CoreError::ReadScript` if the local file cannot be read; no host
    /// is touched in that case
    #[instrument(skip(self, hosts))]
    pub async fn upload(&self, hosts: &mut HostMap, script: &Path) -> Result<(), CoreError> {
        let unit = UploadUnit::read(script)
            .await
            .map_err(|e| CoreError::ReadScript {
                path: script.display().to_string(),
                reason: e.to_string(),
            })?;

        self.upload_unit(hosts, unit).await;
        Ok(())
    }

    /// Upload an in-memory unit to every enabled host
    ///
    /// Returns the number of hosts that received it.
    pub async fn upload_unit(&self, hosts: &mut HostMap, unit: UploadUnit) -> usize {
        let unit = Arc::new(unit);

        info!(
            hosts = hosts.values().filter(|h| !h.is_disabled()).count(),
            file = %unit.name(),
            size = unit.size(),
            "uploading script"
        );

        let results = self
            .run_batched(hosts, |mut host| {
                let this = self.clone();
                let unit = Arc::clone(&unit);
                async move {
                    let ok = upload_or_disable(
                        &mut host,
                        this.connector.as_ref(),
                        &this.profile,
                        &this.config.core.remote_base_dir,
                        &unit,
                    )
                    .await;
                    (host, ok)
                }
            })
            .await;

        let uploaded = results.iter().filter(|(_, ok)| *ok == Some(true)).count();
        info!(uploaded, attempted = results.len(), "upload finished");
        uploaded
    }

    /// Run the staged script on every enabled host and collect the answers
    ///
    /// Every host ends up with an outcome; a failure on one host never drops the
    /// answers of the others.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidScriptName` if `script` has no usable base name
    #[instrument(skip(self, hosts))]
    pub async fn execute(
        &self,
        hosts: &mut HostMap,
        script: &str,
    ) -> Result<ExecutionReport, CoreError> {
        let script = staged_name(script)
            .ok_or_else(|| CoreError::InvalidScriptName(script.to_string()))?
            .to_string();

        let mut report = ExecutionReport::default();
        for host in hosts.values().filter(|h| h.is_disabled()) {
            report.record(host.name().to_string(), HostOutcome::Disabled, None);
        }

        let results = self
            .run_batched(hosts, |mut host| {
                let this = self.clone();
                let script = script.clone();
                async move {
                    let result = execute_on_host(
                        &mut host,
                        this.connector.as_ref(),
                        &this.profile,
                        &this.config.core,
                        &script,
                    )
                    .await;
                    (host, result)
                }
            })
            .await;

        for (name, result) in results {
            match result {
                Some((outcome, response)) => report.record(name, outcome, response),
                None => report.record(
                    name,
                    HostOutcome::Aborted {
                        error: "host task panicked".to_string(),
                    },
                    None,
                ),
            }
        }

        info!(
            responses = report.responses.len(),
            failed = report.failed_hosts().len(),
            "execution finished"
        );

        Ok(report)
    }

    /// Disconnect every cached connection
    pub async fn release_all(&self, hosts: &mut HostMap) {
        for host in hosts.values_mut() {
            host.release().await;
        }
    }

    /// Run `work` for every enabled host, `parallelism` hosts at a time
    ///
    /// A host whose task panics comes back disabled and without its connection;
    /// its result is `None`.
    async fn run_batched<T, F, Fut>(&self, hosts: &mut HostMap, work: F) -> Vec<(String, Option<T>)>
    where
        F: Fn(HostRecord) -> Fut,
        Fut: Future<Output = (HostRecord, T)> + Send + 'static,
        T: Send + 'static,
    {
        let mut names: Vec<String> = hosts
            .iter()
            .filter(|(_, host)| !host.is_disabled())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let batch_size = self.config.core.parallelism.max(1);
        let mut results = Vec::with_capacity(names.len());

        for batch in names.chunks(batch_size) {
            let mut handles = Vec::with_capacity(batch.len());

            for name in batch {
                let Some(host) = hosts.remove(name) else {
                    continue;
                };
                let fallback = host.detached();
                handles.push((name.clone(), fallback, tokio::spawn(work(host))));
            }

            for (name, fallback, handle) in handles {
                match handle.await {
                    Ok((host, value)) => {
                        hosts.insert(name.clone(), host);
                        results.push((name, Some(value)));
                    }
                    Err(e) => {
                        error!(host = %name, error = %e, "task panicked");
                        hosts.insert(name.clone(), fallback);
                        results.push((name, None));
                    }
                }
            }
        }

        results
    }
}
