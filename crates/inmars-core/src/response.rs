//! Host responses and the per-host outcome of the execute phase

use std::collections::HashMap;
use std::fmt;

use inmars_exec::Endpoint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::HostRecord;

/// Reference to the host a response came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    /// Host identifier
    pub name: String,
    /// Address the host was reached at
    pub address: String,
    pub port: u16,
}

impl HostRef {
    /// Whether this reference points at `record`
    #[must_use]
    pub fn refers_to(&self, record: &HostRecord) -> bool {
        self.name == record.name()
            && self.address == record.endpoint().host
            && self.port == record.endpoint().port
    }
}

impl From<&HostRecord> for HostRef {
    fn from(record: &HostRecord) -> Self {
        let Endpoint { host, port } = record.endpoint().clone();
        Self {
            name: record.name().to_string(),
            address: host,
            port,
        }
    }
}

/// Decoded JSON object a host's script printed, tagged with its host
///
/// Serializes as `{"host": {..}, "fields": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    pub host: HostRef,
    /// Fields of the object the remote script emitted
    pub fields: Map<String, Value>,
}

impl HostResponse {
    /// Decode the stdout of a remote script
    ///
    /// # Errors
    /// Returns the JSON error if stdout is not exactly one JSON object
    pub fn decode(host: HostRef, stdout: &str) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = serde_json::from_str(stdout.trim())?;
        Ok(Self { host, fields })
    }

    /// Look up a field of the response
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// What happened to one host during the execute phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HostOutcome {
    /// A response was recorded
    Responded,
    /// Host was disabled earlier in the run and skipped
    Disabled,
    /// No connection could be established
    ConnectFailed { error: String },
    /// The command could not be run over the connection
    TransportFailed { error: String },
    /// The script exited with a non-zero status
    ScriptFailed { status: i32, stderr: String },
    /// Stdout was not a JSON object
    InvalidResponse { error: String },
    /// The host's task ended without reporting
    Aborted { error: String },
}

impl HostOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, HostOutcome::Responded)
    }
}

impl fmt::Display for HostOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostOutcome::Responded => write!(f, "responded"),
            HostOutcome::Disabled => write!(f, "disabled"),
            HostOutcome::ConnectFailed { error } => write!(f, "connection failed: {error}"),
            HostOutcome::TransportFailed { error } => write!(f, "transport failed: {error}"),
            HostOutcome::ScriptFailed { status, .. } => write!(f, "script exited with {status}"),
            HostOutcome::InvalidResponse { error } => write!(f, "invalid response: {error}"),
            HostOutcome::Aborted { error } => write!(f, "aborted: {error}"),
        }
    }
}

/// Result of the execute phase
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// At most one response per host, in no particular order
    pub responses: Vec<HostResponse>,
    /// Outcome of every host in the map, keyed by host identifier
    pub outcomes: HashMap<String, HostOutcome>,
}

impl ExecutionReport {
    /// Response of a given host
    #[must_use]
    pub fn response_for(&self, name: &str) -> Option<&HostResponse> {
        self.responses.iter().find(|r| r.host.name == name)
    }

    /// Hosts that did not respond, sorted by name
    #[must_use]
    pub fn failed_hosts(&self) -> Vec<(&str, &HostOutcome)> {
        let mut failed: Vec<_> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, outcome)| (name.as_str(), outcome))
            .collect();
        failed.sort_by_key(|(name, _)| *name);
        failed
    }

    pub(crate) fn record(&mut self, name: String, outcome: HostOutcome, response: Option<HostResponse>) {
        if let Some(response) = response {
            self.responses.push(response);
        }
        self.outcomes.insert(name, outcome);
    }
}
