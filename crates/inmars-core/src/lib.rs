//! inmars-core: Remote orchestration
//!
//! Uploads a finished script to a set of hosts, runs it there and collects the
//! JSON object each host prints. Per-host failures are isolated: they are
//! logged, recorded as the host's outcome and never abort the run.

pub mod config;
pub mod error;
pub mod execute;
pub mod host;
pub mod orchestrator;
pub mod response;
pub mod upload;

pub use config::{CoreSettings, HostConfig, RunConfig};
pub use error::CoreError;
pub use execute::remote_invocation;
pub use host::{HostMap, HostRecord};
pub use orchestrator::Orchestrator;
pub use response::{ExecutionReport, HostOutcome, HostRef, HostResponse};
