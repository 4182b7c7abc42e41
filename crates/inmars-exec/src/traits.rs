//! Transport traits
//!
//! A [`Connector`] opens one [`RemoteExecutor`] per host. The orchestration layer
//! only talks to these traits, so tests can swap SSH for in-memory mocks.

use async_trait::async_trait;

use crate::credentials::CredentialProfile;
use crate::error::ExecError;
use crate::push::UploadUnit;
use crate::result::{CommandResult, Endpoint};

/// An established, authenticated connection to one host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command, capturing stdout and stderr separately
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Start the push receiver under `base_dir` and stream `unit` into it
    ///
    /// The returned result carries the receiver's exit status; a non-zero
    /// status is not turned into an error here.
    async fn push(&self, base_dir: &str, unit: &UploadUnit) -> Result<CommandResult, ExecError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), ExecError>;

    /// Whether the underlying transport is still open
    fn is_connected(&self) -> bool;

    fn executor_type(&self) -> &'static str;
}

/// Opens connections to hosts
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate, bounded by the profile's timeout
    async fn connect(
        &self,
        endpoint: &Endpoint,
        profile: &CredentialProfile,
    ) -> Result<Box<dyn RemoteExecutor>, ExecError>;
}
