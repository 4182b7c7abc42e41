//! inmars-exec: SSH transport and push protocol
//!
//! Provides credential resolution, the transport traits used by the
//! orchestration layer and their russh-backed implementation.

pub mod credentials;
pub mod error;
pub mod push;
pub mod result;
pub mod ssh;
pub mod traits;

pub use credentials::{AuthMethod, CredentialProfile, SshSettings, parse_duration};
pub use error::{CredentialError, ExecError};
pub use push::{STAGING_DIR, UploadUnit};
pub use result::{CommandResult, Endpoint};
pub use ssh::{SshConnector, SshExecutor};
pub use traits::{Connector, RemoteExecutor};
