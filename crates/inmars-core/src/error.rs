//! Core error types for inmars-core

use inmars_exec::{CredentialError, ExecError};
use thiserror::Error;

/// Errors that can occur while orchestrating a run
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Credential profile could not be built
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    /// Local script could not be read
    #[error("could not read script {path}: {reason}")]
    ReadScript {
        /// Local path
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// Connecting to a host failed
    #[error("{host}: connection failed: {source}")]
    Connect {
        /// Host identifier
        host: String,
        /// Transport error
        source: ExecError,
    },

    /// Streaming the script to a host failed
    #[error("{host}: transfer failed: {source}")]
    Transfer {
        /// Host identifier
        host: String,
        /// Transport error
        source: ExecError,
    },

    /// A remote command exited with a non-zero status
    #[error("{host}: remote command exited with status {status}: {stderr}")]
    RemoteCommand {
        /// Host identifier
        host: String,
        /// Exit status
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// Script name cannot be placed in the staging directory
    #[error("invalid script name: {0:?}")]
    InvalidScriptName(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
