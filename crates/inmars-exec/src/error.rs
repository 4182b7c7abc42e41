//! Error types for inmars-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during remote execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connecting took longer than the configured timeout
    #[error("connection timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Channel or stream I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Errors raised while resolving a credential profile
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no SSH username configured")]
    NoUsername,

    #[error("bad key: {0}")]
    BadKey(String),

    #[error("no SSH authentication methods configured")]
    NoAuthMethods,

    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding in {0}")]
    InvalidBase64(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = ExecError::Timeout {
            timeout: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "connection timed out after 200ms");
    }

    #[test]
    fn test_credential_messages() {
        assert_eq!(
            CredentialError::EnvNotSet("INMARS_KEY".into()).to_string(),
            "environment variable INMARS_KEY not set"
        );
        assert_eq!(
            CredentialError::NoUsername.to_string(),
            "no SSH username configured"
        );
    }
}
