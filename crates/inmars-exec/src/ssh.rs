//! SSH transport using russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{Channel, ChannelMsg, Disconnect, client};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::credentials::{AuthMethod, CredentialProfile};
use crate::error::ExecError;
use crate::push::{UploadUnit, receive_command, write_push_stream};
use crate::result::{CommandResult, Endpoint};
use crate::traits::{Connector, RemoteExecutor};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// Opens authenticated SSH connections
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        profile: &CredentialProfile,
    ) -> Result<Box<dyn RemoteExecutor>, ExecError> {
        let executor = SshExecutor::connect(endpoint.clone(), profile).await?;
        Ok(Box::new(executor))
    }
}

/// SSH command executor bound to one authenticated session
pub struct SshExecutor {
    endpoint: Endpoint,
    session: client::Handle<SshClientHandler>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Connect and authenticate
    ///
    /// The whole handshake is bounded by the profile's timeout when one is set.
    ///
    /// # Errors
    /// Returns `ExecError::Timeout`, `ExecError::ConnectionFailed` or
    /// `ExecError::AuthenticationFailed`
    #[instrument(skip(profile), fields(host = %endpoint))]
    pub async fn connect(endpoint: Endpoint, profile: &CredentialProfile) -> Result<Self, ExecError> {
        let session = match profile.timeout() {
            Some(limit) => timeout(limit, Self::handshake(&endpoint, profile))
                .await
                .map_err(|_| ExecError::Timeout { timeout: limit })??,
            None => Self::handshake(&endpoint, profile).await?,
        };

        info!(host = %endpoint, "SSH connected and authenticated");

        Ok(Self { endpoint, session })
    }

    async fn handshake(
        endpoint: &Endpoint,
        profile: &CredentialProfile,
    ) -> Result<client::Handle<SshClientHandler>, ExecError> {
        info!(
            host = %endpoint.host,
            port = endpoint.port,
            user = %profile.username(),
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = client::connect(
            config,
            (&endpoint.host[..], endpoint.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        for method in profile.methods() {
            let auth_res = match method {
                AuthMethod::PublicKey(key) => {
                    let hash_alg = session
                        .best_supported_rsa_hash()
                        .await
                        .ok()
                        .flatten()
                        .flatten();
                    session
                        .authenticate_publickey(
                            profile.username(),
                            PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                        )
                        .await
                }
                AuthMethod::Password(password) => {
                    session
                        .authenticate_password(profile.username(), password)
                        .await
                }
            }
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

            if auth_res.success() {
                debug!(host = %endpoint, method = method.kind(), "authenticated");
                return Ok(session);
            }

            debug!(host = %endpoint, method = method.kind(), "authentication method rejected");
        }

        Err(ExecError::AuthenticationFailed(format!(
            "all authentication methods rejected for {}",
            profile.username()
        )))
    }

    async fn open_exec(&self, cmd: &str) -> Result<Channel<client::Msg>, ExecError> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        Ok(channel)
    }
}

/// Drain a channel until the remote side closes it
async fn collect_output(channel: &mut Channel<client::Msg>, start: Instant) -> CommandResult {
    let mut status = -1;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    // stderr
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                status = exit_status.cast_signed();
            }
            Some(ChannelMsg::Close) | None => break,
            _ => {}
        }
    }

    CommandResult {
        status,
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        duration: start.elapsed(),
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.endpoint))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();
        let mut channel = self.open_exec(cmd).await?;
        let result = collect_output(&mut channel, start).await;
        let _ = channel.close().await;

        debug!(
            command = %cmd,
            status = result.status,
            duration = ?result.duration,
            "remote command completed"
        );

        Ok(result)
    }

    #[instrument(skip(self, unit), fields(host = %self.endpoint, file = %unit.name()))]
    async fn push(&self, base_dir: &str, unit: &UploadUnit) -> Result<CommandResult, ExecError> {
        let cmd = receive_command(base_dir);
        debug!(command = %cmd, size = unit.size(), "starting push receiver");

        let start = Instant::now();
        let mut channel = self.open_exec(&cmd).await?;

        // The receiver only exits once it has seen the whole stream, so the
        // stream is written from its own task while this one drains output.
        let mut writer = Box::pin(channel.make_writer());
        let stream = unit.clone();
        let worker = tokio::spawn(async move {
            let written = write_push_stream(&mut writer, &stream).await?;
            writer.shutdown().await?;
            Ok::<u64, std::io::Error>(written)
        });

        let result = collect_output(&mut channel, start).await;

        match worker.await {
            Ok(Ok(written)) => debug!(bytes = written, "push stream written"),
            Ok(Err(e)) => warn!(error = %e, "push stream interrupted"),
            Err(e) => warn!(error = %e, "push worker panicked"),
        }

        debug!(status = result.status, duration = ?result.duration, "push receiver exited");

        Ok(result)
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        info!(host = %self.endpoint, "SSH disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.session.is_closed()
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
