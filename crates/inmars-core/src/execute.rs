//! Execute phase: run the staged script and decode its answer

use inmars_exec::push::{quote_remote_path, staged_path};
use inmars_exec::{Connector, CredentialProfile};
use tracing::{debug, error, info, instrument, warn};

use crate::config::CoreSettings;
use crate::host::HostRecord;
use crate::response::{HostOutcome, HostRef, HostResponse};

/// Flag that keeps the remote script quiet
pub const DEBUG_SUPPRESS_FLAG: &str = "-d";

/// Shell used to run the staged script
pub const INTERPRETER: &str = "/bin/bash";

/// Command line that runs `script` from the staging directory
///
/// `special_debug` drops the debug-suppression flag.
#[must_use]
pub fn remote_invocation(base_dir: &str, script: &str, special_debug: bool) -> String {
    let path = staged_path(base_dir, script);
    let mut cmd = format!("{INTERPRETER} {}", quote_remote_path(&path));
    if !special_debug {
        cmd.push(' ');
        cmd.push_str(DEBUG_SUPPRESS_FLAG);
    }
    cmd
}

/// Run the staged script on one host
///
/// Failures never disable the host; they are logged and reported as the
/// host's outcome.
#[instrument(skip_all, fields(host = %host.name()))]
pub async fn execute_on_host(
    host: &mut HostRecord,
    connector: &dyn Connector,
    profile: &CredentialProfile,
    settings: &CoreSettings,
    script: &str,
) -> (HostOutcome, Option<HostResponse>) {
    if host.is_disabled() {
        return (HostOutcome::Disabled, None);
    }

    let host_ref = HostRef::from(&*host);
    let name = host_ref.name.clone();

    let connection = match host.ensure_connected(connector, profile).await {
        Ok(connection) => connection,
        Err(e) => {
            error!(host = %name, error = %e, "could not connect, skipping host");
            return (
                HostOutcome::ConnectFailed {
                    error: e.to_string(),
                },
                None,
            );
        }
    };

    let cmd = remote_invocation(&settings.remote_base_dir, script, settings.special_debug);
    debug!(host = %name, command = %cmd, "running script");

    let result = match connection.run(&cmd).await {
        Ok(result) => result,
        Err(e) => {
            error!(host = %name, error = %e, "script could not be run");
            return (
                HostOutcome::TransportFailed {
                    error: e.to_string(),
                },
                None,
            );
        }
    };

    if !result.success() {
        error!(
            host = %name,
            status = result.status,
            stderr = %result.stderr,
            "script failed"
        );
        return (
            HostOutcome::ScriptFailed {
                status: result.status,
                stderr: result.stderr,
            },
            None,
        );
    }

    if !result.stderr.is_empty() {
        warn!(host = %name, stderr = %result.stderr.trim_end(), "script wrote to stderr");
    }

    if settings.debug {
        info!(host = %name, stdout = %result.stdout.trim_end(), "script output");
    }

    match HostResponse::decode(host_ref, &result.stdout) {
        Ok(response) => (HostOutcome::Responded, Some(response)),
        Err(e) => {
            error!(host = %name, error = %e, "script output is not a JSON object");
            (
                HostOutcome::InvalidResponse {
                    error: e.to_string(),
                },
                None,
            )
        }
    }
}

/// Reduce a script path to the name it was staged under
///
/// Returns `None` if nothing usable is left.
#[must_use]
pub fn staged_name(script: &str) -> Option<&str> {
    let name = script.rsplit('/').next().unwrap_or(script);
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_suppresses_debug_by_default() {
        assert_eq!(
            remote_invocation("/home/user", "run.sh", false),
            "/bin/bash /home/user/.saturn/run.sh -d"
        );
    }

    #[test]
    fn test_invocation_special_debug() {
        assert_eq!(
            remote_invocation("/home/user", "run.sh", true),
            "/bin/bash /home/user/.saturn/run.sh"
        );
    }

    #[test]
    fn test_invocation_quotes_base_dir() {
        assert_eq!(
            remote_invocation("$HOME", "run.sh", false),
            "/bin/bash $HOME/.saturn/run.sh -d"
        );
        assert_eq!(
            remote_invocation("/srv/fleet data", "run.sh", false),
            "/bin/bash '/srv/fleet data/.saturn/run.sh' -d"
        );
    }

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name("/tmp/inmars-123.sh"), Some("inmars-123.sh"));
        assert_eq!(staged_name("run.sh"), Some("run.sh"));
        assert_eq!(staged_name("/tmp/"), None);
        assert_eq!(staged_name(".."), None);
        assert_eq!(staged_name(""), None);
    }
}
