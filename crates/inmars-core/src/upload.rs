//! Upload phase: place the script in every host's staging directory

use inmars_exec::{Connector, CredentialProfile, UploadUnit};
use tracing::{debug, instrument, warn};

use crate::error::CoreError;
use crate::host::HostRecord;

/// Push `unit` to one host
///
/// Connects on demand. Only the receiver's exit status decides success.
///
/// # Errors
/// Returns the per-host error; the caller decides what it means for the host
#[instrument(skip_all, fields(host = %host.name()))]
pub async fn upload_to_host(
    host: &mut HostRecord,
    connector: &dyn Connector,
    profile: &CredentialProfile,
    base_dir: &str,
    unit: &UploadUnit,
) -> Result<(), CoreError> {
    let name = host.name().to_string();
    let connection = host.ensure_connected(connector, profile).await?;

    let result = connection
        .push(base_dir, unit)
        .await
        .map_err(|source| CoreError::Transfer {
            host: name.clone(),
            source,
        })?;

    if !result.success() {
        return Err(CoreError::RemoteCommand {
            host: name,
            status: result.status,
            stderr: result.stderr.trim().to_string(),
        });
    }

    debug!(host = %name, file = %unit.name(), duration = ?result.duration, "script uploaded");
    Ok(())
}

/// Upload to one host, disabling it on any failure
///
/// Returns whether the host is still enabled afterwards.
pub async fn upload_or_disable(
    host: &mut HostRecord,
    connector: &dyn Connector,
    profile: &CredentialProfile,
    base_dir: &str,
    unit: &UploadUnit,
) -> bool {
    if host.is_disabled() {
        return false;
    }

    match upload_to_host(host, connector, profile, base_dir, unit).await {
        Ok(()) => true,
        Err(e) => {
            warn!(host = %host.name(), error = %e, "upload failed, disabling host");
            host.disable();
            false
        }
    }
}
