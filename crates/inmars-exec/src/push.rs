//! Push protocol used to place the script in the remote staging directory
//!
//! The sender speaks the sink side of the `scp -t` record format:
//!
//! ```text
//! D0755 0 .saturn\n
//! C0644 <size> <name>\n
//! <size raw bytes>
//! \0
//! ```
//!
//! Acknowledgement bytes written back by the receiver are never read. The
//! transfer is best-effort: the exit status of the remote `scp` is the only
//! success signal, so this is not a compliant implementation of the protocol.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Hidden directory under the remote base directory that holds uploads
pub const STAGING_DIR: &str = ".saturn";

/// Mode of the staging directory record
pub const STAGING_DIR_MODE: u32 = 0o755;

/// A local file ready to be pushed to every host
///
/// The contents are read once and shared, so each transfer writes from its
/// own position without touching a file handle.
#[derive(Debug, Clone)]
pub struct UploadUnit {
    name: String,
    mode: u32,
    contents: Arc<[u8]>,
}

impl UploadUnit {
    /// Build an upload unit from in-memory contents
    pub fn new(name: impl Into<String>, mode: u32, contents: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mode: mode & 0o777,
            contents: contents.into(),
        }
    }

    /// Read a local file, keeping its base name and permission bits
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read or has no file name
    pub async fn read(path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "script path has no file name")
            })?;
        let metadata = tokio::fs::metadata(path).await?;
        let contents = tokio::fs::read(path).await?;

        Ok(Self::new(name, permission_bits(&metadata), contents))
    }

    /// Base name written on the remote side
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permission bits
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// File size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// File contents
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Directory record, e.g. `D0755 0 .saturn\n`
#[must_use]
pub fn directory_record(mode: u32, name: &str) -> String {
    format!("D{:04o} 0 {name}\n", mode & 0o7777)
}

/// File record, e.g. `C0644 10 x.sh\n`
#[must_use]
pub fn file_record(mode: u32, size: u64, name: &str) -> String {
    format!("C{:04o} {size} {name}\n", mode & 0o7777)
}

/// Remote command that receives the push stream into `base_dir`
#[must_use]
pub fn receive_command(base_dir: &str) -> String {
    format!("scp -rt {}", quote_remote_path(base_dir))
}

/// Quote a remote path for the login shell
///
/// A leading `$HOME` (or `${HOME}`) stays unquoted so the remote shell expands
/// it; the rest is single-quoted unless it only holds safe characters.
#[must_use]
pub fn quote_remote_path(path: &str) -> String {
    for var in ["${HOME}", "$HOME"] {
        if let Some(rest) = path.strip_prefix(var)
            && (rest.is_empty() || rest.starts_with('/'))
        {
            return format!("{var}{}", shell_quote(rest));
        }
    }
    shell_quote(path)
}

fn shell_quote(s: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "/._-+,:=@%".contains(c);
    if s.is_empty() || s.chars().all(safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Remote path of an uploaded file
#[must_use]
pub fn staged_path(base_dir: &str, name: &str) -> String {
    format!("{}/{STAGING_DIR}/{name}", base_dir.trim_end_matches('/'))
}

/// Write the complete push stream for `unit` and flush it
///
/// Returns the number of bytes written.
///
/// # Errors
/// Returns the first write error from `writer`
pub async fn write_push_stream<W>(writer: &mut W, unit: &UploadUnit) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let dir = directory_record(STAGING_DIR_MODE, STAGING_DIR);
    let file = file_record(unit.mode(), unit.size(), unit.name());

    writer.write_all(dir.as_bytes()).await?;
    writer.write_all(file.as_bytes()).await?;
    writer.write_all(unit.contents()).await?;
    writer.write_all(&[0]).await?;
    writer.flush().await?;

    Ok((dir.len() + file.len()) as u64 + unit.size() + 1)
}
