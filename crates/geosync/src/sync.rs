use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError};
use crate::store;

/// Errors from container file sync and reload signaling.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mkdir -p {dir} failed: {reason}")]
    Mkdir { dir: String, reason: String },

    #[error("process '{0}' is not running")]
    ProcessNotFound(String),

    #[error("failed to signal '{process}': {reason}")]
    Signal { process: String, reason: String },
}

/// Compare the local copy of `filename` against `dir/filename` inside the
/// container and upload it when the sizes differ.
///
/// The file is packaged as a single-entry tar archive so the runtime can
/// extract it into the target directory in one step, avoiding partial-write
/// visibility inside the container. Returns whether an upload happened.
pub async fn sync_file(
    runtime: &dyn ContainerRuntime,
    container: &ContainerHandle,
    local: &Path,
    dir: &str,
    filename: &str,
) -> Result<bool, SyncError> {
    let local_size = store::file_size(local);
    let container_path = format!("{dir}/{filename}");
    let container_size = runtime.path_size(container, &container_path).await?;

    if container_size == local_size {
        debug!("{filename} in container is up-to-date (size {local_size})");
        return Ok(false);
    }

    info!("copy {filename} to container, sizes: local={local_size} container={container_size}");

    // Temp archive is removed on drop, on every exit path.
    let archive = package_single(local, filename)?;

    let mkdir = runtime.exec(container, &["mkdir", "-p", dir]).await?;
    if !mkdir.success() {
        return Err(SyncError::Mkdir {
            dir: dir.to_owned(),
            reason: mkdir.stderr.trim().to_owned(),
        });
    }

    runtime
        .upload_archive(container, dir, archive.path())
        .await?;

    debug!("copied {filename} to {container_path}");
    Ok(true)
}

/// Package one file into a tar archive preserving only its base name.
fn package_single(local: &Path, filename: &str) -> Result<NamedTempFile, SyncError> {
    let tmp = NamedTempFile::new()?;
    let mut builder = tar::Builder::new(tmp.as_file());
    builder.append_path_with_name(local, filename)?;
    builder.finish()?;
    drop(builder);
    Ok(tmp)
}

/// Ask the named in-container process to terminate gracefully.
///
/// The in-container supervisor is expected to respawn it with the freshly
/// synced files; responsibility here ends at delivering the signal.
pub async fn signal_reload(
    runtime: &dyn ContainerRuntime,
    container: &ContainerHandle,
    process: &str,
) -> Result<(), SyncError> {
    let found = runtime.exec(container, &["pgrep", process]).await?;
    let pid = found.stdout.lines().next().map(str::trim).unwrap_or("");
    if !found.success() || pid.is_empty() {
        return Err(SyncError::ProcessNotFound(process.to_owned()));
    }

    let killed = runtime.exec(container, &["kill", pid]).await?;
    if !killed.success() {
        return Err(SyncError::Signal {
            process: process.to_owned(),
            reason: killed.stderr.trim().to_owned(),
        });
    }

    info!("signaled {process} (pid {pid}) to restart");
    Ok(())
}
