use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::{GeoFileSpec, SyncConfig};
use crate::remote::{FetchError, Remote};
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::store::LocalStore;
use crate::sync;

/// Which phase of a cycle a per-file failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Upload,
    Reload,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Upload => write!(f, "upload"),
            Self::Reload => write!(f, "reload"),
        }
    }
}

/// A failure attributed to exactly one file (or the reload action).
#[derive(Debug)]
pub struct FileFailure {
    pub filename: String,
    pub phase: Phase,
    pub error: String,
}

/// What one cycle did. Produced once per cycle, consumed for logging only.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub downloaded: usize,
    pub uploaded: usize,
    pub reload_triggered: bool,
    pub failures: Vec<FileFailure>,
}

impl CycleOutcome {
    /// True when the container received at least one file this cycle.
    pub fn updated(&self) -> bool {
        self.uploaded > 0
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decide whether `spec` needs a fresh download: locally absent, or the
/// local size differs from the currently probed remote size.
///
/// Size comparison doubles as the retry mechanism: a truncated or failed
/// download leaves a mismatch that the next cycle repairs, with no retry
/// bookkeeping anywhere.
pub async fn need_download(
    remote: &dyn Remote,
    store: &LocalStore,
    spec: &GeoFileSpec,
) -> Result<bool, FetchError> {
    if !store.contains(&spec.filename) {
        info!("{} has not been downloaded yet", spec.filename);
        return Ok(true);
    }

    let latest = remote.remote_size(&spec.url).await?;
    let existing = store.size_of(&spec.filename);
    if latest != existing {
        info!(
            "{} size has changed, '{latest}' != '{existing}'",
            spec.filename
        );
        return Ok(true);
    }
    Ok(false)
}

async fn refresh_file(
    remote: &dyn Remote,
    store: &LocalStore,
    spec: &GeoFileSpec,
) -> Result<bool, FetchError> {
    if !need_download(remote, store, spec).await? {
        return Ok(false);
    }
    let dest = store.path_for(&spec.filename);
    info!("downloading {} from {}", spec.filename, spec.url);
    let written = remote.download(&spec.url, &dest).await?;
    debug!("downloaded {} ({written} bytes)", spec.filename);
    Ok(true)
}

/// Run one synchronization cycle across all configured files, in order.
///
/// Download and upload decisions are independent: every file is compared
/// against the container even when nothing new was fetched, so a recreated
/// container that lost its copies gets re-synced. Per-file failures are
/// recorded and the remaining files still processed; only a failed
/// container resolution aborts the sync phase as a whole. The reload signal
/// fires at most once, and only after at least one successful upload.
///
/// A file whose download failed this cycle is excluded from the container
/// sync: whatever the cache holds for it is not trusted, so the container
/// keeps its current copy until a later cycle downloads a good one.
pub async fn run_cycle(
    config: &SyncConfig,
    remote: &dyn Remote,
    runtime: &dyn ContainerRuntime,
    store: &LocalStore,
) -> Result<CycleOutcome, RuntimeError> {
    let mut outcome = CycleOutcome::default();
    let mut failed_downloads: HashSet<&str> = HashSet::new();

    for spec in &config.files {
        match refresh_file(remote, store, spec).await {
            Ok(true) => outcome.downloaded += 1,
            Ok(false) => info!("{} is up-to-date", spec.filename),
            Err(e) => {
                warn!("download of {} failed: {e}", spec.filename);
                failed_downloads.insert(spec.filename.as_str());
                outcome.failures.push(FileFailure {
                    filename: spec.filename.clone(),
                    phase: Phase::Download,
                    error: e.to_string(),
                });
            }
        }
    }

    let container = runtime.resolve_by_name(&config.container_name).await?;

    for spec in &config.files {
        if failed_downloads.contains(spec.filename.as_str()) {
            debug!(
                "{} failed to download, keeping the container copy",
                spec.filename
            );
            continue;
        }
        let local = store.path_for(&spec.filename);
        if !local.exists() {
            debug!("{} not in local cache, skipping container sync", spec.filename);
            continue;
        }
        match sync::sync_file(runtime, &container, &local, &config.container_dir, &spec.filename)
            .await
        {
            Ok(true) => outcome.uploaded += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("copy of {} to container failed: {e}", spec.filename);
                outcome.failures.push(FileFailure {
                    filename: spec.filename.clone(),
                    phase: Phase::Upload,
                    error: e.to_string(),
                });
            }
        }
    }

    if outcome.updated() {
        match sync::signal_reload(runtime, &container, &config.process_name).await {
            Ok(()) => outcome.reload_triggered = true,
            Err(e) => {
                warn!("reload signal failed: {e}");
                outcome.failures.push(FileFailure {
                    filename: config.process_name.clone(),
                    phase: Phase::Reload,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(outcome)
}
