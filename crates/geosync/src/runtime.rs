use std::path::Path;

/// Reference to a running container, owned by the runtime.
///
/// Never cached across cycles: re-resolved at the start of every cycle so
/// container recreation and restarts are tolerated transparently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Captured result of a command executed inside a container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors surfaced by a container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container '{0}' not found")]
    NotFound(String),

    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("exec in {container} failed: {reason}")]
    Exec { container: String, reason: String },

    #[error("upload to {container} failed: {reason}")]
    Upload { container: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability set over the container runtime.
///
/// The production implementation drives the real runtime; tests substitute
/// an in-memory fake exposing the same surface.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Cheap connectivity check; returns a runtime version string.
    async fn ping(&self) -> Result<String, RuntimeError>;

    /// Find the single running container matching `name`.
    ///
    /// Zero matches is [`RuntimeError::NotFound`]; there is deliberately no
    /// fallback to any other container.
    async fn resolve_by_name(&self, name: &str) -> Result<ContainerHandle, RuntimeError>;

    /// Execute a command inside the container and capture its output.
    async fn exec(
        &self,
        container: &ContainerHandle,
        argv: &[&str],
    ) -> Result<ExecOutput, RuntimeError>;

    /// Byte size of `path` inside the container; a missing path is 0, only
    /// transport problems are errors.
    async fn path_size(&self, container: &ContainerHandle, path: &str)
    -> Result<u64, RuntimeError>;

    /// Extract a tar archive into `dir` inside the container. Succeeds only
    /// if the runtime confirms the write.
    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dir: &str,
        archive: &Path,
    ) -> Result<(), RuntimeError>;

    /// All running containers carrying `label`.
    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerHandle>, RuntimeError>;

    /// Restart a container.
    async fn restart(&self, container: &ContainerHandle) -> Result<(), RuntimeError>;
}
