use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::remote::{FetchError, Remote};
use crate::runtime::{ContainerHandle, ContainerRuntime, ExecOutput, RuntimeError};

/// In-memory [`Remote`] for tests. Maps URLs to byte payloads and counts
/// downloads so tests can assert how many transfers actually happened.
#[derive(Default)]
pub struct InMemoryRemote {
    files: HashMap<String, Vec<u8>>,
    unsized_urls: HashSet<String>,
    downloads: Mutex<usize>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), bytes.into());
    }

    /// Serve the payload but answer size probes with [`FetchError::NoSize`],
    /// like an upstream that omits the size indicator.
    pub fn put_without_size(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let url = url.into();
        self.unsized_urls.insert(url.clone());
        self.files.insert(url, bytes.into());
    }

    pub fn downloads(&self) -> usize {
        *self.downloads.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Remote for InMemoryRemote {
    async fn remote_size(&self, url: &str) -> Result<u64, FetchError> {
        if self.unsized_urls.contains(url) {
            return Err(FetchError::NoSize(url.to_owned()));
        }
        self.files
            .get(url)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| FetchError::Status {
                url: url.to_owned(),
                status: 404,
            })
    }

    // Writes before rejecting an empty payload: the trait leaves `dest`
    // unspecified after an error, and this fake models that worst case.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let bytes = self.files.get(url).ok_or_else(|| FetchError::Status {
            url: url.to_owned(),
            status: 404,
        })?;
        std::fs::write(dest, bytes)?;
        *self.downloads.lock().unwrap() += 1;
        if bytes.is_empty() {
            return Err(FetchError::EmptyDownload(url.to_owned()));
        }
        Ok(bytes.len() as u64)
    }
}

/// A container known to the [`InMemoryRuntime`].
#[derive(Debug, Clone, Default)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    /// In-container path -> size in bytes.
    pub files: HashMap<String, u64>,
    pub processes: Vec<(u32, String)>,
}

impl FakeContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_process(mut self, pid: u32, name: impl Into<String>) -> Self {
        self.processes.push((pid, name.into()));
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, size: u64) -> Self {
        self.files.insert(path.into(), size);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<FakeContainer>,
    uploads: Vec<String>,
    kills: Vec<u32>,
    restarts: Vec<String>,
    unavailable: bool,
}

/// In-memory [`ContainerRuntime`] exposing the full capability set without
/// a live container. Uploaded archives are actually extracted (entry names
/// and sizes land in the container's file map), so sync decisions in later
/// cycles see realistic state.
#[derive(Default)]
pub struct InMemoryRuntime {
    state: Mutex<RuntimeState>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, container: FakeContainer) {
        self.state.lock().unwrap().containers.push(container);
    }

    pub fn set_unavailable(&self) {
        self.state.lock().unwrap().unavailable = true;
    }

    /// Size of a path inside a named container, if both exist.
    pub fn file_size(&self, container_name: &str, path: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .iter()
            .find(|c| c.name == container_name)
            .and_then(|c| c.files.get(path).copied())
    }

    /// Container paths written through `upload_archive`, in order.
    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Pids that received a kill, in order.
    pub fn kills(&self) -> Vec<u32> {
        self.state.lock().unwrap().kills.clone()
    }

    /// Container ids restarted, in order.
    pub fn restarts(&self) -> Vec<String> {
        self.state.lock().unwrap().restarts.clone()
    }

    fn ensure_available(state: &RuntimeState) -> Result<(), RuntimeError> {
        if state.unavailable {
            return Err(RuntimeError::Unavailable("fake runtime is down".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn ping(&self) -> Result<String, RuntimeError> {
        let state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        Ok("fake-runtime/1.0".into())
    }

    async fn resolve_by_name(&self, name: &str) -> Result<ContainerHandle, RuntimeError> {
        let state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        state
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(FakeContainer::handle)
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        argv: &[&str],
    ) -> Result<ExecOutput, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        let target = state
            .containers
            .iter_mut()
            .find(|c| c.id == container.id)
            .ok_or_else(|| RuntimeError::NotFound(container.name.clone()))?;

        let mut killed = None;
        let output = match argv {
            ["mkdir", "-p", _dir] => ExecOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
            ["pgrep", name] => match target.processes.iter().find(|(_, p)| p == name) {
                Some((pid, _)) => ExecOutput {
                    exit_code: 0,
                    stdout: format!("{pid}\n"),
                    stderr: String::new(),
                },
                None => ExecOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: String::new(),
                },
            },
            ["kill", pid] => {
                let pid: u32 = pid.parse().unwrap_or(0);
                if let Some(idx) = target.processes.iter().position(|(p, _)| *p == pid) {
                    target.processes.remove(idx);
                    killed = Some(pid);
                    ExecOutput {
                        exit_code: 0,
                        stdout: String::new(),
                        stderr: String::new(),
                    }
                } else {
                    ExecOutput {
                        exit_code: 1,
                        stdout: String::new(),
                        stderr: format!("kill: no such process: {pid}\n"),
                    }
                }
            }
            other => ExecOutput {
                exit_code: 127,
                stdout: String::new(),
                stderr: format!("unsupported command: {other:?}\n"),
            },
        };
        if let Some(pid) = killed {
            state.kills.push(pid);
        }
        Ok(output)
    }

    async fn path_size(
        &self,
        container: &ContainerHandle,
        path: &str,
    ) -> Result<u64, RuntimeError> {
        let state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        let target = state
            .containers
            .iter()
            .find(|c| c.id == container.id)
            .ok_or_else(|| RuntimeError::NotFound(container.name.clone()))?;
        Ok(target.files.get(path).copied().unwrap_or(0))
    }

    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dir: &str,
        archive: &Path,
    ) -> Result<(), RuntimeError> {
        let file = std::fs::File::open(archive)?;
        let mut reader = tar::Archive::new(file);
        let mut extracted = Vec::new();
        for entry in reader.entries()? {
            let entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            extracted.push((format!("{dir}/{name}"), entry.header().size()?));
        }

        let mut state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        let mut written = Vec::new();
        {
            let target = state
                .containers
                .iter_mut()
                .find(|c| c.id == container.id)
                .ok_or_else(|| RuntimeError::NotFound(container.name.clone()))?;
            for (path, size) in extracted {
                target.files.insert(path.clone(), size);
                written.push(path);
            }
        }
        state.uploads.extend(written);
        Ok(())
    }

    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        Ok(state
            .containers
            .iter()
            .filter(|c| c.labels.iter().any(|l| l == label))
            .map(FakeContainer::handle)
            .collect())
    }

    async fn restart(&self, container: &ContainerHandle) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_available(&state)?;
        state.restarts.push(container.id.clone());
        Ok(())
    }
}
