use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use geosync::runtime::{ContainerHandle, ContainerRuntime, ExecOutput, RuntimeError};

/// [`ContainerRuntime`] implementation driving the `docker` CLI.
///
/// Uploads go through `docker cp -`, which extracts a tar stream into the
/// target directory in one runtime-side operation, so a file never becomes
/// visible half-written inside the container. Exec runs as root, matching
/// the stat/mkdir/pgrep/kill commands the sync engine issues.
pub struct DockerCli {
    bin: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific binary instead of `docker` from `PATH`.
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, RuntimeError> {
        debug!("running {} {}", self.bin.display(), args.join(" "));
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RuntimeError::Unavailable(format!("failed to run {}: {e}", self.bin.display()))
            })
    }
}

/// Interpret `stat -c %s` output: `Ok(None)` when the path does not exist,
/// `Err` for any other failure (dead container, unparseable output), so a
/// stopped container is not mistaken for a missing file.
fn parse_stat_output(out: &ExecOutput) -> Result<Option<u64>, String> {
    if !out.success() {
        if out.stderr.contains("No such file or directory") {
            return Ok(None);
        }
        return Err(out.stderr.trim().to_owned());
    }
    out.stdout
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| format!("unparseable stat output: '{}'", out.stdout.trim()))
}

fn parse_ps_line(line: &str) -> Option<ContainerHandle> {
    let (id, name) = line.trim().split_once('\t')?;
    if id.is_empty() {
        return None;
    }
    Some(ContainerHandle {
        id: id.to_owned(),
        name: name.to_owned(),
    })
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<String, RuntimeError> {
        let out = self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await?;
        if !out.status.success() {
            return Err(RuntimeError::Unavailable(
                String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
    }

    async fn resolve_by_name(&self, name: &str) -> Result<ContainerHandle, RuntimeError> {
        let filter = format!("name={name}");
        let out = self
            .run(&["ps", "--filter", &filter, "--format", "{{.ID}}\t{{.Names}}"])
            .await?;
        if !out.status.success() {
            return Err(RuntimeError::Unavailable(
                String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            ));
        }
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .find_map(parse_ps_line)
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        argv: &[&str],
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec", "-u", "root", container.id.as_str()];
        args.extend_from_slice(argv);
        let out = self.run(&args).await?;
        Ok(ExecOutput {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    async fn path_size(
        &self,
        container: &ContainerHandle,
        path: &str,
    ) -> Result<u64, RuntimeError> {
        let out = self.exec(container, &["stat", "-c", "%s", path]).await?;
        match parse_stat_output(&out) {
            Ok(Some(size)) => Ok(size),
            Ok(None) => Ok(0),
            Err(reason) => Err(RuntimeError::Exec {
                container: container.name.clone(),
                reason: format!("stat {path}: {reason}"),
            }),
        }
    }

    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        dir: &str,
        archive: &Path,
    ) -> Result<(), RuntimeError> {
        let dest = format!("{}:{dir}", container.id);
        let mut child = Command::new(&self.bin)
            .args(["cp", "-", &dest])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RuntimeError::Unavailable(format!("failed to run {}: {e}", self.bin.display()))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| RuntimeError::Upload {
            container: container.name.clone(),
            reason: "could not open stdin of docker cp".into(),
        })?;
        let mut file = tokio::fs::File::open(archive).await?;
        tokio::io::copy(&mut file, &mut stdin).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let out = child.wait_with_output().await?;
        if !out.status.success() {
            return Err(RuntimeError::Upload {
                container: container.name.clone(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }
        debug!("uploaded {} to {dest}", archive.display());
        Ok(())
    }

    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let filter = format!("label={label}");
        let out = self
            .run(&["ps", "--filter", &filter, "--format", "{{.ID}}\t{{.Names}}"])
            .await?;
        if !out.status.success() {
            return Err(RuntimeError::Unavailable(
                String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(parse_ps_line)
            .collect())
    }

    async fn restart(&self, container: &ContainerHandle) -> Result<(), RuntimeError> {
        let out = self.run(&["restart", container.id.as_str()]).await?;
        if !out.status.success() {
            return Err(RuntimeError::Exec {
                container: container.name.clone(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_line_splits_id_and_name() {
        let handle = parse_ps_line("a1b2c3\t3x-ui\n").unwrap();
        assert_eq!(handle.id, "a1b2c3");
        assert_eq!(handle.name, "3x-ui");
    }

    #[test]
    fn blank_ps_output_yields_nothing() {
        assert!(parse_ps_line("").is_none());
        assert!(parse_ps_line("\t").is_none());
        assert!(parse_ps_line("no-tab-here").is_none());
    }

    fn exec_output(exit_code: i32, stdout: &str, stderr: &str) -> ExecOutput {
        ExecOutput {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn stat_success_parses_the_size() {
        let out = exec_output(0, "12345\n", "");
        assert_eq!(parse_stat_output(&out), Ok(Some(12345)));
    }

    #[test]
    fn stat_on_missing_path_means_no_file() {
        let out = exec_output(
            1,
            "",
            "stat: can't stat '/app/bin/geoip.dat': No such file or directory\n",
        );
        assert_eq!(parse_stat_output(&out), Ok(None));
    }

    #[test]
    fn stat_against_stopped_container_is_an_error() {
        let out = exec_output(
            1,
            "",
            "Error response from daemon: container a1b2c3 is not running\n",
        );
        assert!(parse_stat_output(&out).is_err());
    }

    #[test]
    fn garbled_stat_output_is_an_error() {
        let out = exec_output(0, "not-a-size\n", "");
        assert!(parse_stat_output(&out).is_err());
    }

    #[tokio::test]
    async fn missing_binary_reports_runtime_unavailable() {
        let docker = DockerCli::with_binary("/nonexistent/docker-binary");
        let result = docker.ping().await;
        assert!(matches!(result, Err(RuntimeError::Unavailable(_))));
    }
}
