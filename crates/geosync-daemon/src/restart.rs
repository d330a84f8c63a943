use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use geosync::ContainerRuntime;
use geosync_daemon::logging;
use geosync_docker::DockerCli;

/// One-shot utility: restart every running container carrying a label.
///
/// Meant to be invoked after an out-of-band change (renewed certificates,
/// replaced config) that the labeled containers only pick up on restart.
#[derive(Debug, Parser)]
#[command(name = "geosync-restart")]
#[command(about = "Restart all running containers carrying a label")]
struct Cli {
    /// Label identifying the containers to restart
    label: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let docker = DockerCli::new();
    docker
        .ping()
        .await
        .context("cannot connect to the container runtime")?;

    info!("restarting containers with label '{}'", cli.label);
    let containers = docker.list_labeled(&cli.label).await?;
    for container in &containers {
        info!("restart container {}", container.name);
        docker.restart(container).await?;
    }

    if containers.is_empty() {
        warn!("no containers matched label '{}', is that expected?", cli.label);
    } else {
        info!("restarted {} container(s)", containers.len());
    }
    Ok(())
}
