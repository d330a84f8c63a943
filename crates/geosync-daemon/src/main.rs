use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use geosync::{ContainerRuntime, LocalStore, Scheduler, StartupDelay, SyncConfig, shutdown_channel};
use geosync_daemon::logging;
use geosync_docker::DockerCli;
use geosync_remote::HttpRemote;

#[derive(Debug, Parser)]
#[command(name = "geosyncd")]
#[command(about = "Keep geo database files in sync with upstream releases")]
struct Cli {
    /// Sleep before the first update; give a number of seconds, or no
    /// value for a random 10-60s
    #[arg(
        long,
        value_name = "SECONDS",
        num_args = 0..=1,
        default_missing_value = "random",
        allow_hyphen_values = true,
        value_parser = parse_delay
    )]
    delay: Option<StartupDelay>,
}

fn parse_delay(value: &str) -> Result<StartupDelay, String> {
    if value == "random" {
        return Ok(StartupDelay::Random);
    }
    let secs: i64 = value
        .parse()
        .map_err(|_| format!("invalid delay '{value}', expected seconds"))?;
    // negative values clamp to "run immediately"
    Ok(StartupDelay::Fixed(secs.max(0) as u64))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    info!("START");

    let config = SyncConfig::from_env();
    let store = LocalStore::open(&config.cache_dir).with_context(|| {
        format!("failed to create cache directory: {}", config.cache_dir.display())
    })?;

    // Unrecoverable precondition: without the runtime there is nothing to
    // sync into, so exit instead of entering the loop.
    let docker = DockerCli::new();
    let version = docker
        .ping()
        .await
        .context("cannot connect to the container runtime")?;
    info!("connected to container runtime (server {version})");

    let remote = HttpRemote::new(config.probe_timeout(), config.download_timeout())
        .context("failed to build HTTP client")?;

    let (handle, mut shutdown) = shutdown_channel();
    tokio::spawn(async move {
        wait_for_termination().await;
        handle.trigger();
    });

    let scheduler = Scheduler::new(&config, &remote, &docker, &store);
    scheduler
        .run(cli.delay.unwrap_or(StartupDelay::None), &mut shutdown)
        .await;

    info!("clean shutdown");
    Ok(())
}

async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = term.recv() => info!("received SIGTERM"),
    }
}
