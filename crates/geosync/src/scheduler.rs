use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::cycle;
use crate::remote::Remote;
use crate::runtime::ContainerRuntime;
use crate::store::LocalStore;

/// Create a linked shutdown trigger/observer pair.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// Requests shutdown. Triggering is idempotent.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observes a single-shot shutdown request at wait boundaries.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait up to `duration`, waking immediately on shutdown.
    ///
    /// Returns true when shutdown was requested before the full duration
    /// elapsed. A dropped [`ShutdownHandle`] counts as a request, so a wait
    /// can never become uninterruptible.
    pub async fn interrupted_within(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = sleep(duration) => false,
            _ = self.rx.changed() => true,
        }
    }
}

/// Pre-first-cycle delay policy, from the `--delay` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupDelay {
    /// Run immediately.
    None,
    /// Wait a fixed number of seconds.
    Fixed(u64),
    /// Wait a uniformly random 10-60 seconds to spread upstream load
    /// when several deployments start at once.
    Random,
}

impl StartupDelay {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed(secs) => Some(Duration::from_secs(*secs)),
            Self::Random => Some(Duration::from_secs(rand::rng().random_range(10..=60))),
        }
    }
}

/// Drives the cycle engine: one cycle at a time, a jittered interruptible
/// wait between cycles, until shutdown is requested.
pub struct Scheduler<'a> {
    config: &'a SyncConfig,
    remote: &'a dyn Remote,
    runtime: &'a dyn ContainerRuntime,
    store: &'a LocalStore,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        config: &'a SyncConfig,
        remote: &'a dyn Remote,
        runtime: &'a dyn ContainerRuntime,
        store: &'a LocalStore,
    ) -> Self {
        Self {
            config,
            remote,
            runtime,
            store,
        }
    }

    /// Next inter-cycle delay: base interval plus bounded uniform jitter.
    fn next_delay(&self) -> Duration {
        let jitter = rand::rng().random_range(0..=self.config.max_jitter_secs);
        let total = self.config.interval() + Duration::from_secs(jitter);
        debug!(
            "computed next update delay: base={}s + jitter={jitter}s => {}s",
            self.config.interval_secs,
            total.as_secs()
        );
        total
    }

    /// Run cycles until shutdown. Errors are caught at the cycle boundary
    /// and logged; nothing inside a cycle can end the loop.
    ///
    /// Shutdown is observed during the startup delay and during every
    /// inter-cycle wait. A cycle already in flight is not preempted; the
    /// request takes effect at the next wait boundary.
    pub async fn run(&self, delay: StartupDelay, shutdown: &mut Shutdown) {
        if let Some(d) = delay.duration() {
            info!("begin geofiles update in {} seconds", d.as_secs());
            if shutdown.interrupted_within(d).await {
                info!("shutdown requested during startup delay");
                return;
            }
        }

        loop {
            let started = Instant::now();
            match cycle::run_cycle(self.config, self.remote, self.runtime, self.store).await {
                Ok(outcome) => {
                    let elapsed = started.elapsed().as_secs();
                    if !outcome.is_clean() {
                        info!(
                            "geofiles update finished with {} failure(s) in {elapsed} sec",
                            outcome.failures.len()
                        );
                    } else if outcome.updated() {
                        info!(
                            "geofiles update OK in {elapsed} sec ({} downloaded, {} copied)",
                            outcome.downloaded, outcome.uploaded
                        );
                    } else {
                        info!("geofiles update OK in {elapsed} sec (no changes)");
                    }
                }
                Err(e) => error!("error during update: {e}"),
            }

            let delay = self.next_delay();
            info!("next update in {} hours", delay.as_secs() / 3600);
            if shutdown.interrupted_within(delay).await {
                info!("shutdown requested, stopping");
                return;
            }
        }
    }
}
