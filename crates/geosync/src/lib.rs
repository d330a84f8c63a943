pub mod config;
pub mod cycle;
pub mod remote;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use config::{GeoFileSpec, SyncConfig};
pub use cycle::{CycleOutcome, FileFailure, Phase};
pub use remote::{FetchError, Remote};
pub use runtime::{ContainerHandle, ContainerRuntime, ExecOutput, RuntimeError};
pub use scheduler::{Scheduler, Shutdown, ShutdownHandle, StartupDelay, shutdown_channel};
pub use store::LocalStore;
pub use sync::SyncError;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
