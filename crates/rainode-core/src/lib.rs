//! Instance registry, lifecycle management, and subprocess supervision.
//!
//! This crate ties the bridge together: each registered measure instance
//! owns a generated wrapper artifact, a persistent interpreter subprocess,
//! and a cache of its last known values. Calls from the host degrade rather
//! than fail: a slow script reports its previous value, a dead process is
//! restarted or replaced by a one-shot run, and a missing script leaves the
//! instance inert.

use std::path::PathBuf;
use std::time::Duration;

mod errors;
mod instance;
mod measure;
mod process;
mod registry;

pub use errors::{BridgeError, Result};
pub use instance::{CachedValues, CancelToken, InstanceId, LifecycleState};
pub use measure::Measure;
pub use process::{run_transient, PersistentProcess, ProcessHandle, SendOutcome};
pub use registry::Registry;

/// Tunable parameters shared by every instance of one registry.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Interpreter binary. Resolved against `PATH` by
    /// [`BridgeSettings::locate_interpreter`].
    pub node_command: PathBuf,
    /// Total time a synchronous call waits for its result line.
    pub command_budget: Duration,
    /// Slice between cancellation checks while waiting.
    pub poll_interval: Duration,
    /// Grace period between closing a subprocess's stdin and force-killing.
    pub kill_grace: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            node_command: PathBuf::from("node"),
            command_budget: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            kill_grace: Duration::from_secs(1),
        }
    }
}

impl BridgeSettings {
    /// Resolve the interpreter binary against `PATH`.
    pub fn locate_interpreter(mut self) -> Result<Self> {
        let found = which::which(&self.node_command)
            .map_err(|_| BridgeError::InterpreterNotFound(self.node_command.display().to_string()))?;
        self.node_command = found;
        Ok(self)
    }
}
