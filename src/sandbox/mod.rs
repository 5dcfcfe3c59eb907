//! Sandboxes: declarative specs, running handles and the runtimes behind them.
//!
//! A [`Runtime`] is the container/process backend. Two ship with the crate:
//! [`DockerRuntime`] drives a Docker-compatible CLI and [`ProcessRuntime`]
//! runs the spec as a host process group.

pub mod docker;
mod handle;
mod logs;
pub mod process;
mod spec;

use crate::error::Result;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

pub use docker::DockerRuntime;
pub use handle::{SandboxHandle, SandboxState, LOG_TAIL_LINES};
pub use logs::{LogEvent, LogStream};
pub use process::ProcessRuntime;
pub use spec::{Mount, NetworkMode, SandboxSpec};

/// Runtime-assigned identity of a started sandbox (container id, pid, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Runtime: Send + Sync {
    fn name(&self) -> &str;

    /// Launch the sandbox. Returns once the runtime accepted it, not once it is ready.
    fn start(&self, spec: &SandboxSpec) -> Result<SandboxId>;

    /// Release everything the sandbox holds. Unknown or already removed ids are not an error.
    fn stop(&self, id: &SandboxId) -> Result<()>;

    fn is_running(&self, id: &SandboxId) -> Result<bool>;

    fn resolve_port(&self, id: &SandboxId, container_port: u16) -> Result<SocketAddr>;

    /// Merged stdout/stderr lines. Callable once per sandbox.
    fn stream_logs(&self, id: &SandboxId) -> Result<LogStream>;

    /// Wait for the sandbox to exit. `Ok(None)` when it is still running at the timeout.
    fn wait_exit(&self, id: &SandboxId, timeout: Duration) -> Result<Option<i32>>;
}
