use super::{LogEvent, LogStream, NetworkMode, Runtime, SandboxId, SandboxSpec};
use crate::error::{HarnessError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Number of log lines kept per handle for failure reports.
pub const LOG_TAIL_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Running,
    Ready,
    Failed,
    Stopped,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxState::Created => write!(f, "created"),
            SandboxState::Running => write!(f, "running"),
            SandboxState::Ready => write!(f, "ready"),
            SandboxState::Failed => write!(f, "failed"),
            SandboxState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A sandbox owned by the caller. Dropping a started handle stops it.
pub struct SandboxHandle {
    runtime: Arc<dyn Runtime>,
    spec: SandboxSpec,
    id: Option<SandboxId>,
    state: SandboxState,
    logs: Option<LogStream>,
    tail: VecDeque<String>,
}

impl SandboxHandle {
    pub fn new(runtime: Arc<dyn Runtime>, spec: SandboxSpec) -> Self {
        Self {
            runtime,
            spec,
            id: None,
            state: SandboxState::Created,
            logs: None,
            tail: VecDeque::with_capacity(LOG_TAIL_LINES),
        }
    }

    /// Create, start and wait for readiness. The sandbox is stopped again if any step fails.
    pub fn launch(runtime: Arc<dyn Runtime>, spec: SandboxSpec) -> Result<Self> {
        let mut handle = Self::new(runtime, spec);
        handle.start()?;
        handle.wait_ready()?;
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &SandboxSpec {
        &self.spec
    }

    pub fn id(&self) -> Option<&SandboxId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != SandboxState::Created {
            return Err(HarnessError::launch(
                self.name(),
                format!("cannot start a sandbox that is {}", self.state),
            ));
        }

        self.spec.validate()?;
        match &self.spec.network {
            NetworkMode::Default => {}
            NetworkMode::ShareWith(target) => {
                if !self.runtime.is_running(target)? {
                    return Err(HarnessError::launch(
                        self.name(),
                        format!("network target {} is not running", target),
                    ));
                }
            }
            NetworkMode::ShareWithUnstarted(target) => {
                return Err(HarnessError::launch(
                    self.name(),
                    format!("network target '{}' was never started", target),
                ));
            }
        }

        tracing::info!(
            sandbox = self.name(),
            image = %self.spec.image,
            runtime = self.runtime.name(),
            "starting sandbox"
        );
        let id = self.runtime.start(&self.spec)?;
        tracing::debug!(sandbox = self.name(), %id, "sandbox started");
        self.id = Some(id.clone());
        self.state = SandboxState::Running;

        match self.runtime.stream_logs(&id) {
            Ok(stream) => {
                self.logs = Some(stream);
                Ok(())
            }
            Err(e) => {
                if let Err(stop_err) = self.stop() {
                    tracing::warn!(sandbox = self.name(), error = %stop_err, "failed to stop sandbox");
                }
                Err(e)
            }
        }
    }

    /// Wait for the spec's readiness strategy and record the outcome.
    pub fn wait_ready(&mut self) -> Result<()> {
        let readiness = self.spec.readiness.clone();
        match readiness.wait(self) {
            Ok(()) => {
                self.state = SandboxState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = SandboxState::Failed;
                Err(e)
            }
        }
    }

    /// Release the sandbox. Safe to call any number of times.
    pub fn stop(&mut self) -> Result<()> {
        if matches!(self.state, SandboxState::Created | SandboxState::Stopped) {
            return Ok(());
        }
        self.state = SandboxState::Stopped;
        self.pump_logs();

        let Some(id) = self.id.clone() else {
            return Ok(());
        };
        tracing::info!(sandbox = self.name(), %id, "stopping sandbox");
        self.runtime.stop(&id)
    }

    /// Current liveness as seen by the runtime.
    pub fn is_running(&self) -> bool {
        match (&self.id, self.state) {
            (_, SandboxState::Created | SandboxState::Stopped) | (None, _) => false,
            (Some(id), _) => self.runtime.is_running(id).unwrap_or_else(|e| {
                tracing::warn!(sandbox = self.name(), error = %e, "liveness query failed");
                false
            }),
        }
    }

    pub fn resolve_port(&self, container_port: u16) -> Result<SocketAddr> {
        let id = self.started_id()?;
        self.runtime.resolve_port(id, container_port)
    }

    pub fn wait_exit(&mut self, timeout: Duration) -> Result<Option<i32>> {
        let id = self.started_id()?.clone();
        let status = self.runtime.wait_exit(&id, timeout)?;
        self.pump_logs();
        Ok(status)
    }

    /// Next line from the sandbox's log stream, recorded in the tail.
    pub fn next_log_line(&mut self, timeout: Duration) -> LogEvent {
        let event = match self.logs.as_mut() {
            Some(stream) => stream.next_line(timeout),
            None => LogEvent::Closed,
        };
        if let LogEvent::Line(line) = &event {
            self.record(line.clone());
        }
        event
    }

    /// Move every line that already arrived into the tail.
    pub fn pump_logs(&mut self) {
        let mut drained = Vec::new();
        if let Some(stream) = self.logs.as_mut() {
            while let LogEvent::Line(line) = stream.try_next_line() {
                drained.push(line);
            }
        }
        for line in drained {
            self.record(line);
        }
    }

    /// The last [`LOG_TAIL_LINES`] lines seen so far.
    pub fn log_tail(&mut self) -> Vec<String> {
        self.pump_logs();
        self.tail.iter().cloned().collect()
    }

    fn record(&mut self, line: String) {
        tracing::debug!(sandbox = %self.spec.name, "{}", line);
        if self.tail.len() == LOG_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }

    fn started_id(&self) -> Result<&SandboxId> {
        self.id
            .as_ref()
            .ok_or_else(|| HarnessError::runtime(self.name(), "sandbox has not been started"))
    }
}

impl fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("name", &self.spec.name)
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(sandbox = %self.spec.name, error = %e, "failed to stop sandbox on drop");
        }
    }
}
