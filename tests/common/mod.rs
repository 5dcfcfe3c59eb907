#![allow(dead_code)]

use parking_lot::Mutex;
use sandbox_harness::error::Result;
use sandbox_harness::sandbox::{LogStream, Runtime, SandboxId, SandboxSpec};
use std::collections::{BTreeSet, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// In-memory runtime that records every call. Sandbox ids are the spec names.
#[derive(Default)]
pub struct RecordingRuntime {
    events: Mutex<Vec<String>>,
    running: Mutex<BTreeSet<String>>,
    stops: Mutex<HashMap<String, usize>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines the sandbox called `name` prints once started.
    pub fn with_logs(self, name: &str, lines: &[&str]) -> Self {
        self.logs
            .lock()
            .insert(name.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn stop_count(&self, name: &str) -> usize {
        self.stops.lock().get(name).copied().unwrap_or(0)
    }

    pub fn running(&self) -> Vec<String> {
        self.running.lock().iter().cloned().collect()
    }
}

impl Runtime for RecordingRuntime {
    fn name(&self) -> &str {
        "recording"
    }

    fn start(&self, spec: &SandboxSpec) -> Result<SandboxId> {
        self.events.lock().push(format!("start:{}", spec.name));
        self.running.lock().insert(spec.name.clone());
        Ok(SandboxId(spec.name.clone()))
    }

    fn stop(&self, id: &SandboxId) -> Result<()> {
        self.events.lock().push(format!("stop:{}", id));
        *self.stops.lock().entry(id.0.clone()).or_default() += 1;
        self.running.lock().remove(&id.0);
        Ok(())
    }

    fn is_running(&self, id: &SandboxId) -> Result<bool> {
        Ok(self.running.lock().contains(&id.0))
    }

    fn resolve_port(&self, _id: &SandboxId, container_port: u16) -> Result<SocketAddr> {
        Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, container_port)))
    }

    fn stream_logs(&self, id: &SandboxId) -> Result<LogStream> {
        let lines = self.logs.lock().remove(&id.0).unwrap_or_default();
        Ok(LogStream::closed(lines))
    }

    fn wait_exit(&self, id: &SandboxId, _timeout: Duration) -> Result<Option<i32>> {
        self.running.lock().remove(&id.0);
        Ok(Some(0))
    }
}

/// A shell sandbox running `script` with `args` as `$1..`.
pub fn shell(name: &str, script: &str, args: &[&str]) -> SandboxSpec {
    let mut command = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
    command.extend(args.iter().map(|a| a.to_string()));
    SandboxSpec::new(name, "sh").with_command(command)
}
