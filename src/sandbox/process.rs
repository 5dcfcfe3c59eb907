//! Runs sandbox specs as plain host processes.
//!
//! There is no filesystem or network isolation: mounts are honoured by
//! rewriting sandbox paths to host paths in the arguments and environment,
//! exposed ports are reached on loopback. Each child gets its own process
//! group so stopping it also stops whatever it spawned.

use super::{LogStream, Runtime, SandboxId, SandboxSpec};
use crate::error::{HarnessError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct ManagedProcess {
    name: String,
    child: Child,
    ports: BTreeSet<u16>,
    logs: Option<LogStream>,
}

pub struct ProcessRuntime {
    processes: Mutex<HashMap<SandboxId, Arc<Mutex<ManagedProcess>>>>,
    stop_grace: Duration,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self::with_stop_grace(DEFAULT_STOP_GRACE)
    }

    pub fn with_stop_grace(stop_grace: Duration) -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
            stop_grace,
        }
    }

    /// Number of sandboxes started and not yet stopped, running or not.
    pub fn tracked(&self) -> usize {
        self.processes.lock().len()
    }

    fn entry(&self, id: &SandboxId) -> Result<Arc<Mutex<ManagedProcess>>> {
        self.processes
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| HarnessError::runtime(id.as_str(), "no such process sandbox"))
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace a leading sandbox path with its host path. Longest match wins.
pub fn translate_path(value: &str, spec: &SandboxSpec) -> String {
    let mut mounts: Vec<_> = spec.mounts.iter().collect();
    mounts.sort_by_key(|m| std::cmp::Reverse(m.target.len()));

    for mount in mounts {
        let target = mount.target.trim_end_matches('/');
        if let Some(rest) = value.strip_prefix(target) {
            if rest.is_empty() || rest.starts_with('/') {
                return format!("{}{}", mount.source.display(), rest);
            }
        }
        // --flag=/sandbox/path style arguments
        if let Some((flag, path)) = value.split_once('=') {
            if let Some(rest) = path.strip_prefix(target) {
                if rest.is_empty() || rest.starts_with('/') {
                    return format!("{}={}{}", flag, mount.source.display(), rest);
                }
            }
        }
    }
    value.to_string()
}

/// Poll until no process is left in `group`, or `deadline` passes.
fn wait_group_gone(group: Pid, deadline: Instant) -> bool {
    loop {
        if killpg(group, None).is_err() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn ensure_port_free(spec: &SandboxSpec, port: u16) -> Result<()> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .map(drop)
        .map_err(|e| HarnessError::launch(&spec.name, format!("port {} is unavailable: {}", port, e)))
}

impl Runtime for ProcessRuntime {
    fn name(&self) -> &str {
        "process"
    }

    fn start(&self, spec: &SandboxSpec) -> Result<SandboxId> {
        for port in &spec.exposed_ports {
            ensure_port_free(spec, *port)?;
        }
        if let Some(user) = &spec.user {
            tracing::debug!(sandbox = %spec.name, user = %user, "process runtime ignores the user setting");
        }

        let mut cmd = Command::new(translate_path(&spec.image, spec));
        if let Some(args) = &spec.command {
            cmd.args(args.iter().map(|a| translate_path(a, spec)));
        }
        for (key, value) in &spec.env {
            cmd.env(key, translate_path(value, spec));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            HarnessError::launch(&spec.name, format!("failed to spawn '{}': {}", spec.image, e))
        })?;

        let logs = LogStream::from_pipes(child.stdout.take(), child.stderr.take());
        let id = SandboxId(child.id().to_string());
        tracing::debug!(sandbox = %spec.name, pid = child.id(), "spawned process sandbox");

        self.processes.lock().insert(
            id.clone(),
            Arc::new(Mutex::new(ManagedProcess {
                name: spec.name.clone(),
                child,
                ports: spec.exposed_ports.clone(),
                logs: Some(logs),
            })),
        );
        Ok(id)
    }

    fn stop(&self, id: &SandboxId) -> Result<()> {
        let Some(entry) = self.processes.lock().remove(id) else {
            return Ok(());
        };
        let mut managed = entry.lock();

        // Signal the group even when the leader is gone: anything it spawned
        // in the background still belongs to it.
        let group = Pid::from_raw(managed.child.id() as i32);
        let deadline = Instant::now() + self.stop_grace;
        let _ = killpg(group, Signal::SIGTERM);

        let leader_exited = managed.child.wait_timeout(self.stop_grace)?.is_some();
        if leader_exited && wait_group_gone(group, deadline) {
            return Ok(());
        }

        tracing::warn!(sandbox = %managed.name, "process group ignored SIGTERM, killing");
        let _ = killpg(group, Signal::SIGKILL);
        let _ = managed.child.kill();
        managed.child.wait()?;
        Ok(())
    }

    fn is_running(&self, id: &SandboxId) -> Result<bool> {
        let Some(entry) = self.processes.lock().get(id).cloned() else {
            return Ok(false);
        };
        let mut managed = entry.lock();
        Ok(managed.child.try_wait()?.is_none())
    }

    fn resolve_port(&self, id: &SandboxId, container_port: u16) -> Result<SocketAddr> {
        let entry = self.entry(id)?;
        let managed = entry.lock();
        if !managed.ports.contains(&container_port) {
            return Err(HarnessError::runtime(
                &managed.name,
                format!("port {} is not exposed", container_port),
            ));
        }
        Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, container_port)))
    }

    fn stream_logs(&self, id: &SandboxId) -> Result<LogStream> {
        let entry = self.entry(id)?;
        let mut managed = entry.lock();
        let name = managed.name.clone();
        managed.logs
            .take()
            .ok_or_else(|| HarnessError::runtime(&name, "log stream already taken"))
    }

    fn wait_exit(&self, id: &SandboxId, timeout: Duration) -> Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            // The entry lock is only held for the poll so liveness queries never wait on us.
            let entry = self.entry(id)?;
            if let Some(status) = entry.lock().child.try_wait()? {
                return Ok(Some(status.code().unwrap_or(-1)));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }
}
