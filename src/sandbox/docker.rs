//! Container runtime backed by a Docker-compatible command line.

use super::{LogStream, NetworkMode, Runtime, SandboxId, SandboxSpec};
use crate::error::{HarnessError, Result};
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Label put on every container so leaked ones can be found with `docker ps --filter`.
pub const NAME_LABEL: &str = "sandbox-harness.name";

pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn output(&self, id: &SandboxId, args: &[&str]) -> Result<Output> {
        self.command()
            .args(args)
            .output()
            .map_err(|e| HarnessError::runtime(short(id), format!("failed to run {}: {}", self.binary, e)))
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Arguments for `docker run` that launch `spec` detached.
pub fn run_args(spec: &SandboxSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--label".to_string(),
        format!("{}={}", NAME_LABEL, spec.name),
    ];

    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for port in &spec.exposed_ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    for mount in &spec.mounts {
        args.push("--mount".to_string());
        args.push(mount.to_docker_arg());
    }
    if let NetworkMode::ShareWith(target) = &spec.network {
        args.push("--network".to_string());
        args.push(format!("container:{}", target));
    }
    if let Some(user) = &spec.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }

    args.push(spec.image.clone());
    if let Some(command) = &spec.command {
        args.extend(command.iter().cloned());
    }
    args
}

/// Pick a host address out of `docker port` output, preferring IPv4.
pub fn parse_port_binding(output: &str) -> Option<SocketAddr> {
    let bindings: Vec<SocketAddr> = output
        .lines()
        .filter_map(|line| line.trim().parse::<SocketAddr>().ok())
        .collect();

    let chosen = bindings
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| bindings.first())?;

    let ip = if chosen.ip().is_unspecified() {
        match chosen.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
        }
    } else {
        chosen.ip()
    };
    Some(SocketAddr::new(ip, chosen.port()))
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

/// First 12 characters of the id, as `docker ps` shows it.
fn short(id: &SandboxId) -> &str {
    let s = id.as_str();
    match s.char_indices().nth(12) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

impl Runtime for DockerRuntime {
    fn name(&self) -> &str {
        &self.binary
    }

    fn start(&self, spec: &SandboxSpec) -> Result<SandboxId> {
        let args = run_args(spec);
        tracing::debug!(sandbox = %spec.name, ?args, "launching container");

        let output = self.command().args(&args).output().map_err(|e| {
            HarnessError::launch(&spec.name, format!("failed to run {}: {}", self.binary, e))
        })?;
        if !output.status.success() {
            return Err(HarnessError::launch(
                &spec.name,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(HarnessError::launch(&spec.name, "runtime returned no container id"));
        }
        Ok(SandboxId(id))
    }

    fn stop(&self, id: &SandboxId) -> Result<()> {
        let output = self.output(id, &["rm", "--force", id.as_str()])?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || is_missing_container(&stderr) {
            Ok(())
        } else {
            Err(HarnessError::runtime(short(id), stderr.trim().to_string()))
        }
    }

    fn is_running(&self, id: &SandboxId) -> Result<bool> {
        let output = self.output(id, &["inspect", "--format", "{{.State.Running}}", id.as_str()])?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim() == "true");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_container(&stderr) {
            Ok(false)
        } else {
            Err(HarnessError::runtime(short(id), stderr.trim().to_string()))
        }
    }

    fn resolve_port(&self, id: &SandboxId, container_port: u16) -> Result<SocketAddr> {
        let port_spec = format!("{}/tcp", container_port);
        let output = self.output(id, &["port", id.as_str(), &port_spec])?;
        if !output.status.success() {
            return Err(HarnessError::runtime(
                short(id),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_port_binding(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            HarnessError::runtime(short(id), format!("port {} is not published", container_port))
        })
    }

    fn stream_logs(&self, id: &SandboxId) -> Result<LogStream> {
        let child = self
            .command()
            .args(["logs", "--follow", id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HarnessError::runtime(short(id), format!("failed to follow logs: {}", e)))?;
        Ok(LogStream::follow(child))
    }

    fn wait_exit(&self, id: &SandboxId, timeout: Duration) -> Result<Option<i32>> {
        let mut child = self
            .command()
            .args(["wait", id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HarnessError::runtime(short(id), format!("failed to wait: {}", e)))?;

        match child.wait_timeout(timeout)? {
            Some(status) => {
                let mut stdout = String::new();
                let mut stderr = String::new();
                if let Some(mut out) = child.stdout.take() {
                    let _ = out.read_to_string(&mut stdout);
                }
                if let Some(mut err) = child.stderr.take() {
                    let _ = err.read_to_string(&mut stderr);
                }
                if !status.success() {
                    return Err(HarnessError::runtime(short(id), stderr.trim().to_string()));
                }
                stdout
                    .trim()
                    .parse::<i32>()
                    .map(Some)
                    .map_err(|e| {
                        HarnessError::runtime(
                            short(id),
                            format!("unexpected wait output '{}': {}", stdout.trim(), e),
                        )
                    })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Ok(None)
            }
        }
    }
}
