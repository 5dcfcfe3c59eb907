//! Strategies deciding when a sandbox is usable, or done.
//!
//! A long-running server is polled over HTTP; one-shot administrative tasks are
//! judged by their exit code or by a line they print on success, since some
//! tools print their success line while helper processes are still running.

use crate::error::{HarnessError, Result};
use crate::sandbox::{LogEvent, SandboxHandle};
use regex::Regex;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared HTTP client for readiness polling. Per-request timeouts are set on each call.
fn http_client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        // Published ports are always local; a proxy from the environment would swallow them.
        reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(MAX_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new())
    })
}

#[derive(Debug, Clone)]
pub enum Readiness {
    /// Ready as soon as the runtime has started it.
    None,
    Http {
        port: u16,
        path: String,
        status: u16,
        timeout: Duration,
    },
    LogPattern { pattern: Regex, timeout: Duration },
    Completion { timeout: Duration },
}

impl Readiness {
    pub fn http(port: u16, path: &str, status: u16, timeout: Duration) -> Self {
        Readiness::Http {
            port,
            path: path.to_string(),
            status,
            timeout,
        }
    }

    pub fn log_pattern(pattern: &str, timeout: Duration) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| HarnessError::Config(format!("invalid log pattern '{}': {}", pattern, e)))?;
        Ok(Readiness::LogPattern { pattern, timeout })
    }

    pub fn completion(timeout: Duration) -> Self {
        Readiness::Completion { timeout }
    }

    pub fn describe(&self) -> String {
        match self {
            Readiness::None => "start".to_string(),
            Readiness::Http { port, path, status, .. } => {
                format!("HTTP {} on port {}{}", status, port, path)
            }
            Readiness::LogPattern { pattern, .. } => format!("log line matching /{}/", pattern),
            Readiness::Completion { .. } => "exit code 0".to_string(),
        }
    }

    /// Block until the strategy is satisfied or fails. Only reads from the
    /// handle; recording the outcome is up to the caller.
    pub fn wait(&self, handle: &mut SandboxHandle) -> Result<()> {
        match self {
            Readiness::None => Ok(()),
            Readiness::Http {
                port,
                path,
                status,
                timeout,
            } => wait_http(handle, *port, path, *status, *timeout),
            Readiness::LogPattern { pattern, timeout } => wait_log(handle, pattern, *timeout),
            Readiness::Completion { timeout } => wait_completion(handle, *timeout),
        }
    }
}

fn timeout_error(handle: &SandboxHandle, waiting_for: String, after: Duration) -> HarnessError {
    HarnessError::Timeout {
        sandbox: handle.name().to_string(),
        waiting_for,
        after,
    }
}

fn wait_http(
    handle: &mut SandboxHandle,
    port: u16,
    path: &str,
    expected: u16,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let addr = handle.resolve_port(port)?;
    let url = format!("http://{}{}", addr, path);
    tracing::debug!(sandbox = handle.name(), %url, expected, "polling for readiness");

    let mut last_seen = String::from("no response");
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timeout_error(
                handle,
                format!("HTTP {} from {} (last: {})", expected, url, last_seen),
                timeout,
            ));
        }

        match http_client()
            .get(&url)
            .timeout(remaining.min(MAX_REQUEST_TIMEOUT))
            .send()
        {
            Ok(response) if response.status().as_u16() == expected => {
                tracing::info!(sandbox = handle.name(), %url, "sandbox is ready");
                return Ok(());
            }
            Ok(response) => last_seen = format!("status {}", response.status().as_u16()),
            Err(e) => last_seen = e.to_string(),
        }

        handle.pump_logs();
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

fn wait_log(handle: &mut SandboxHandle, pattern: &Regex, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timeout_error(
                handle,
                format!("log line matching /{}/", pattern),
                timeout,
            ));
        }

        match handle.next_log_line(remaining) {
            LogEvent::Line(line) => {
                if pattern.is_match(&line) {
                    tracing::info!(sandbox = handle.name(), %line, "matched readiness line");
                    return Ok(());
                }
            }
            LogEvent::Pending => {}
            LogEvent::Closed => {
                return Err(HarnessError::StreamClosed {
                    sandbox: handle.name().to_string(),
                })
            }
        }
    }
}

fn wait_completion(handle: &mut SandboxHandle, timeout: Duration) -> Result<()> {
    match handle.wait_exit(timeout)? {
        Some(0) => Ok(()),
        Some(code) => Err(HarnessError::NonZeroExit {
            sandbox: handle.name().to_string(),
            code,
        }),
        None => Err(timeout_error(handle, "process exit".to_string(), timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Readiness::log_pattern("(unclosed", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_anchored_pattern_rejects_partial_line() {
        let readiness = Readiness::log_pattern("^Backup complete successful.*", Duration::from_secs(1)).unwrap();
        let Readiness::LogPattern { pattern, .. } = readiness else {
            panic!("expected log pattern");
        };
        assert!(pattern.is_match("Backup complete successful."));
        assert!(!pattern.is_match("INFO Backup complete successful."));
        assert!(!pattern.is_match("Backup complete"));
    }

    #[test]
    fn test_describe() {
        let http = Readiness::http(7474, "/", 200, Duration::from_secs(90));
        assert_eq!(http.describe(), "HTTP 200 on port 7474/");
        assert_eq!(Readiness::completion(Duration::from_secs(1)).describe(), "exit code 0");
        assert_eq!(Readiness::None.describe(), "start");
    }
}
