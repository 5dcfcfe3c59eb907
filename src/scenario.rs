//! Multi-phase scenarios over sandboxes.
//!
//! Phases run one after another on the calling thread. Whatever happens, every
//! sandbox started by the scenario is stopped in reverse start order before
//! `run` returns, and the first failure is the one reported.

use crate::error::{HarnessError, Result};
use crate::hostfs::ScenarioDirs;
use crate::sandbox::{Runtime, SandboxHandle, SandboxSpec};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

type PhaseAction = Box<dyn FnOnce(&mut ScenarioContext) -> Result<()>>;

pub struct Scenario {
    name: String,
    runtime: Arc<dyn Runtime>,
    dirs: Option<ScenarioDirs>,
    phases: Vec<(String, PhaseAction)>,
}

impl Scenario {
    pub fn new(name: &str, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            name: name.to_string(),
            runtime,
            dirs: None,
            phases: Vec::new(),
        }
    }

    /// Hand the scenario its host directories; they are cleaned up when it ends.
    pub fn with_dirs(mut self, dirs: ScenarioDirs) -> Self {
        self.dirs = Some(dirs);
        self
    }

    pub fn phase<F>(mut self, name: &str, action: F) -> Self
    where
        F: FnOnce(&mut ScenarioContext) -> Result<()> + 'static,
    {
        self.phases.push((name.to_string(), Box::new(action)));
        self
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn run(self) -> Result<ScenarioReport> {
        let mut ctx = ScenarioContext {
            scenario: self.name.clone(),
            runtime: self.runtime,
            handles: Vec::new(),
            dirs: self.dirs,
            remembered: BTreeMap::new(),
        };
        let mut report = ScenarioReport {
            scenario: self.name.clone(),
            started_at: Utc::now(),
            phases: Vec::new(),
        };
        let mut failure = None;

        for (phase, action) in self.phases {
            let span = tracing::info_span!("phase", scenario = %self.name, phase = %phase);
            let _entered = span.enter();
            tracing::info!("phase started");
            let started = Instant::now();

            match action(&mut ctx) {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "phase finished");
                    report.phases.push(PhaseTiming { name: phase, elapsed });
                }
                Err(err) => {
                    tracing::error!(error = %err, "phase failed");
                    let sandbox = err.sandbox().map(str::to_string);
                    let log_tail = sandbox
                        .as_deref()
                        .map(|name| ctx.log_tail_for(name))
                        .unwrap_or_default();
                    failure = Some(HarnessError::Phase {
                        scenario: self.name.clone(),
                        phase,
                        sandbox,
                        log_tail,
                        source: Box::new(err),
                    });
                    break;
                }
            }
        }

        ctx.teardown();
        if let Some(dirs) = ctx.dirs.take() {
            if let Err(e) = dirs.cleanup() {
                tracing::warn!(scenario = %self.name, error = %e, "failed to clean up scenario directories");
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

/// What a phase can see and do.
pub struct ScenarioContext {
    scenario: String,
    runtime: Arc<dyn Runtime>,
    handles: Vec<SandboxHandle>,
    dirs: Option<ScenarioDirs>,
    remembered: BTreeMap<String, PathBuf>,
}

impl ScenarioContext {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn runtime(&self) -> Arc<dyn Runtime> {
        Arc::clone(&self.runtime)
    }

    pub fn dirs(&self) -> Result<&ScenarioDirs> {
        self.dirs
            .as_ref()
            .ok_or_else(|| HarnessError::Config(format!("scenario '{}' has no host directories", self.scenario)))
    }

    /// Start a sandbox, register it for teardown and wait until it is ready.
    /// The spec's name is its key within the scenario.
    pub fn start(&mut self, spec: SandboxSpec) -> Result<&mut SandboxHandle> {
        if self.handles.iter().any(|h| h.name() == spec.name) {
            return Err(HarnessError::launch(
                &spec.name,
                "a sandbox with this name was already started in this scenario",
            ));
        }

        self.handles
            .push(SandboxHandle::new(Arc::clone(&self.runtime), spec));
        let index = self.handles.len() - 1;
        let handle = &mut self.handles[index];
        handle.start()?;
        handle.wait_ready()?;
        Ok(handle)
    }

    pub fn handle(&self, name: &str) -> Result<&SandboxHandle> {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| HarnessError::runtime(name, "no such sandbox in this scenario"))
    }

    pub fn handle_mut(&mut self, name: &str) -> Result<&mut SandboxHandle> {
        self.handles
            .iter_mut()
            .find(|h| h.name() == name)
            .ok_or_else(|| HarnessError::runtime(name, "no such sandbox in this scenario"))
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        self.handle_mut(name)?.stop()
    }

    /// Sandboxes of this scenario the runtime still reports as running.
    pub fn running(&self) -> Vec<&str> {
        self.handles
            .iter()
            .filter(|h| h.is_running())
            .map(|h| h.name())
            .collect()
    }

    /// Keep a host path for later phases under `key`.
    pub fn remember_dir(&mut self, key: &str, path: &Path) {
        self.remembered.insert(key.to_string(), path.to_path_buf());
    }

    pub fn dir(&self, key: &str) -> Result<PathBuf> {
        self.remembered
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::Config(format!("no directory remembered as '{}'", key)))
    }

    fn log_tail_for(&mut self, name: &str) -> Vec<String> {
        self.handle_mut(name)
            .map(|h| h.log_tail())
            .unwrap_or_default()
    }

    fn teardown(&mut self) {
        while let Some(mut handle) = self.handles.pop() {
            if let Err(e) = handle.stop() {
                tracing::warn!(
                    scenario = %self.scenario,
                    sandbox = handle.name(),
                    error = %e,
                    "teardown failed"
                );
            }
        }
    }
}

// Runs on unwind as well, so a panicking phase still gets reverse-order teardown.
impl Drop for ScenarioContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTiming {
    pub name: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseTiming>,
}

impl ScenarioReport {
    pub fn total(&self) -> Duration {
        self.phases.iter().map(|p| p.elapsed).sum()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (started {})",
            self.scenario,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        for phase in &self.phases {
            writeln!(f, "  {:<24} {:>8.1}s", phase.name, phase.elapsed.as_secs_f64())?;
        }
        write!(f, "  {:<24} {:>8.1}s", "total", self.total().as_secs_f64())
    }
}
