use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;

use crate::probe::ProbeError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Sandbox '{sandbox}' failed to launch: {reason}")]
    LaunchFailure { sandbox: String, reason: String },

    #[error("Sandbox '{sandbox}' not ready after {after:?}: waiting for {waiting_for}")]
    Timeout {
        sandbox: String,
        waiting_for: String,
        after: Duration,
    },

    #[error("Sandbox '{sandbox}' exited with code {code}")]
    NonZeroExit { sandbox: String, code: i32 },

    #[error("Log stream of sandbox '{sandbox}' closed before the expected line appeared")]
    StreamClosed { sandbox: String },

    #[error("Assertion failed: {0}")]
    AssertionFailure(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Runtime error on sandbox '{sandbox}': {reason}")]
    Runtime { sandbox: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", render_phase(.scenario, .phase, .sandbox, .log_tail, .source))]
    Phase {
        scenario: String,
        phase: String,
        sandbox: Option<String>,
        log_tail: Vec<String>,
        #[source]
        source: Box<HarnessError>,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    pub fn launch(sandbox: &str, reason: impl Into<String>) -> Self {
        HarnessError::LaunchFailure {
            sandbox: sandbox.to_string(),
            reason: reason.into(),
        }
    }

    pub fn runtime(sandbox: &str, reason: impl Into<String>) -> Self {
        HarnessError::Runtime {
            sandbox: sandbox.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the sandbox this error is about, if it is about one.
    pub fn sandbox(&self) -> Option<&str> {
        match self {
            HarnessError::LaunchFailure { sandbox, .. }
            | HarnessError::Timeout { sandbox, .. }
            | HarnessError::NonZeroExit { sandbox, .. }
            | HarnessError::StreamClosed { sandbox }
            | HarnessError::Runtime { sandbox, .. } => Some(sandbox),
            HarnessError::Phase { sandbox, .. } => sandbox.as_deref(),
            _ => None,
        }
    }

    /// The error that started it all, looking through phase wrappers.
    pub fn root_cause(&self) -> &HarnessError {
        match self {
            HarnessError::Phase { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn render_phase(
    scenario: &str,
    phase: &str,
    sandbox: &Option<String>,
    log_tail: &[String],
    source: &HarnessError,
) -> String {
    let mut out = format!("Scenario '{}' failed in phase '{}'", scenario, phase);
    if let Some(name) = sandbox {
        let _ = write!(out, " (sandbox '{}')", name);
    }
    let _ = write!(out, ": {}", source);
    if !log_tail.is_empty() {
        out.push_str("\n--- log tail ---");
        for line in log_tail {
            out.push('\n');
            out.push_str(line);
        }
    }
    out
}

/// Return an `AssertionFailure` from the enclosing function unless `cond` holds.
#[macro_export]
macro_rules! ensure_that {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::HarnessError::AssertionFailure(format!($($arg)+)));
        }
    };
}
