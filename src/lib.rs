//! Orchestrates sandboxed processes (containers, or plain local processes)
//! through multi-phase scenarios: start, wait for readiness, drive and
//! verify, then tear everything down in reverse order.

pub mod config;
pub mod error;
pub mod hostfs;
pub mod logging;
pub mod neo4j;
pub mod probe;
pub mod readiness;
pub mod sandbox;
pub mod scenario;

pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use hostfs::ScenarioDirs;
pub use readiness::Readiness;
pub use sandbox::{Runtime, SandboxHandle, SandboxSpec};
pub use scenario::{Scenario, ScenarioContext, ScenarioReport};
