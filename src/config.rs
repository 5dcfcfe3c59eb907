use crate::sandbox::{DockerRuntime, ProcessRuntime, Runtime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarnessConfig {
    pub runtime: RuntimeConfig,
    pub images: ImageConfig,
    pub timeouts: TimeoutConfig,
    pub scenario: ScenarioConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Process,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,
    /// Docker-compatible CLI, e.g. `docker` or `podman`.
    pub binary: String,
    pub stop_grace_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Enterprise,
    Community,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    pub server: String,
    pub admin: String,
    pub edition: Edition,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutConfig {
    pub startup_secs: u64,
    pub admin_secs: u64,
    pub probe_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScenarioConfig {
    pub keep_dirs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig {
                kind: RuntimeKind::Docker,
                binary: "docker".to_string(),
                stop_grace_secs: 5,
            },
            images: ImageConfig {
                server: "neo4j:4.4-enterprise".to_string(),
                admin: "neo4j/neo4j-admin:4.4-enterprise".to_string(),
                edition: Edition::Enterprise,
            },
            timeouts: TimeoutConfig {
                startup_secs: 90,
                admin_secs: 90,
                probe_secs: 30,
            },
            scenario: ScenarioConfig {
                keep_dirs: false,
                temp_root: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl TimeoutConfig {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn admin(&self) -> Duration {
        Duration::from_secs(self.admin_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }
}

impl HarnessConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The runtime sandboxes are started on.
    pub fn runtime(&self) -> Arc<dyn Runtime> {
        match self.runtime.kind {
            RuntimeKind::Docker => Arc::new(DockerRuntime::new(&self.runtime.binary)),
            RuntimeKind::Process => Arc::new(ProcessRuntime::with_stop_grace(Duration::from_secs(
                self.runtime.stop_grace_secs,
            ))),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sandbox-harness").join("config.toml"))
    }

    /// Load ~/.sandbox-harness/config.toml, falling back to defaults, then
    /// apply environment overrides.
    ///
    /// Problems are returned as warnings rather than logged, since this runs
    /// before the log level it picks has been installed.
    pub fn load() -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut config = match Self::config_path() {
            Some(path) => Self::load_file(&path).unwrap_or_else(|warning| {
                warnings.push(warning);
                Self::default()
            }),
            None => Self::default(),
        };
        warnings.extend(config.apply_overrides(|key| std::env::var(key).ok()));
        (config, warnings)
    }

    /// Read `path`, or defaults when it does not exist.
    pub fn load_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            format!("failed to read config {}, using defaults: {}", path.display(), e)
        })?;
        toml::from_str(&contents).map_err(|e| {
            format!("failed to parse config {}, using defaults: {}", path.display(), e)
        })
    }

    /// Apply `NEO4J_IMAGE`, `NEO4J_ADMIN_IMAGE`, `NEO4J_EDITION`,
    /// `SANDBOX_HARNESS_RUNTIME` and `SANDBOX_HARNESS_KEEP_DIRS` from `lookup`.
    /// Unusable values are skipped and reported in the returned warnings.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        if let Some(image) = lookup("NEO4J_IMAGE") {
            self.images.server = image;
        }
        if let Some(image) = lookup("NEO4J_ADMIN_IMAGE") {
            self.images.admin = image;
        }
        if let Some(edition) = lookup("NEO4J_EDITION") {
            match edition.to_lowercase().as_str() {
                "enterprise" => self.images.edition = Edition::Enterprise,
                "community" => self.images.edition = Edition::Community,
                other => warnings.push(format!("ignoring unknown NEO4J_EDITION '{}'", other)),
            }
        }
        if let Some(kind) = lookup("SANDBOX_HARNESS_RUNTIME") {
            match kind.to_lowercase().as_str() {
                "docker" => self.runtime.kind = RuntimeKind::Docker,
                "process" => self.runtime.kind = RuntimeKind::Process,
                other => {
                    // anything else is taken as the CLI binary to drive
                    self.runtime.kind = RuntimeKind::Docker;
                    self.runtime.binary = other.to_string();
                }
            }
        }
        if let Some(keep) = lookup("SANDBOX_HARNESS_KEEP_DIRS") {
            self.scenario.keep_dirs = matches!(keep.as_str(), "1" | "true" | "yes");
        }
        warnings
    }
}
