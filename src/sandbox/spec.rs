use super::{SandboxHandle, SandboxId};
use crate::error::{HarnessError, Result};
use crate::readiness::Readiness;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Bind mount of a host directory into a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_write(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn to_docker_arg(&self) -> String {
        let ro = if self.read_only { ",readonly" } else { "" };
        format!(
            "type=bind,source={},target={}{}",
            self.source.display(),
            self.target,
            ro
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkMode {
    #[default]
    Default,
    /// Join the network namespace of another running sandbox.
    ShareWith(SandboxId),
    /// Sharing was asked of the named sandbox before it had been started.
    /// Starting a spec in this mode always fails.
    ShareWithUnstarted(String),
}

#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub exposed_ports: BTreeSet<u16>,
    pub mounts: Vec<Mount>,
    pub network: NetworkMode,
    pub command: Option<Vec<String>>,
    pub user: Option<String>,
    pub readiness: Readiness,
}

impl SandboxSpec {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            env: BTreeMap::new(),
            exposed_ports: BTreeSet::new(),
            mounts: Vec::new(),
            network: NetworkMode::Default,
            command: None,
            user: None,
            readiness: Readiness::None,
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.insert(port);
        self
    }

    pub fn with_exposed_ports(mut self, ports: &[u16]) -> Self {
        self.exposed_ports.extend(ports.iter().copied());
        self
    }

    pub fn with_mount(mut self, source: impl Into<PathBuf>, target: &str) -> Self {
        self.mounts.push(Mount::read_write(source, target));
        self
    }

    pub fn with_readonly_mount(mut self, source: impl Into<PathBuf>, target: &str) -> Self {
        self.mounts.push(Mount::read_only(source, target));
        self
    }

    /// Share the network namespace of `other`, which must be started.
    pub fn with_network_of(mut self, other: &SandboxHandle) -> Self {
        self.network = match other.id() {
            Some(id) => NetworkMode::ShareWith(id.clone()),
            None => NetworkMode::ShareWithUnstarted(other.name().to_string()),
        };
        self
    }

    pub fn with_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn waiting_for(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Checks every runtime shares: mount sources exist, no duplicate mount
    /// targets, no published ports while borrowing another sandbox's network.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(HarnessError::launch(&self.name, "no image or program given"));
        }

        let mut targets = BTreeSet::new();
        for mount in &self.mounts {
            if !mount.source.exists() {
                return Err(HarnessError::launch(
                    &self.name,
                    format!("mount source {} does not exist", mount.source.display()),
                ));
            }
            if !mount.target.starts_with('/') {
                return Err(HarnessError::launch(
                    &self.name,
                    format!("mount target '{}' must be absolute", mount.target),
                ));
            }
            if !targets.insert(mount.target.as_str()) {
                return Err(HarnessError::launch(
                    &self.name,
                    format!("mount target '{}' used twice", mount.target),
                ));
            }
        }

        if self.network != NetworkMode::Default && !self.exposed_ports.is_empty() {
            return Err(HarnessError::launch(
                &self.name,
                "cannot expose ports while sharing another sandbox's network",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_settings() {
        let spec = SandboxSpec::new("db", "neo4j:enterprise")
            .with_env("NEO4J_AUTH", "none")
            .with_env("NEO4J_AUTH", "neo4j/secret")
            .with_exposed_ports(&[7474, 7687])
            .with_exposed_port(7474)
            .with_command(["neo4j-admin", "backup"])
            .with_user("1000:1000");

        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.env["NEO4J_AUTH"], "neo4j/secret");
        assert_eq!(spec.exposed_ports.iter().copied().collect::<Vec<_>>(), vec![7474, 7687]);
        assert_eq!(
            spec.command,
            Some(vec!["neo4j-admin".to_string(), "backup".to_string()])
        );
        assert_eq!(spec.user.as_deref(), Some("1000:1000"));
    }

    #[test]
    fn test_validate_rejects_missing_mount_source() {
        let spec = SandboxSpec::new("admin", "sh").with_mount("/nonexistent_dir_12345", "/backup");
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, HarnessError::LaunchFailure { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_rejects_duplicate_targets() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SandboxSpec::new("admin", "sh")
            .with_mount(dir.path(), "/data")
            .with_readonly_mount(dir.path(), "/data");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ports_with_shared_network() {
        let mut spec = SandboxSpec::new("admin", "sh").with_exposed_port(6362);
        spec.network = NetworkMode::ShareWith(SandboxId("abc".to_string()));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_existing_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SandboxSpec::new("admin", "sh").with_mount(dir.path(), "/backup");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_mount_docker_arg() {
        let rw = Mount::read_write("/tmp/data", "/data");
        assert_eq!(rw.to_docker_arg(), "type=bind,source=/tmp/data,target=/data");
        let ro = Mount::read_only("/tmp/backup", "/backup");
        assert!(ro.to_docker_arg().ends_with(",readonly"));
    }
}
