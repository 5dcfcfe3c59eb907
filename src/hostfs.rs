//! Scenario-scoped host directories that get mounted into sandboxes.
//!
//! One scenario owns one root directory. Subdirectories created under it stay
//! valid until the scenario is dropped, so a later phase can read what an
//! earlier sandbox wrote (a restore reading a backup, for instance).

use crate::error::Result;
use crate::sandbox::SandboxSpec;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct ScenarioDirs {
    root: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl ScenarioDirs {
    /// Create a fresh `<prefix><random>` directory under `root`, or the system temp dir.
    pub fn create(prefix: &str, root: Option<&Path>, keep: bool) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), keep, "created scenario directory");
        Ok(Self {
            root: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new uniquely named subdirectory.
    pub fn subdir(&self, prefix: &str) -> Result<PathBuf> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.path.join(format!("{}{}", prefix, &suffix[..8]));
        fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Create a subdirectory and bind it read-write at `sandbox_path`.
    pub fn create_and_mount(
        &self,
        spec: SandboxSpec,
        prefix: &str,
        sandbox_path: &str,
    ) -> Result<(SandboxSpec, PathBuf)> {
        let dir = self.subdir(prefix)?;
        Ok((spec.with_mount(&dir, sandbox_path), dir))
    }

    /// Remove the directory tree now, unless it is kept for inspection.
    pub fn cleanup(mut self) -> Result<()> {
        match self.root.take() {
            Some(dir) if !self.keep => {
                dir.close()?;
                Ok(())
            }
            Some(dir) => {
                let kept = dir.keep();
                tracing::info!(path = %kept.display(), "keeping scenario directory");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScenarioDirs {
    fn drop(&mut self) {
        if let Some(dir) = self.root.take() {
            if self.keep {
                let _ = dir.keep();
            } else if let Err(e) = dir.close() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scenario directory");
            }
        }
    }
}
