//! Bulk deployment of definition files found under a directory

use crate::config::DirectoryConfig;
use crate::container::{Container, DeploymentReport};
use crate::error::{ContainerError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{info, trace};
use walkdir::WalkDir;

/// Deploys every matching file under `root`, in lexicographic path order
pub struct DirectoryLoader {
    root: PathBuf,
    pattern: Pattern,
    check_loaded: bool,
}

impl DirectoryLoader {
    /// Create a loader matching file names against the glob `pattern`
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| ContainerError::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            root: root.into(),
            pattern,
            check_loaded: false,
        })
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &DirectoryConfig) -> Result<Self> {
        Ok(Self::new(root, &config.pattern)?.check_loaded(config.check_loaded))
    }

    /// Run [`Container::check_loaded`] after the last file
    pub fn check_loaded(mut self, check: bool) -> Self {
        self.check_loaded = check;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Matching files, sorted
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| ContainerError::Io {
                path: e.path().unwrap_or(&self.root).to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matched = entry
                .file_name()
                .to_str()
                .map(|name| self.pattern.matches(name))
                .unwrap_or(false);
            if matched {
                trace!("Found definition file {}", entry.path().display());
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Deploy every matching file into `container`
    ///
    /// Stops at the first file that cannot be deployed; files before it stay
    /// deployed.
    pub fn load(&self, container: &Container) -> Result<Vec<DeploymentReport>> {
        let paths = self.scan()?;
        info!(
            "Loading {} definition file(s) from {}",
            paths.len(),
            self.root.display()
        );

        let mut reports = Vec::with_capacity(paths.len());
        for path in &paths {
            reports.push(container.deploy_file(path)?);
        }
        if self.check_loaded {
            container.check_loaded()?;
        }
        Ok(reports)
    }
}
