//! Project directory layout
//!
//! A launchable project is a root directory with a `package.json` manifest
//! and, by convention, up to two independently installable subdirectories
//! (`client`, `server`). Each installable root uses `node_modules` as its
//! "already installed" marker.

use crate::runtime::installer::InstallTarget;
use std::path::{Path, PathBuf};

/// Filesystem layout of the project being launched.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The manifest that must exist before the dev server is started.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("package.json")
    }

    pub fn has_manifest(&self) -> bool {
        self.manifest_path().is_file()
    }

    /// Install targets in install order: root first, then client and server
    /// when those directories exist.
    pub fn install_targets(&self) -> Vec<InstallTarget> {
        let mut targets = vec![InstallTarget::new("root", &self.root)];
        for name in ["client", "server"] {
            let dir = self.root.join(name);
            if dir.is_dir() {
                targets.push(InstallTarget::new(name, dir));
            }
        }
        targets
    }
}
