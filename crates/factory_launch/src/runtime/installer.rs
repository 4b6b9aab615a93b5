//! Idempotent dependency installation
//!
//! Runs the package manager's `install` in each target directory unless the
//! target's marker directory already exists. Installs are slow blocking
//! operations from the caller's point of view; interactive front ends run
//! `ensure_installed` off their UI thread.

use crate::runtime::resolver::{amended_path, RuntimeLocation};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default bound on a single dependency install.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// A project directory that may need dependency installation.
#[derive(Debug, Clone)]
pub struct InstallTarget {
    /// Short name for logging ("root", "client", "server")
    pub name: String,
    /// Directory the install runs in
    pub path: PathBuf,
    /// Directory whose existence means "already installed"
    pub marker_path: PathBuf,
}

impl InstallTarget {
    /// Target with the conventional `node_modules` marker inside `path`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let marker_path = path.join("node_modules");
        Self {
            name: name.into(),
            path,
            marker_path,
        }
    }

    /// Install is attempted if and only if this returns true at check time.
    pub fn needs_install(&self) -> bool {
        !self.marker_path.exists()
    }
}

/// Errors from a dependency install. The first failure aborts the remaining
/// targets; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("install failed for '{target}' (exit {code:?}):\n{stderr}")]
    Failed {
        target: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("install timed out for '{target}' after {secs}s")]
    TimedOut { target: String, secs: u64 },

    #[error("could not run package manager for '{target}': {source}")]
    Spawn {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// Installs dependencies with the resolved runtime location.
#[derive(Debug, Clone)]
pub struct Installer {
    location: RuntimeLocation,
    timeout: Duration,
}

impl Installer {
    pub fn new(location: RuntimeLocation) -> Self {
        Self {
            location,
            timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ensure every target has installed dependencies, in caller order.
    ///
    /// Targets whose marker directory exists are skipped; markers are never
    /// removed. The first failing target short-circuits the rest.
    pub async fn ensure_installed(&self, targets: &[InstallTarget]) -> Result<(), InstallError> {
        for target in targets {
            if !target.needs_install() {
                log::debug!(
                    "[{}] dependencies already installed ({})",
                    target.name,
                    target.marker_path.display()
                );
                continue;
            }
            self.install(target).await?;
        }
        Ok(())
    }

    async fn install(&self, target: &InstallTarget) -> Result<(), InstallError> {
        log::info!("[{}] Installing dependencies in {}", target.name, target.path.display());

        let (program, args) = self.location.package_manager_command_line(&["install"]);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&target.path)
            .env("PATH", amended_path(&self.location.path_prepend))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(InstallError::Spawn {
                    target: target.name.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(InstallError::TimedOut {
                    target: target.name.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(InstallError::Failed {
                target: target.name.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        log::info!("[{}] Dependencies installed", target.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn location_with_pm(pm: &str) -> RuntimeLocation {
        RuntimeLocation {
            runtime_command: "node".to_string(),
            package_manager_command: pm.to_string(),
            path_prepend: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_marker_present_skips_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let target = InstallTarget::new("root", dir.path());
        assert!(!target.needs_install());

        // The package manager does not exist; success proves it was never run.
        let installer = Installer::new(location_with_pm("definitely-not-a-pm"));
        installer.ensure_installed(&[target]).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_marker_invokes_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        let target = InstallTarget::new("root", dir.path());
        assert!(target.needs_install());

        let installer = Installer::new(location_with_pm("definitely-not-a-pm"));
        let err = installer.ensure_installed(&[target]).await.unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reported_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let target = InstallTarget::new("server", dir.path());

        let installer = Installer::new(location_with_pm("false"));
        let err = installer.ensure_installed(&[target]).await.unwrap_err();
        match err {
            InstallError::Failed { target, code, .. } => {
                assert_eq!(target, "server");
                assert_eq!(code, Some(1));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let failing = tempfile::tempdir().unwrap();
        let untouched = tempfile::tempdir().unwrap();
        let targets = vec![
            InstallTarget::new("root", failing.path()),
            InstallTarget::new("client", untouched.path()),
        ];

        let installer = Installer::new(location_with_pm("false"));
        let err = installer.ensure_installed(&targets).await.unwrap_err();
        match err {
            InstallError::Failed { target, .. } => assert_eq!(target, "root"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_install_continues() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let targets = vec![
            InstallTarget::new("root", a.path()),
            InstallTarget::new("client", b.path()),
        ];

        // `true` exits 0 for every target.
        let installer = Installer::new(location_with_pm("true"));
        installer.ensure_installed(&targets).await.unwrap();
    }
}
