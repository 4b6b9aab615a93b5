//! Launcher session facade
//!
//! The only surface a front end (GUI or terminal) calls: resolve the runtime
//! once, check availability, install dependencies, start/stop the dev server,
//! query state and subscribe to log lines. Rendering and input handling stay
//! with the front end; the session knows nothing about it.

use crate::config::{ConfigError, LauncherConfig};
use crate::project::ProjectLayout;
use crate::runtime::installer::{InstallError, Installer};
use crate::runtime::resolver::{
    self, Platform, RuntimeAvailability, RuntimeLocation,
};
use crate::runtime::supervisor::{
    StartSpec, StateSnapshot, Supervisor, SupervisorError, SupervisorEvent, SupervisorState,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

type LineCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Session-level errors surfaced to the front end.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("{instructions}")]
    RuntimeUnavailable { instructions: &'static str },

    #[error("project manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// One launcher session: a resolved runtime plus a single supervised
/// dev-server process.
pub struct LauncherSession {
    layout: ProjectLayout,
    config: LauncherConfig,
    platform: Platform,
    location: RuntimeLocation,
    installer: Installer,
    supervisor: Arc<Supervisor>,
    callbacks: Arc<Mutex<Vec<LineCallback>>>,
}

impl LauncherSession {
    /// Resolve the runtime for the host and open a session on the project.
    ///
    /// Must be called within a Tokio runtime; the session spawns its
    /// event-forwarding task on creation.
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self, LauncherError> {
        let root = project_root.into();
        let config = LauncherConfig::load(&root)?;
        let platform = Platform::current();
        let location = resolver::resolve(platform);
        Ok(Self::with_location(root, config, platform, location))
    }

    /// Session with an explicitly injected runtime location. Resolution is a
    /// pure function, so embedders and tests can supply their own result.
    pub fn with_location(
        project_root: impl Into<PathBuf>,
        config: LauncherConfig,
        platform: Platform,
        location: RuntimeLocation,
    ) -> Self {
        let layout = ProjectLayout::new(project_root);
        let installer =
            Installer::new(location.clone()).with_timeout(config.install_timeout());
        let (supervisor, event_rx) = Supervisor::new(config.grace_timeout());
        let callbacks: Arc<Mutex<Vec<LineCallback>>> = Arc::default();
        spawn_event_forwarder(event_rx, Arc::clone(&callbacks));

        Self {
            layout,
            config,
            platform,
            location,
            installer,
            supervisor: Arc::new(supervisor),
            callbacks,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// The immutable runtime location this session resolved at startup.
    pub fn runtime_location(&self) -> &RuntimeLocation {
        &self.location
    }

    /// Subscribe to the supervised process's output lines (ANSI-stripped).
    pub fn on_line<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.push(Box::new(callback));
    }

    /// Probe the resolved runtime and package manager.
    pub async fn check_runtime(&self) -> RuntimeAvailability {
        let availability =
            resolver::check_available(&self.location, self.config.availability_timeout()).await;
        if let Some(v) = &availability.runtime_version {
            log::info!("Node.js found: {}", v);
        }
        if let Some(v) = &availability.package_manager_version {
            log::info!("npm found: {}", v);
        }
        availability
    }

    /// Like [`check_runtime`](Self::check_runtime) but fails the session with
    /// install instructions when the runtime is unusable.
    pub async fn require_runtime(&self) -> Result<RuntimeAvailability, LauncherError> {
        let availability = self.check_runtime().await;
        if availability.available {
            Ok(availability)
        } else {
            Err(LauncherError::RuntimeUnavailable {
                instructions: resolver::install_instructions(self.platform),
            })
        }
    }

    /// Idempotently install dependencies for the project's targets
    /// (root, then client, then server). Slow; run off any UI thread.
    pub async fn ensure_installed(&self) -> Result<(), LauncherError> {
        self.installer
            .ensure_installed(&self.layout.install_targets())
            .await?;
        Ok(())
    }

    /// Start the dev server (`<package manager> run <dev_script>`) in the
    /// project root and, when configured, schedule the delayed browser open.
    /// Returns the child's pid when the OS reported one.
    pub async fn start(&self) -> Result<Option<u32>, LauncherError> {
        if !self.layout.has_manifest() {
            return Err(LauncherError::ManifestMissing(self.layout.manifest_path()));
        }

        let (program, args) = self
            .location
            .package_manager_command_line(&["run", self.config.dev_script.as_str()]);
        let pid = self
            .supervisor
            .start(StartSpec {
                program,
                args,
                working_dir: self.layout.root().to_path_buf(),
                path_prepend: self.location.path_prepend.clone(),
            })
            .await?;

        log::info!("Frontend will be available at {}", self.config.client_url());
        log::info!("Backend will be available at {}", self.config.api_url());

        if self.config.open_browser {
            self.spawn_browser_open();
        }
        Ok(pid)
    }

    /// Fixed-delay browser open. A heuristic for "probably serving by now",
    /// deliberately not a readiness probe; failures are logged, never fatal.
    fn spawn_browser_open(&self) {
        let supervisor = Arc::clone(&self.supervisor);
        let url = self.config.client_url();
        let delay = self.config.browser_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if supervisor.state().await.state != SupervisorState::Running {
                return;
            }
            match open::that(&url) {
                Ok(()) => log::info!("Opened browser: {}", url),
                Err(e) => log::warn!("Could not open browser: {}. Please open {}", e, url),
            }
        });
    }

    /// Stop the supervised process. Idempotent; safe before start, after a
    /// natural exit, and when called twice.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Snapshot of the supervised process state.
    pub async fn state(&self) -> StateSnapshot {
        self.supervisor.state().await
    }
}

/// Drives registered line callbacks from the supervisor's event stream.
fn spawn_event_forwarder(
    mut event_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    callbacks: Arc<Mutex<Vec<LineCallback>>>,
) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let SupervisorEvent::Line { line } = event {
                log::info!("[app] {}", line);
                let callbacks = callbacks.lock().unwrap_or_else(PoisonError::into_inner);
                for callback in callbacks.iter() {
                    callback(&line);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_location(pm: &str) -> RuntimeLocation {
        RuntimeLocation {
            runtime_command: "node".to_string(),
            package_manager_command: pm.to_string(),
            path_prepend: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_start_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let session = LauncherSession::with_location(
            dir.path(),
            LauncherConfig::default(),
            Platform::Unix,
            test_location("npm"),
        );
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, LauncherError::ManifestMissing(_)));
        assert_eq!(session.state().await.state, SupervisorState::NotStarted);
    }

    #[tokio::test]
    async fn test_ensure_installed_skips_marked_targets() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::create_dir_all(dir.path().join("client").join("node_modules")).unwrap();
        fs::create_dir_all(dir.path().join("server").join("node_modules")).unwrap();

        // Nonexistent package manager: success proves nothing was invoked.
        let session = LauncherSession::with_location(
            dir.path(),
            LauncherConfig::default(),
            Platform::Unix,
            test_location("definitely-not-a-pm"),
        );
        session.ensure_installed().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let session = LauncherSession::with_location(
            dir.path(),
            LauncherConfig::default(),
            Platform::Unix,
            test_location("npm"),
        );
        session.stop().await;
        session.stop().await;
        assert_eq!(session.state().await.state, SupervisorState::NotStarted);
    }
}
