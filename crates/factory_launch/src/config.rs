//! Launcher configuration
//!
//! Optional `launcher.yaml` in the project root. Every field has a default
//! matching the conventional dev setup (vite client on 5173, API on 3000,
//! `npm run dev`), so the file only exists to override them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Launcher settings, all overridable from `launcher.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// package.json script that starts the dev server
    #[serde(default = "default_dev_script")]
    pub dev_script: String,

    /// Port the browser-facing UI is expected on
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// Port the API server is expected on
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Bound on a single dependency install
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    /// Bound on each runtime version query
    #[serde(default = "default_availability_timeout_secs")]
    pub availability_timeout_secs: u64,

    /// Grace period before a stuck process is force-killed
    #[serde(default = "default_grace_timeout_secs")]
    pub grace_timeout_secs: u64,

    /// Fixed delay before the browser is opened. This is a heuristic for
    /// "probably serving by now", not a readiness probe.
    #[serde(default = "default_browser_delay_secs")]
    pub browser_delay_secs: u64,

    /// Whether to open the client URL after the startup delay
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_dev_script() -> String {
    "dev".to_string()
}

fn default_client_port() -> u16 {
    5173
}

fn default_api_port() -> u16 {
    3000
}

fn default_install_timeout_secs() -> u64 {
    300
}

fn default_availability_timeout_secs() -> u64 {
    10
}

fn default_grace_timeout_secs() -> u64 {
    5
}

fn default_browser_delay_secs() -> u64 {
    5
}

fn default_open_browser() -> bool {
    true
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            dev_script: default_dev_script(),
            client_port: default_client_port(),
            api_port: default_api_port(),
            install_timeout_secs: default_install_timeout_secs(),
            availability_timeout_secs: default_availability_timeout_secs(),
            grace_timeout_secs: default_grace_timeout_secs(),
            browser_delay_secs: default_browser_delay_secs(),
            open_browser: default_open_browser(),
        }
    }
}

/// Errors loading `launcher.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl LauncherConfig {
    /// Load `launcher.yaml` from the project root when present, otherwise
    /// the defaults. A present-but-broken file is an error, not a silent
    /// fallback.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join("launcher.yaml");
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn client_url(&self) -> String {
        format!("http://localhost:{}", self.client_port)
    }

    pub fn api_url(&self) -> String {
        format!("http://localhost:{}", self.api_port)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn availability_timeout(&self) -> Duration {
        Duration::from_secs(self.availability_timeout_secs)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs)
    }

    pub fn browser_delay(&self) -> Duration {
        Duration::from_secs(self.browser_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LauncherConfig::default();
        assert_eq!(config.dev_script, "dev");
        assert_eq!(config.client_port, 5173);
        assert_eq!(config.api_port, 3000);
        assert_eq!(config.install_timeout_secs, 300);
        assert_eq!(config.grace_timeout_secs, 5);
        assert_eq!(config.browser_delay_secs, 5);
        assert!(config.open_browser);
        assert_eq!(config.client_url(), "http://localhost:5173");
    }

    #[test]
    fn test_partial_override() {
        let config = LauncherConfig::from_yaml("client_port: 4000\nopen_browser: false\n").unwrap();
        assert_eq!(config.client_port, 4000);
        assert!(!config.open_browser);
        // Untouched fields keep their defaults.
        assert_eq!(config.dev_script, "dev");
        assert_eq!(config.api_port, 3000);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load(dir.path()).unwrap();
        assert_eq!(config.client_port, 5173);
    }

    #[test]
    fn test_load_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("launcher.yaml"), "client_port: [nope").unwrap();
        assert!(matches!(
            LauncherConfig::load(dir.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
