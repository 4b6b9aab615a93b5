//! Runtime environment resolution
//!
//! Locates a usable Node.js/npm installation across version managers
//! (nvm, nvm-windows, scoop) and vendor install paths. Resolution is a
//! read-only function of the host filesystem and environment; it never
//! fails and never mutates the process environment. The result carries a
//! PATH prepend list that callers inject into child processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Standard Unix directories probed for a system-wide node binary, in order.
const UNIX_SYSTEM_PATHS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/nodejs/bin"];

/// Host platform family, as far as runtime resolution cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and friends
    Unix,
    /// Windows
    Windows,
}

impl Platform {
    /// Detect the platform the launcher is running on
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Resolved runtime and package-manager commands plus the PATH amendment
/// needed to use them.
///
/// Computed once per launcher session and shared read-only by the installer
/// and the supervisor. Every `path_prepend` entry exists on the filesystem at
/// resolution time; existence is not re-validated afterwards.
#[derive(Debug, Clone)]
pub struct RuntimeLocation {
    /// Invocable runtime command (name or absolute path)
    pub runtime_command: String,
    /// Invocable package-manager command
    pub package_manager_command: String,
    /// Directories to prepend to the child-process PATH, highest priority first
    pub path_prepend: Vec<PathBuf>,
}

impl RuntimeLocation {
    fn bare(platform: Platform) -> Self {
        Self::with_prepend(platform, Vec::new())
    }

    fn with_prepend(platform: Platform, path_prepend: Vec<PathBuf>) -> Self {
        let (runtime, pm) = match platform {
            Platform::Unix => ("node", "npm"),
            Platform::Windows => ("node.exe", "npm.cmd"),
        };
        Self {
            runtime_command: runtime.to_string(),
            package_manager_command: pm.to_string(),
            path_prepend,
        }
    }

    /// Command line to invoke the runtime with the given arguments
    pub fn runtime_command_line(&self, args: &[&str]) -> (String, Vec<String>) {
        command_line(&self.runtime_command, args)
    }

    /// Command line to invoke the package manager with the given arguments
    pub fn package_manager_command_line(&self, args: &[&str]) -> (String, Vec<String>) {
        command_line(&self.package_manager_command, args)
    }
}

/// On Windows, batch wrappers like npm.cmd have to run through the shell.
fn command_line(program: &str, args: &[&str]) -> (String, Vec<String>) {
    if cfg!(windows) {
        let mut full = Vec::with_capacity(args.len() + 2);
        full.push("/c".to_string());
        full.push(program.to_string());
        full.extend(args.iter().map(|a| a.to_string()));
        ("cmd".to_string(), full)
    } else {
        (
            program.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        )
    }
}

/// Resolve the best available runtime location for the host platform.
///
/// Never fails: when no managed or vendor installation is found it falls
/// back to bare command names and the caller's inherited PATH.
pub fn resolve(platform: Platform) -> RuntimeLocation {
    resolve_with_home(dirs::home_dir().as_deref(), platform)
}

/// Resolution against an explicit home directory (injectable for tests).
pub fn resolve_with_home(home: Option<&Path>, platform: Platform) -> RuntimeLocation {
    match platform {
        Platform::Unix => resolve_unix(home),
        Platform::Windows => resolve_windows(home),
    }
}

fn resolve_unix(home: Option<&Path>) -> RuntimeLocation {
    // Per-user nvm installation: pick the highest installed version.
    if let Some(home) = home {
        let versions_dir = home.join(".nvm").join("versions").join("node");
        if let Some(version) = latest_version_dir(&versions_dir) {
            let bin_dir = versions_dir.join(&version).join("bin");
            if bin_dir.is_dir() {
                log::info!("Found nvm node {}: {}", version, bin_dir.display());
                return RuntimeLocation::with_prepend(Platform::Unix, vec![bin_dir]);
            }
        }
    }

    // System-wide installations.
    for dir in UNIX_SYSTEM_PATHS {
        let dir = Path::new(dir);
        if dir.join("node").is_file() {
            log::info!("Found node in {}", dir.display());
            return RuntimeLocation::with_prepend(Platform::Unix, vec![dir.to_path_buf()]);
        }
    }

    log::info!("No managed node installation found, falling back to PATH lookup");
    RuntimeLocation::bare(Platform::Unix)
}

fn resolve_windows(home: Option<&Path>) -> RuntimeLocation {
    let Some(home) = home else {
        return RuntimeLocation::bare(Platform::Windows);
    };

    // nvm-windows stores its active version in settings.txt, not a symlink.
    let nvm_dir = home.join("AppData").join("Roaming").join("nvm");
    if nvm_dir.is_dir() {
        if let Ok(settings) = std::fs::read_to_string(nvm_dir.join("settings.txt")) {
            if let Some(version) = parse_nvm_windows_current(&settings) {
                let version_dir = nvm_dir.join(&version);
                if version_dir.is_dir() {
                    log::info!("Found nvm-windows node {}: {}", version, version_dir.display());
                    return RuntimeLocation::with_prepend(Platform::Windows, vec![version_dir]);
                }
            }
        }
    }

    // Vendor and per-user install locations.
    let mut candidates: Vec<PathBuf> = Vec::new();
    for var in ["ProgramFiles", "ProgramFiles(x86)"] {
        if let Some(dir) = std::env::var_os(var) {
            candidates.push(PathBuf::from(dir).join("nodejs"));
        }
    }
    candidates.push(home.join("AppData").join("Roaming").join("npm"));
    candidates.push(home.join("scoop").join("apps").join("nodejs").join("current"));

    for dir in candidates {
        if dir.join("node.exe").is_file() {
            log::info!("Found node in {}", dir.display());
            return RuntimeLocation::with_prepend(Platform::Windows, vec![dir]);
        }
    }

    log::info!("No managed node installation found, falling back to PATH lookup");
    RuntimeLocation::bare(Platform::Windows)
}

/// Extract the active version from an nvm-windows settings file
/// (a `current: <version>` line).
fn parse_nvm_windows_current(settings: &str) -> Option<String> {
    settings.lines().find_map(|line| {
        line.strip_prefix("current:")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Pick the highest version-named subdirectory of `dir`.
///
/// Comparison is by numeric dot-separated components, so `v1.10.0` sorts
/// above `v1.9.0`. Plain string ordering gets this wrong. Entries that do
/// not parse as versions are ignored.
fn latest_version_dir(dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            if !entry.file_type().ok()?.is_dir() {
                return None;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = version_key(&name)?;
            Some((key, name))
        })
        .max()
        .map(|(_, name)| name)
}

/// Parse `v1.2.3` / `1.2.3` into numeric components for ordering.
fn version_key(name: &str) -> Option<Vec<u64>> {
    name.trim_start_matches('v')
        .split('.')
        .map(|component| component.parse::<u64>().ok())
        .collect()
}

/// Outcome of probing the resolved runtime and package manager.
#[derive(Debug, Clone)]
pub struct RuntimeAvailability {
    /// Both commands answered their version query with exit status 0
    pub available: bool,
    /// Runtime version string, when it answered
    pub runtime_version: Option<String>,
    /// Package-manager version string, when it answered
    pub package_manager_version: Option<String>,
}

/// Run the version queries for both commands under a bounded timeout.
///
/// A command that is missing, fails, or hangs past the timeout is treated
/// as unavailable; this is a diagnostic, never a panic.
pub async fn check_available(location: &RuntimeLocation, timeout: Duration) -> RuntimeAvailability {
    let path = amended_path(&location.path_prepend);

    let (program, args) = location.runtime_command_line(&["--version"]);
    let runtime_version = query_version(&program, &args, &path, timeout).await;

    let (program, args) = location.package_manager_command_line(&["--version"]);
    let package_manager_version = query_version(&program, &args, &path, timeout).await;

    RuntimeAvailability {
        available: runtime_version.is_some() && package_manager_version.is_some(),
        runtime_version,
        package_manager_version,
    }
}

async fn query_version(
    program: &str,
    args: &[String],
    path: &OsString,
    timeout: Duration,
) -> Option<String> {
    let mut cmd = Command::new(program);
    cmd.args(args).env("PATH", path).kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(Ok(output)) => {
            log::warn!("{} exited with {} during version query", program, output.status);
            None
        }
        Ok(Err(e)) => {
            log::warn!("Could not run {}: {}", program, e);
            None
        }
        Err(_) => {
            log::warn!("{} version query timed out after {:?}", program, timeout);
            None
        }
    }
}

/// Build the child-process PATH value: prepend entries first, then the
/// inherited PATH, joined with the platform separator.
pub fn amended_path(prepend: &[PathBuf]) -> OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    if prepend.is_empty() {
        return inherited;
    }
    let parts: Vec<PathBuf> = prepend
        .iter()
        .cloned()
        .chain(std::env::split_paths(&inherited))
        .collect();
    std::env::join_paths(parts).unwrap_or(inherited)
}

/// Human guidance shown when the runtime is missing.
pub fn install_instructions(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => {
            "Node.js or npm not found.\n\
             Install Node.js from https://nodejs.org\n\
             or nvm-windows from https://github.com/coreybutler/nvm-windows"
        }
        Platform::Unix => {
            "Node.js or npm not found.\n\
             Install Node.js with your package manager (e.g. sudo apt install nodejs npm)\n\
             or via nvm: https://github.com/nvm-sh/nvm"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_version_key_numeric_components() {
        assert_eq!(version_key("v1.10.0"), Some(vec![1, 10, 0]));
        assert_eq!(version_key("18.2.1"), Some(vec![18, 2, 1]));
        assert_eq!(version_key("current"), None);
    }

    #[test]
    fn test_version_ordering_is_numeric_not_lexicographic() {
        // Plain string sort would put v1.9.0 above v1.10.0.
        assert!(version_key("v1.10.0") > version_key("v1.9.0"));
        assert!(version_key("v1.9.0") > version_key("v1.2.0"));
    }

    #[test]
    fn test_latest_version_dir_picks_highest() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["v1.2.0", "v1.10.0", "v1.9.0"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        assert_eq!(
            latest_version_dir(dir.path()),
            Some("v1.10.0".to_string())
        );
    }

    #[test]
    fn test_latest_version_dir_ignores_non_version_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("v2.0.0")).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join("v9.9.9"), b"not a dir").unwrap();
        assert_eq!(latest_version_dir(dir.path()), Some("v2.0.0".to_string()));
    }

    #[test]
    fn test_resolve_unix_prefers_nvm_latest() {
        let home = tempfile::tempdir().unwrap();
        let versions = home.path().join(".nvm").join("versions").join("node");
        for name in ["v1.9.0", "v1.10.0"] {
            fs::create_dir_all(versions.join(name).join("bin")).unwrap();
        }

        let location = resolve_with_home(Some(home.path()), Platform::Unix);
        assert_eq!(location.runtime_command, "node");
        assert_eq!(location.package_manager_command, "npm");
        assert_eq!(
            location.path_prepend,
            vec![versions.join("v1.10.0").join("bin")]
        );
    }

    #[test]
    fn test_resolve_unix_skips_nvm_version_without_bin() {
        let home = tempfile::tempdir().unwrap();
        let versions = home.path().join(".nvm").join("versions").join("node");
        fs::create_dir_all(versions.join("v1.0.0")).unwrap();

        let location = resolve_with_home(Some(home.path()), Platform::Unix);
        // Falls through to system paths / bare commands; either way the
        // prepend invariant holds: every entry exists.
        for dir in &location.path_prepend {
            assert!(dir.is_dir());
        }
    }

    #[test]
    fn test_resolve_prepend_entries_exist() {
        let home = tempfile::tempdir().unwrap();
        let location = resolve_with_home(Some(home.path()), Platform::Unix);
        for dir in &location.path_prepend {
            assert!(dir.is_dir());
        }
    }

    #[test]
    fn test_resolve_windows_bare_fallback_commands() {
        let home = tempfile::tempdir().unwrap();
        let location = resolve_with_home(Some(home.path()), Platform::Windows);
        assert_eq!(location.runtime_command, "node.exe");
        assert_eq!(location.package_manager_command, "npm.cmd");
    }

    #[test]
    fn test_parse_nvm_windows_current() {
        let settings = "root: C:\\Users\\me\\AppData\\Roaming\\nvm\r\n\
                        path: C:\\Program Files\\nodejs\r\n\
                        current: 18.17.1\r\n";
        assert_eq!(
            parse_nvm_windows_current(settings),
            Some("18.17.1".to_string())
        );
        assert_eq!(parse_nvm_windows_current("root: C:\\nvm\n"), None);
        assert_eq!(parse_nvm_windows_current("current:   \n"), None);
    }

    #[test]
    fn test_amended_path_prepends_in_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let amended = amended_path(&[a.path().to_path_buf(), b.path().to_path_buf()]);
        let parts: Vec<PathBuf> = std::env::split_paths(&amended).collect();
        assert_eq!(parts[0], a.path());
        assert_eq!(parts[1], b.path());
        // Inherited PATH is preserved after the prepend.
        let inherited: Vec<PathBuf> =
            std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default()).collect();
        assert_eq!(parts.len(), inherited.len() + 2);
    }

    #[tokio::test]
    async fn test_check_available_missing_commands() {
        let location = RuntimeLocation {
            runtime_command: "definitely-not-a-runtime".to_string(),
            package_manager_command: "definitely-not-a-pm".to_string(),
            path_prepend: Vec::new(),
        };
        let availability = check_available(&location, Duration::from_secs(5)).await;
        assert!(!availability.available);
        assert!(availability.runtime_version.is_none());
        assert!(availability.package_manager_version.is_none());
    }
}
