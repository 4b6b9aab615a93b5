//! Factory Launch
//!
//! Launcher core for the factory management dev stack: locate a Node.js/npm
//! installation, install project dependencies, run `npm run dev` as a
//! supervised child process, stream its output, and stop it cleanly.
//!
//! # Overview
//!
//! Three components, consumed through one session facade:
//! - **Resolver** finds a usable runtime (nvm, nvm-windows, vendor paths)
//!   and the PATH prepend needed to use it; read-only, never fails.
//! - **Installer** idempotently runs the package manager's `install` per
//!   target directory, keyed on a `node_modules` marker.
//! - **Supervisor** owns the single dev-server process: spawn, line-by-line
//!   output streaming, and graceful-then-forced tree termination.
//!
//! # Example
//!
//! ```no_run
//! use factory_launch::LauncherSession;
//!
//! # async fn run() -> Result<(), factory_launch::LauncherError> {
//! let session = LauncherSession::new(std::env::current_dir().unwrap())?;
//! session.require_runtime().await?;
//! session.ensure_installed().await?;
//! session.on_line(|line| println!("{line}"));
//! session.start().await?;
//! // ... later
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod project;
pub mod runtime;
pub mod session;

pub use config::{ConfigError, LauncherConfig};
pub use project::ProjectLayout;
pub use runtime::{
    check_available, resolve, InstallError, InstallTarget, Installer, Platform,
    RuntimeAvailability, RuntimeLocation, StartSpec, StateSnapshot, Supervisor, SupervisorError,
    SupervisorEvent, SupervisorState,
};
pub use session::{LauncherError, LauncherSession};
