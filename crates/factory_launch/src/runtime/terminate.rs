//! Platform-specific process-tree termination
//!
//! Dev-server commands routinely fork further children (bundler, API
//! server); signalling only the direct child leaks the rest. This is the
//! single platform branch in the supervisor: Unix signals the child's
//! process group, Windows delegates to `taskkill /T`.

use std::io;

/// Terminate `pid` and its descendants. `forced` escalates from the graceful
/// request (SIGTERM / plain taskkill) to an unconditional kill.
///
/// On Unix the supervisor spawns children into their own process group, so
/// `pid` doubles as the process-group id.
#[cfg(unix)]
pub async fn terminate_tree(pid: u32, forced: bool) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // killpg(0) addresses the caller's own process group; never do that.
    if pid == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to signal process group 0",
        ));
    }

    let signal = if forced {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };
    killpg(Pid::from_raw(pid as i32), signal).map_err(io::Error::from)
}

#[cfg(windows)]
pub async fn terminate_tree(pid: u32, forced: bool) -> io::Result<()> {
    use tokio::process::Command;

    if pid == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to signal pid 0",
        ));
    }

    let mut cmd = Command::new("taskkill");
    cmd.args(["/T", "/PID", &pid.to_string()]);
    if forced {
        cmd.arg("/F");
    }
    let output = cmd.output().await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "taskkill exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
