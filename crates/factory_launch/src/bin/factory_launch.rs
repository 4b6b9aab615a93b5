//! Terminal front end
//!
//! Thin view layer over the session facade: resolve, install, start, then
//! wait for Ctrl+C or a natural exit and stop cleanly. Takes an optional
//! project root as its only argument.

use factory_launch::{LauncherSession, SupervisorState};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let project_root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    log::info!("Factory launcher starting in {}", project_root.display());

    let session = match LauncherSession::new(project_root) {
        Ok(session) => session,
        Err(e) => {
            log::error!("Could not open launcher session: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = session.require_runtime().await {
        log::error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = session.ensure_installed().await {
        log::error!("Failed to install dependencies: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = session.start().await {
        log::error!("Failed to start application: {}", e);
        std::process::exit(1);
    }

    // Wait for Ctrl+C or the dev server exiting on its own.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, stopping application...");
        let _ = shutdown_tx.send(());
    })
    .expect("Error setting Ctrl+C handler");

    let failed = loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break false,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                match session.state().await.state {
                    SupervisorState::Failed => break true,
                    SupervisorState::Stopped => break false,
                    _ => {}
                }
            }
        }
    };

    session.stop().await;
    log::info!("Factory launcher exiting");
    if failed {
        std::process::exit(1);
    }
}
