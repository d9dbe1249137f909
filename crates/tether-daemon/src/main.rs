//! tether daemon
//!
//! Binds the TCP server, wires up the shared state and background sweeps,
//! and runs until a signal arrives. Shutdown tears components down in
//! reverse startup order under one global hard timeout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::{current_time_millis, DaemonConfig, SessionId, ShutdownCoordinator};
use tether_daemon::server::Server;
use tether_daemon::{tasks, DaemonState};

/// Hard ceiling on graceful shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "tetherd")]
#[command(about = "Daemon for jointly controlled terminal agent sessions")]
#[command(version)]
struct Args {
    /// TCP port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print a fresh pairing code on startup
    #[arg(long)]
    pair: bool,
}

/// Write the session token where clients can read it. Later connections
/// authenticate with this token; pairing codes are single-use.
fn persist_token(data_dir: &Path, token: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join("token");
    std::fs::write(&path, format!("{}\n", token))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tetherd {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = DaemonConfig::default();
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    config.log_level = args.log_level.clone();
    let config = config.validated();

    let state = Arc::new(DaemonState::new(config));

    // a session must exist before anyone can pair or connect
    let session_id = SessionId::generate();
    let now = current_time_millis();
    let token = state.tokens.issue_at(&session_id, now);
    match persist_token(&state.config.data_dir, &token) {
        Ok(path) => tracing::info!("Session token written to {}", path.display()),
        Err(e) => {
            tracing::warn!("Failed to persist session token: {}", e);
            println!("Session token: {}", token);
        }
    }
    if args.pair {
        let code = state.pairing.issue_at(&session_id, now);
        println!("Pairing code: {} (valid for a few minutes)", code);
    }

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = Server::new(Arc::clone(&state), cancel.clone());
    let targeted_tx = server.targeted_sender();

    let sweep = tasks::spawn_idle_sweep(Arc::clone(&state), targeted_tx, cancel.clone());
    let cleanup = tasks::spawn_security_cleanup(Arc::clone(&state), cancel.clone());
    let reaper = tasks::spawn_agent_reaper(Arc::clone(&state), cancel.clone());

    let mut coordinator = ShutdownCoordinator::new();
    coordinator.register("background-tasks", {
        let cancel = cancel.clone();
        move || async move {
            cancel.cancel();
            let _ = tokio::join!(sweep, cleanup, reaper);
            Ok(())
        }
    });
    coordinator.register("agents", {
        let state = Arc::clone(&state);
        move || async move {
            state.agents.kill_all(None);
            Ok(())
        }
    });

    // bind errors exit here, before any shutdown handler runs
    let result = server.run().await;
    if let Err(e) = &result {
        tracing::error!("Server failed: {:#}", e);
        return result;
    }

    tracing::info!("Shutting down");
    coordinator.run(SHUTDOWN_TIMEOUT).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
