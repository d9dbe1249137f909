//! TCP server
//!
//! Accepts connections on the configured port and spawns one handler task
//! per client. A bind failure is fatal and surfaces immediately so the
//! daemon can exit without running shutdown handlers.

pub mod handler;
pub mod registry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tether_core::ClientId;
use tether_protocol::ServerMessage;

use crate::state::DaemonState;

/// Capacity for the cross-handler notice channel
const TARGETED_CHANNEL_CAPACITY: usize = 256;

/// A server message addressed to one specific client. Handlers subscribe to
/// the shared channel and forward only their own notices.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    /// Recipient
    pub client_id: ClientId,
    /// What to send
    pub message: ServerMessage,
}

/// The daemon's TCP server
pub struct Server {
    state: Arc<DaemonState>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a server over shared daemon state
    pub fn new(state: Arc<DaemonState>, shutdown: CancellationToken) -> Self {
        let (targeted_tx, _) = broadcast::channel(TARGETED_CHANNEL_CAPACITY);
        Self {
            state,
            targeted_tx,
            shutdown,
        }
    }

    /// Sender for targeted client notices, shared with background tasks
    pub fn targeted_sender(&self) -> broadcast::Sender<TargetedMessage> {
        self.targeted_tx.clone()
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Bind errors (port in use, permission denied) propagate immediately.
    pub async fn run(&self) -> Result<()> {
        let address = format!("0.0.0.0:{}", self.state.config.listen_port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind to {}", address))?;

        tracing::info!("Listening on {}", address);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Server accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let state = Arc::clone(&self.state);
                            let targeted_tx = self.targeted_tx.clone();
                            let shutdown = self.shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handler::handle_connection(
                                    stream, peer, state, targeted_tx, shutdown,
                                )
                                .await
                                {
                                    tracing::warn!("Client connection error: {:#}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
