//! Background maintenance tasks
//!
//! Periodic sweeps that keep the arbiter, the security managers, and the
//! agent registry tidy. Each task runs until the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tether_core::current_time_millis;
use tether_protocol::ServerMessage;

use crate::agent::AgentEvent;
use crate::server::TargetedMessage;
use crate::state::DaemonState;

/// How often the security managers are swept
const SECURITY_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Idle sweep: demote quiet writers with waiting contenders and mark quiet
/// agents idle. The demoted and promoted clients each get a notice.
pub fn spawn_idle_sweep(
    state: Arc<DaemonState>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let poll_interval = state.config.idle.poll_interval;
    let threshold_ms = state.config.idle.idle_threshold.as_millis() as u64;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = current_time_millis();
            state.agents.poll_idle_at(now, threshold_ms);

            for demotion in state.arbiter.sweep_idle_at(now, threshold_ms) {
                tracing::info!(
                    "Idle sweep: {} lost agent {} to {}",
                    demotion.demoted,
                    demotion.agent_id,
                    demotion.promoted
                );
                let _ = targeted_tx.send(TargetedMessage {
                    client_id: demotion.demoted,
                    message: ServerMessage::Error {
                        message: format!(
                            "Control of agent {} passed to a waiting client after inactivity",
                            demotion.agent_id
                        ),
                        agent_id: Some(demotion.agent_id.to_string()),
                        timestamp: now,
                    },
                });
            }
        }
    })
}

/// Sweep expired tokens, pairing codes, and rate-limit windows
pub fn spawn_security_cleanup(
    state: Arc<DaemonState>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SECURITY_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = current_time_millis();
            state.tokens.cleanup_at(now);
            state.pairing.cleanup_at(now);
            state.rate_limiter.cleanup_at(now);
        }
    })
}

/// Drop arbitration state for agents as they exit
pub fn spawn_agent_reaper(
    state: Arc<DaemonState>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = state.agents.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => {
                    match event {
                        Ok(AgentEvent::Exited { agent_id, .. }) => {
                            state.arbiter.remove_agent(&agent_id);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    })
}
