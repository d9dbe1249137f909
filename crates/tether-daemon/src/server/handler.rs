//! Per-connection handler
//!
//! Each accepted connection authenticates with a token or pairing code
//! before anything else, then enters a select loop that interleaves client
//! frames, agent events, and targeted notices from other handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use tether_core::{current_time_millis, AgentId, ClientId, DenyReason, SessionId};
use tether_protocol::{ClientMessage, ServerCodec, ServerMessage};

use crate::agent::AgentEvent;
use crate::arbiter::audit::{AuditEntry, Decision};
use crate::arbiter::Verdict;
use crate::security::{classify, sanitize};
use crate::server::registry::ClientSession;
use crate::server::TargetedMessage;
use crate::state::DaemonState;

/// How long an unauthenticated connection may sit before being dropped
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifier reasons that block the input instead of asking for approval
const BLOCKING_REASONS: &[&str] = &["remote-script-execution"];

type ClientFramed = Framed<TcpStream, ServerCodec>;

/// Drive one client connection from accept to teardown
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<DaemonState>,
    targeted_tx: broadcast::Sender<TargetedMessage>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, ServerCodec::new());
    let now = current_time_millis();

    if let Err(e) = state.rate_limiter.check_at(&peer.ip().to_string(), now) {
        tracing::warn!("Rate limited connection from {}: {}", peer, e);
        let _ = framed
            .send(ServerMessage::Error {
                message: e.to_string(),
                agent_id: None,
                timestamp: now,
            })
            .await;
        return Ok(());
    }

    let session = match authenticate(&mut framed, &state).await? {
        Some(session) => session,
        None => return Ok(()),
    };
    let client_id = session.client_id.clone();
    state.clients.insert(Arc::clone(&session));
    tracing::info!(
        "Client {} authenticated from {} ({:?})",
        client_id,
        peer,
        session.client_type
    );

    framed
        .send(ServerMessage::SessionInfo {
            session_id: session.session_id.to_string(),
            is_read_only: session.is_read_only(),
            agents: state.agents.list(),
            timestamp: current_time_millis(),
        })
        .await?;

    let mut agent_events = state.agents.subscribe();
    let mut targeted_rx = targeted_tx.subscribe();

    let result = connection_loop(
        &mut framed,
        &session,
        &state,
        &targeted_tx,
        &mut agent_events,
        &mut targeted_rx,
        &shutdown,
    )
    .await;

    // teardown: queues, grants, idle detector, registry
    state.clients.remove(&client_id);
    state.arbiter.disconnect_at(&client_id, current_time_millis());
    tracing::info!("Client {} disconnected", client_id);

    result
}

/// First frame must be a handshake carrying a valid token or pairing code.
/// Returns `None` when authentication fails (the error has been sent).
async fn authenticate(
    framed: &mut ClientFramed,
    state: &DaemonState,
) -> Result<Option<Arc<ClientSession>>> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next())
        .await
        .context("Handshake timed out")?;

    let Some(frame) = first else {
        return Ok(None);
    };
    let message = frame.context("Failed to read handshake")?;

    let (token, pairing_code, client_type) = match message {
        ClientMessage::Handshake {
            token,
            pairing_code,
            client_type,
        } => (token, pairing_code, client_type),
        _ => {
            send_error(framed, "Handshake required", None).await?;
            return Ok(None);
        }
    };

    let now = current_time_millis();
    let session_id: Result<SessionId, String> = if let Some(token) = token {
        state
            .tokens
            .validate_at(&token, now)
            .map_err(|e| e.to_string())
    } else if let Some(code) = pairing_code {
        state
            .pairing
            .redeem_at(&code, now)
            .map_err(|e| e.to_string())
    } else {
        Err("Handshake carried neither token nor pairing code".to_string())
    };

    match session_id {
        Ok(session_id) => Ok(Some(Arc::new(ClientSession::new(
            ClientId::generate(),
            session_id,
            client_type,
            now,
        )))),
        Err(message) => {
            tracing::warn!("Handshake rejected: {}", message);
            send_error(framed, &message, None).await?;
            Ok(None)
        }
    }
}

async fn connection_loop(
    framed: &mut ClientFramed,
    session: &Arc<ClientSession>,
    state: &Arc<DaemonState>,
    targeted_tx: &broadcast::Sender<TargetedMessage>,
    agent_events: &mut broadcast::Receiver<AgentEvent>,
    targeted_rx: &mut broadcast::Receiver<TargetedMessage>,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            frame = framed.next() => {
                match frame {
                    Some(Ok(message)) => {
                        dispatch(message, framed, session, state, targeted_tx).await?;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Client {} protocol error: {}", session.client_id, e);
                        send_error(framed, &e.to_string(), None).await?;
                    }
                    None => break,
                }
            }

            event = agent_events.recv() => {
                match event {
                    Ok(event) => forward_agent_event(framed, session, event).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Client {} lagged by {} agent events", session.client_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            notice = targeted_rx.recv() => {
                match notice {
                    Ok(notice) if notice.client_id == session.client_id => {
                        framed.send(notice.message).await?;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

async fn dispatch(
    message: ClientMessage,
    framed: &mut ClientFramed,
    session: &Arc<ClientSession>,
    state: &Arc<DaemonState>,
    targeted_tx: &broadcast::Sender<TargetedMessage>,
) -> Result<()> {
    let now = current_time_millis();
    match message {
        ClientMessage::Handshake { .. } => {
            send_error(framed, "Already authenticated", None).await?;
        }

        ClientMessage::Input { agent_id, data } => {
            handle_input(framed, session, state, targeted_tx, agent_id, data).await?;
        }

        ClientMessage::Resize {
            agent_id,
            cols,
            rows,
        } => {
            // bypasses the arbiter: any client may resize
            if !state.agents.resize(&AgentId::from(agent_id.clone()), cols, rows) {
                send_error(framed, "Unknown agent", Some(agent_id)).await?;
            }
        }

        ClientMessage::CreateAgent { config } => {
            let size = Default::default();
            match state.agents.create_agent(config, size) {
                // the agent_created broadcast reaches this client too
                Ok(info) => {
                    tracing::debug!(
                        "Client {} created agent {}",
                        session.client_id,
                        info.id
                    );
                }
                Err(e) => send_error(framed, &e.to_string(), None).await?,
            }
        }

        ClientMessage::KillAgent { agent_id, signal } => {
            // bypasses the arbiter
            if !state.agents.kill(&AgentId::from(agent_id.clone()), signal) {
                send_error(framed, "Unknown agent", Some(agent_id)).await?;
            }
        }

        ClientMessage::SwitchAgent { agent_id } => {
            let next = AgentId::from(agent_id.clone());
            if state.agents.get(&next).is_none() {
                send_error(framed, "Unknown agent", Some(agent_id)).await?;
                return Ok(());
            }
            let previous = session.set_focused_agent(Some(next));
            // walking away from an agent gives up its writer grant
            if let Some(previous) = previous {
                state.arbiter.release_at(&previous, &session.client_id, now);
            }
        }

        ClientMessage::ListAgents => {
            framed
                .send(ServerMessage::AgentList {
                    agents: state.agents.list(),
                    timestamp: now,
                })
                .await?;
        }

        ClientMessage::Ping => {
            framed.send(ServerMessage::Pong { timestamp: now }).await?;
        }

        ClientMessage::ModeChange { read_only } => {
            session.set_read_only(read_only);
            framed
                .send(ServerMessage::ModeChanged {
                    is_read_only: read_only,
                    timestamp: now,
                })
                .await?;
        }

        ClientMessage::ScrollbackRequest {
            session_id,
            from_line,
            count,
        } => {
            let agent_id = AgentId::from(session_id.clone());
            match state.agents.scrollback(&agent_id, from_line, count) {
                Some((lines, total_lines)) => {
                    framed
                        .send(ServerMessage::ScrollbackResponse {
                            lines,
                            from_line,
                            total_lines,
                        })
                        .await?;
                }
                None => send_error(framed, "Unknown agent", Some(session_id)).await?,
            }
        }
    }
    Ok(())
}

async fn handle_input(
    framed: &mut ClientFramed,
    session: &Arc<ClientSession>,
    state: &Arc<DaemonState>,
    targeted_tx: &broadcast::Sender<TargetedMessage>,
    agent_id: String,
    data: Vec<u8>,
) -> Result<()> {
    let now = current_time_millis();
    let agent = AgentId::from(agent_id.clone());

    // unknown ids never reach the arbiter, so no writer slot or audit
    // entry exists for an agent that was never created or already exited
    if state.agents.get(&agent).is_none() {
        send_error(framed, "Unknown agent", Some(agent_id)).await?;
        return Ok(());
    }

    if session.is_read_only() {
        state.arbiter.audit().record(AuditEntry {
            timestamp: now,
            client_id: session.client_id.clone(),
            agent_id: agent,
            decision: Decision::Deny,
            reason: DenyReason::ReadOnly.as_str().to_string(),
        });
        send_error(framed, "Input denied: session is read-only", Some(agent_id)).await?;
        return Ok(());
    }

    let sanitized = sanitize(&data);
    let text = String::from_utf8_lossy(&sanitized);
    if let Some(suspicion) = classify(&text) {
        if BLOCKING_REASONS.contains(&suspicion.reason) {
            framed
                .send(ServerMessage::CommandBlocked {
                    agent_id,
                    command: text.into_owned(),
                    reason: suspicion.reason.to_string(),
                    timestamp: now,
                })
                .await?;
            return Ok(());
        }
        framed
            .send(ServerMessage::ApprovalRequest {
                agent_id: agent_id.clone(),
                command: text.to_string(),
                reason: suspicion.reason.to_string(),
                timestamp: now,
            })
            .await?;
    }

    let verdict = state.arbiter.submit_input_at(
        &agent,
        &session.client_id,
        session.client_type.priority_class(),
        now,
    );
    match verdict {
        Verdict::Admit { preempted } => {
            if let Some(preempted) = preempted {
                let _ = targeted_tx.send(TargetedMessage {
                    client_id: preempted,
                    message: ServerMessage::Error {
                        message: format!(
                            "A higher-priority client took control of agent {}",
                            agent_id
                        ),
                        agent_id: Some(agent_id.clone()),
                        timestamp: now,
                    },
                });
            }
            if !state.agents.write(&agent, &sanitized) {
                send_error(framed, "Unknown agent", Some(agent_id)).await?;
            }
        }
        Verdict::Queued => {
            send_error(
                framed,
                "Another client is writing to this agent; queued for control",
                Some(agent_id),
            )
            .await?;
        }
        Verdict::Denied(reason) => {
            send_error(
                framed,
                &format!("Input denied: {}", reason),
                Some(agent_id),
            )
            .await?;
        }
    }
    Ok(())
}

async fn forward_agent_event(
    framed: &mut ClientFramed,
    session: &Arc<ClientSession>,
    event: AgentEvent,
) -> Result<()> {
    let now = current_time_millis();
    match event {
        AgentEvent::Output { agent_id, data } => {
            // output goes to clients focused on the agent; an unfocused
            // client sees everything
            let focused = session.focused_agent();
            if focused.is_none() || focused.as_ref() == Some(&agent_id) {
                framed
                    .send(ServerMessage::Output {
                        agent_id: agent_id.to_string(),
                        data: data.to_vec(),
                        timestamp: now,
                    })
                    .await?;
            }
        }
        AgentEvent::Created(agent) => {
            framed
                .send(ServerMessage::AgentCreated {
                    agent,
                    timestamp: now,
                })
                .await?;
        }
        AgentEvent::StatusChanged { agent_id, status } => {
            framed
                .send(ServerMessage::AgentStatus {
                    agent_id: agent_id.to_string(),
                    status,
                    timestamp: now,
                })
                .await?;
        }
        AgentEvent::Exited {
            agent_id,
            exit_code,
        } => {
            framed
                .send(ServerMessage::AgentExited {
                    agent_id: agent_id.to_string(),
                    exit_code,
                    signal: None,
                    timestamp: now,
                })
                .await?;
        }
    }
    Ok(())
}

async fn send_error(
    framed: &mut ClientFramed,
    message: &str,
    agent_id: Option<String>,
) -> Result<()> {
    framed
        .send(ServerMessage::Error {
            message: message.to_string(),
            agent_id,
            timestamp: current_time_millis(),
        })
        .await?;
    Ok(())
}
