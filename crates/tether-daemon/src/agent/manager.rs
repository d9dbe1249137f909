//! Agent registry and lifecycle management
//!
//! The manager owns every [`AgentInstance`], spawns their PTYs through the
//! [`PtyManager`], and fans agent events out to subscribers over a broadcast
//! channel. Each spawned agent gets a monitor task that translates raw PTY
//! events into status transitions and history updates.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use tether_core::{current_time_millis, AgentId, AgentSpec, Preset, TetherError};
use tether_protocol::{AgentConfig, AgentInfo, AgentStatus, ScrollbackLine, TerminalSize};

use crate::agent::instance::AgentInstance;
use crate::pty::{PtyEvent, PtyManager};

/// Broadcast channel capacity for agent events. Slow subscribers lag and
/// miss events rather than block the monitor tasks.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events fanned out to every subscriber (connection handlers, mostly)
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A new agent was created
    Created(AgentInfo),
    /// Raw terminal output from an agent
    Output { agent_id: AgentId, data: Bytes },
    /// An agent's lifecycle status changed
    StatusChanged {
        agent_id: AgentId,
        status: AgentStatus,
    },
    /// An agent's process exited
    Exited {
        agent_id: AgentId,
        exit_code: Option<i32>,
    },
}

/// Registry of live agents
pub struct AgentManager {
    agents: Arc<DashMap<AgentId, Arc<AgentInstance>>>,
    ptys: Arc<PtyManager>,
    events: broadcast::Sender<AgentEvent>,
    /// Hard cap on concurrently live agents
    max_agents: usize,
    /// Fallback working directory when a config omits one
    default_cwd: PathBuf,
}

impl AgentManager {
    /// Create a manager spawning through the given PTY manager
    pub fn new(ptys: Arc<PtyManager>, max_agents: usize, default_cwd: PathBuf) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            agents: Arc::new(DashMap::new()),
            ptys,
            events,
            max_agents,
            default_cwd,
        }
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Create an agent from a wire-level config.
    ///
    /// Validation failures (bad shell, bad cwd, capacity) surface here before
    /// any process exists.
    pub fn create_agent(
        &self,
        config: AgentConfig,
        size: TerminalSize,
    ) -> Result<AgentInfo, TetherError> {
        let spec = AgentSpec::from_config(config, &self.default_cwd);
        self.create_from_spec(spec, size)
    }

    /// Create an agent from a fully resolved spec
    pub fn create_from_spec(
        &self,
        spec: AgentSpec,
        size: TerminalSize,
    ) -> Result<AgentInfo, TetherError> {
        if self.live_count() >= self.max_agents {
            return Err(TetherError::AgentLimit {
                max: self.max_agents,
            });
        }

        let agent_id = AgentId::generate();
        let pty = self.ptys.spawn(
            agent_id.clone(),
            spec.cwd.clone(),
            spec.env.clone(),
            size,
        )?;

        let now = current_time_millis();
        let instance = Arc::new(AgentInstance::new(agent_id.clone(), spec, pty, now));
        self.agents.insert(agent_id.clone(), Arc::clone(&instance));

        self.spawn_monitor(Arc::clone(&instance));
        instance.schedule_auto_run();

        let info = instance.snapshot();
        tracing::info!("Created agent {} ({})", info.id, info.name);
        let _ = self.events.send(AgentEvent::Created(info.clone()));
        Ok(info)
    }

    /// Expand a preset into one agent per entry. Stops at the first failure,
    /// leaving already-created agents running.
    pub fn create_from_preset(
        &self,
        preset: &Preset,
        size: TerminalSize,
    ) -> Result<Vec<AgentInfo>, TetherError> {
        let mut created = Vec::new();
        for spec in preset.specs() {
            created.push(self.create_from_spec(spec, size)?);
        }
        Ok(created)
    }

    /// Write raw bytes to an agent's terminal. Returns false for unknown
    /// agents; exited agents are reaped from the registry by their monitor
    /// and count as unknown.
    pub fn write(&self, agent_id: &AgentId, data: &[u8]) -> bool {
        let Some(instance) = self.get(agent_id) else {
            return false;
        };
        instance.pty.write(data);
        true
    }

    /// Resize an agent's terminal. Returns false for unknown agents.
    pub fn resize(&self, agent_id: &AgentId, cols: u16, rows: u16) -> bool {
        let Some(instance) = self.get(agent_id) else {
            return false;
        };
        instance.pty.resize(cols, rows);
        true
    }

    /// Kill an agent's process. Returns false for unknown agents.
    pub fn kill(&self, agent_id: &AgentId, signal: Option<i32>) -> bool {
        let Some(instance) = self.get(agent_id) else {
            return false;
        };
        instance.cancel_token().cancel();
        instance.pty.kill(signal);
        true
    }

    /// Get an agent by id
    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<AgentInstance>> {
        self.agents.get(agent_id).map(|r| Arc::clone(&r))
    }

    /// Snapshot every live agent, oldest first
    pub fn list(&self) -> Vec<AgentInfo> {
        let mut infos: Vec<AgentInfo> = self.agents.iter().map(|r| r.snapshot()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Number of agents not yet in a terminal state
    pub fn live_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|r| !r.status().is_terminal())
            .count()
    }

    /// Fetch scrollback lines for an agent
    pub fn scrollback(
        &self,
        agent_id: &AgentId,
        from_line: u64,
        count: u64,
    ) -> Option<(Vec<ScrollbackLine>, u64)> {
        let instance = self.get(agent_id)?;
        let history = instance.history.lock().unwrap_or_else(|p| p.into_inner());
        Some((history.range(from_line, count), history.total_lines()))
    }

    /// Demote agents quiet for longer than `threshold_ms` from running to
    /// idle. Driven by a periodic tick; `now` is injected for testability.
    pub fn poll_idle_at(&self, now: u64, threshold_ms: u64) {
        for entry in self.agents.iter() {
            let instance = entry.value();
            if instance.status() != AgentStatus::Running {
                continue;
            }
            if now.saturating_sub(instance.last_activity()) >= threshold_ms
                && instance.transition(AgentStatus::Idle)
            {
                let _ = self.events.send(AgentEvent::StatusChanged {
                    agent_id: instance.id.clone(),
                    status: AgentStatus::Idle,
                });
            }
        }
    }

    /// Kill every live agent. Used during shutdown.
    pub fn kill_all(&self, signal: Option<i32>) {
        for entry in self.agents.iter() {
            entry.value().cancel_token().cancel();
            entry.value().pty.kill(signal);
        }
    }

    /// Monitor task: translates PTY events into status transitions, history
    /// updates, and broadcast events for one agent.
    fn spawn_monitor(&self, instance: Arc<AgentInstance>) {
        let events = self.events.clone();
        let ptys = Arc::clone(&self.ptys);
        let agents = Arc::clone(&self.agents);
        let mut pty_events = instance.pty.subscribe();

        tokio::spawn(async move {
            loop {
                match pty_events.recv().await {
                    Ok(PtyEvent::Data(data)) => {
                        let now = current_time_millis();
                        instance.touch(now);

                        // first output confirms the shell came up
                        let promoted = match instance.status() {
                            AgentStatus::Starting | AgentStatus::Idle => {
                                instance.transition(AgentStatus::Running)
                            }
                            _ => false,
                        };
                        if promoted {
                            let _ = events.send(AgentEvent::StatusChanged {
                                agent_id: instance.id.clone(),
                                status: AgentStatus::Running,
                            });
                        }

                        {
                            let mut history =
                                instance.history.lock().unwrap_or_else(|p| p.into_inner());
                            history.feed(&data);
                        }

                        let _ = events.send(AgentEvent::Output {
                            agent_id: instance.id.clone(),
                            data,
                        });
                    }
                    Ok(PtyEvent::Exited { code }) => {
                        instance.record_exit(code);
                        instance.cancel_token().cancel();
                        let status = if instance.status() == AgentStatus::Starting && code != Some(0)
                        {
                            AgentStatus::Error
                        } else {
                            AgentStatus::Exited
                        };
                        instance.transition(status);
                        ptys.remove(&instance.id);
                        // destroyed on exit: subscribers seeing the exit
                        // events observe a registry without this agent
                        agents.remove(&instance.id);

                        tracing::info!(
                            "Agent {} exited with code {:?}",
                            instance.id,
                            code
                        );
                        let _ = events.send(AgentEvent::StatusChanged {
                            agent_id: instance.id.clone(),
                            status,
                        });
                        let _ = events.send(AgentEvent::Exited {
                            agent_id: instance.id.clone(),
                            exit_code: code,
                        });
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            "Agent {} monitor lagged, {} events dropped",
                            instance.id,
                            missed
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
