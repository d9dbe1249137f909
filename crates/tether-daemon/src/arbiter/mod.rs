//! Input arbitration
//!
//! At most one active writer per agent. Everyone else observes, waits in a
//! bounded contender queue, or is denied, depending on configuration. Every
//! decision lands in the audit log. Time flows in through `*_at` parameters;
//! the daemon's sweep task supplies wall-clock time.

pub mod audit;
pub mod idle;
pub mod queue;

use dashmap::DashMap;

use tether_core::{AgentId, ClientId, DenyReason, NonWriterPolicy};

use audit::{AuditEntry, AuditLog, Decision};
use idle::IdleDetector;
use queue::{Contender, ContenderQueue, PushError};

pub use audit::Decision as AuditDecision;

/// Outcome of an input submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Input should be forwarded to the agent. If a lower-class writer was
    /// preempted to make room, it is named so the server can notify it.
    Admit { preempted: Option<ClientId> },
    /// Client joined the contender queue; input is not forwarded
    Queued,
    /// Input refused
    Denied(DenyReason),
}

/// A writer demoted by the idle sweep, and who took over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleDemotion {
    pub agent_id: AgentId,
    pub demoted: ClientId,
    pub promoted: ClientId,
}

#[derive(Debug)]
struct Grant {
    client_id: ClientId,
    class: u8,
}

#[derive(Debug)]
struct WriterSlot {
    writer: Option<Grant>,
    queue: ContenderQueue,
    /// Writer demoted by the last idle sweep; its next submission is
    /// answered with [`DenyReason::IdlePreempted`] so the client learns
    /// why it lost the grant
    idle_demoted: Option<ClientId>,
}

/// The arbitration engine
pub struct InputArbiter {
    slots: DashMap<AgentId, WriterSlot>,
    idle: IdleDetector,
    audit: AuditLog,
    policy: NonWriterPolicy,
    max_queue_len: usize,
}

impl InputArbiter {
    /// Create an arbiter with the given non-writer policy and queue bound
    pub fn new(policy: NonWriterPolicy, max_queue_len: usize) -> Self {
        Self {
            slots: DashMap::new(),
            idle: IdleDetector::new(),
            audit: AuditLog::new(),
            policy,
            max_queue_len,
        }
    }

    /// Decide what happens to one input event.
    ///
    /// The active writer is renewed and admitted. With no writer the client
    /// takes the grant. A higher-class client preempts a lower-class writer.
    /// Everyone else is queued or denied per the configured policy.
    pub fn submit_input_at(
        &self,
        agent_id: &AgentId,
        client_id: &ClientId,
        class: u8,
        now: u64,
    ) -> Verdict {
        let mut slot = self
            .slots
            .entry(agent_id.clone())
            .or_insert_with(|| WriterSlot {
                writer: None,
                queue: ContenderQueue::new(self.max_queue_len),
                idle_demoted: None,
            });

        match &slot.writer {
            None => {
                slot.writer = Some(Grant {
                    client_id: client_id.clone(),
                    class,
                });
                if slot.idle_demoted.as_ref() == Some(client_id) {
                    slot.idle_demoted = None;
                }
                self.idle.touch(client_id, now);
                self.record(now, client_id, agent_id, Decision::Admit, "granted");
                Verdict::Admit { preempted: None }
            }
            Some(grant) if grant.client_id == *client_id => {
                self.idle.touch(client_id, now);
                self.record(now, client_id, agent_id, Decision::Admit, "writer");
                Verdict::Admit { preempted: None }
            }
            Some(grant) if class > grant.class => {
                let demoted = grant.client_id.clone();
                slot.writer = Some(Grant {
                    client_id: client_id.clone(),
                    class,
                });
                // the demoted client stays connected as an observer
                slot.queue.remove(&demoted);
                self.idle.touch(client_id, now);
                self.record(now, &demoted, agent_id, Decision::Demote, "preempted");
                self.record(now, client_id, agent_id, Decision::Admit, "preempt");
                Verdict::Admit {
                    preempted: Some(demoted),
                }
            }
            Some(_) if slot.idle_demoted.as_ref() == Some(client_id) => {
                slot.idle_demoted = None;
                self.record(
                    now,
                    client_id,
                    agent_id,
                    Decision::Deny,
                    DenyReason::IdlePreempted.as_str(),
                );
                Verdict::Denied(DenyReason::IdlePreempted)
            }
            Some(_) => match self.policy {
                NonWriterPolicy::Deny => {
                    self.record(
                        now,
                        client_id,
                        agent_id,
                        Decision::Deny,
                        DenyReason::NotActiveWriter.as_str(),
                    );
                    Verdict::Denied(DenyReason::NotActiveWriter)
                }
                NonWriterPolicy::Enqueue => {
                    let push = slot.queue.push(Contender {
                        client_id: client_id.clone(),
                        class,
                        enqueued_at: now,
                    });
                    match push {
                        Ok(()) => {
                            self.record(now, client_id, agent_id, Decision::Queue, "waiting");
                            Verdict::Queued
                        }
                        Err(PushError::Full) => {
                            self.record(
                                now,
                                client_id,
                                agent_id,
                                Decision::Deny,
                                DenyReason::QueueFull.as_str(),
                            );
                            Verdict::Denied(DenyReason::QueueFull)
                        }
                    }
                }
            },
        }
    }

    /// Voluntarily give up the writer grant. Returns the promoted contender,
    /// if any. A no-op when the client does not hold the grant.
    pub fn release_at(
        &self,
        agent_id: &AgentId,
        client_id: &ClientId,
        now: u64,
    ) -> Option<ClientId> {
        let mut slot = self.slots.get_mut(agent_id)?;
        if slot.writer.as_ref()?.client_id != *client_id {
            return None;
        }
        slot.writer = None;
        self.promote_next(&mut slot, agent_id, now)
    }

    /// Tear a client out of the arbiter on disconnect: idle-detector entry,
    /// every queue, and any held grants. Returns the clients promoted in
    /// its place, per agent.
    pub fn disconnect_at(&self, client_id: &ClientId, now: u64) -> Vec<(AgentId, ClientId)> {
        self.idle.unregister(client_id);

        let mut promoted = Vec::new();
        for mut entry in self.slots.iter_mut() {
            let agent_id = entry.key().clone();
            let slot = entry.value_mut();
            slot.queue.remove(client_id);
            if slot.idle_demoted.as_ref() == Some(client_id) {
                slot.idle_demoted = None;
            }
            if slot
                .writer
                .as_ref()
                .is_some_and(|g| g.client_id == *client_id)
            {
                slot.writer = None;
                if let Some(next) = self.promote_next(slot, &agent_id, now) {
                    promoted.push((agent_id, next));
                }
            }
        }
        promoted
    }

    /// Demote lowest-class writers that have been quiet for `threshold_ms`
    /// while a contender waits. Demoted clients stay connected as observers.
    pub fn sweep_idle_at(&self, now: u64, threshold_ms: u64) -> Vec<IdleDemotion> {
        let mut demotions = Vec::new();
        for mut entry in self.slots.iter_mut() {
            let agent_id = entry.key().clone();
            let slot = entry.value_mut();

            let demote = match &slot.writer {
                Some(grant) => {
                    grant.class == 0
                        && !slot.queue.is_empty()
                        && self.idle.is_idle_at(&grant.client_id, now, threshold_ms)
                }
                None => false,
            };
            if !demote {
                continue;
            }

            let demoted = slot.writer.take().map(|g| g.client_id);
            let Some(demoted) = demoted else { continue };
            slot.idle_demoted = Some(demoted.clone());
            self.record(now, &demoted, &agent_id, Decision::Demote, "idle");

            if let Some(next) = self.promote_next(slot, &agent_id, now) {
                demotions.push(IdleDemotion {
                    agent_id,
                    demoted,
                    promoted: next,
                });
            }
        }
        demotions
    }

    /// The current active writer for an agent, if any
    pub fn active_writer(&self, agent_id: &AgentId) -> Option<ClientId> {
        self.slots
            .get(agent_id)?
            .writer
            .as_ref()
            .map(|g| g.client_id.clone())
    }

    /// Drop all arbitration state for an exited agent
    pub fn remove_agent(&self, agent_id: &AgentId) {
        self.slots.remove(agent_id);
    }

    /// The decision log
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn promote_next(
        &self,
        slot: &mut WriterSlot,
        agent_id: &AgentId,
        now: u64,
    ) -> Option<ClientId> {
        let next = slot.queue.pop_best()?;
        slot.writer = Some(Grant {
            client_id: next.client_id.clone(),
            class: next.class,
        });
        self.idle.touch(&next.client_id, now);
        self.record(now, &next.client_id, agent_id, Decision::Promote, "queued-next");
        Some(next.client_id)
    }

    fn record(
        &self,
        now: u64,
        client_id: &ClientId,
        agent_id: &AgentId,
        decision: Decision,
        reason: &str,
    ) {
        self.audit.record(AuditEntry {
            timestamp: now,
            client_id: client_id.clone(),
            agent_id: agent_id.clone(),
            decision,
            reason: reason.to_string(),
        });
    }
}
