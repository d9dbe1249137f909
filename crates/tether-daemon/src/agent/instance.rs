//! A single logical agent
//!
//! An agent owns exactly one PTY process running the configured shell and
//! tracks a small lifecycle state machine. For AI-CLI agents the launch
//! command is written as literal terminal input after a settle delay
//! ("shell-first"), so PATH and profile initialization mirror an
//! interactive session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tether_core::{AgentId, AgentSpec};
use tether_protocol::{AgentInfo, AgentKind, AgentStatus};

use crate::history::HistoryBuffer;
use crate::pty::PtyProcess;

/// Delay before the launch command is typed into the fresh shell
pub const AUTO_RUN_SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// Further delay before the initial prompt follows the launch command
pub const INITIAL_PROMPT_DELAY: Duration = Duration::from_millis(500);

/// Quote-escape an initial prompt for literal terminal entry
pub fn escape_prompt(prompt: &str) -> String {
    let escaped = prompt.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// One logical agent instance
pub struct AgentInstance {
    /// Unique id, never reused
    pub id: AgentId,
    /// Resolved configuration
    pub spec: AgentSpec,
    /// The PTY process this agent exclusively owns
    pub pty: Arc<PtyProcess>,
    /// Output history for scrollback backfill
    pub history: Mutex<HistoryBuffer>,
    /// Creation timestamp (unix millis)
    pub created_at: u64,

    status: RwLock<AgentStatus>,
    last_activity_ms: AtomicU64,
    exit_code: Mutex<Option<i32>>,
    /// Cancels scheduled auto-run writes when the agent is killed
    cancel: CancellationToken,
}

impl AgentInstance {
    /// Create an instance around an already-spawned PTY, in `Starting` state
    pub fn new(id: AgentId, spec: AgentSpec, pty: Arc<PtyProcess>, now: u64) -> Self {
        Self {
            id,
            spec,
            pty,
            history: Mutex::new(HistoryBuffer::new()),
            created_at: now,
            status: RwLock::new(AgentStatus::Starting),
            last_activity_ms: AtomicU64::new(now),
            exit_code: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Current status
    pub fn status(&self) -> AgentStatus {
        *self.status.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Attempt a status transition. Returns false (and leaves the status
    /// unchanged) if the state machine forbids it; terminal states are
    /// never left.
    pub fn transition(&self, next: AgentStatus) -> bool {
        let mut status = self.status.write().unwrap_or_else(|p| p.into_inner());
        if !status.can_transition_to(next) {
            return false;
        }
        tracing::debug!("Agent {} status {} -> {}", self.id, *status, next);
        *status = next;
        true
    }

    /// Record activity at the given time
    pub fn touch(&self, now: u64) {
        self.last_activity_ms.store(now, Ordering::Relaxed);
    }

    /// Last activity timestamp (unix millis)
    pub fn last_activity(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    /// Record the exit code once the process is gone
    pub fn record_exit(&self, code: Option<i32>) {
        *self.exit_code.lock().unwrap_or_else(|p| p.into_inner()) = code;
    }

    /// Exit code, once exited
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Cancellation token guarding this agent's scheduled writes
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Snapshot for protocol responses
    pub fn snapshot(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.to_string(),
            name: self.spec.name.clone(),
            kind: self.spec.kind.clone(),
            status: self.status(),
            created_at: self.created_at,
            last_activity_at: self.last_activity(),
            exit_code: self.exit_code(),
        }
    }

    /// Schedule the shell-first auto-run writes for an AI-CLI agent.
    ///
    /// Fire-and-forget: the scheduled writes are not part of the status
    /// state machine. If the agent is killed before a timer fires, the
    /// cancellation token wins and the write is silently dropped.
    pub fn schedule_auto_run(self: &Arc<Self>) {
        if self.spec.kind == AgentKind::Shell || !self.spec.auto_run {
            return;
        }
        let Some(command) = self.spec.command.clone() else {
            return;
        };

        let instance = Arc::clone(self);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(AUTO_RUN_SETTLE_DELAY) => {}
            }

            let mut launch = command;
            for arg in &instance.spec.args {
                launch.push(' ');
                launch.push_str(arg);
            }
            launch.push('\r');
            instance.pty.write(launch.as_bytes());
            tracing::debug!("Agent {} auto-run command written", instance.id);

            let Some(prompt) = instance.spec.initial_prompt.clone() else {
                return;
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(INITIAL_PROMPT_DELAY) => {}
            }

            let mut typed = escape_prompt(&prompt);
            typed.push('\r');
            instance.pty.write(typed.as_bytes());
            tracing::debug!("Agent {} initial prompt written", instance.id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_prompt_quotes() {
        assert_eq!(escape_prompt("fix it"), "\"fix it\"");
        assert_eq!(
            escape_prompt("say \"hello\""),
            "\"say \\\"hello\\\"\""
        );
        assert_eq!(escape_prompt("a\\b"), "\"a\\\\b\"");
    }

    #[cfg(unix)]
    mod with_pty {
        use super::super::*;
        use crate::pty::SpawnOptions;
        use std::path::PathBuf;
        use tether_protocol::TerminalSize;

        fn spawn_instance() -> Arc<AgentInstance> {
            let pty = Arc::new(
                PtyProcess::spawn(SpawnOptions {
                    command: PathBuf::from("/bin/sh"),
                    args: vec![],
                    cwd: PathBuf::from("/tmp"),
                    env: vec![],
                    size: TerminalSize::default(),
                })
                .expect("Failed to spawn /bin/sh"),
            );
            Arc::new(AgentInstance::new(
                AgentId::generate(),
                AgentSpec {
                    kind: AgentKind::Shell,
                    name: "test".to_string(),
                    command: None,
                    args: vec![],
                    cwd: PathBuf::from("/tmp"),
                    env: vec![],
                    initial_prompt: None,
                    auto_run: false,
                },
                pty,
                1000,
            ))
        }

        #[tokio::test]
        async fn test_status_machine_guards() {
            let instance = spawn_instance();
            assert_eq!(instance.status(), AgentStatus::Starting);

            // starting cannot jump to idle
            assert!(!instance.transition(AgentStatus::Idle));
            assert!(instance.transition(AgentStatus::Running));
            assert!(instance.transition(AgentStatus::Exited));

            // terminal state is never left
            assert!(!instance.transition(AgentStatus::Running));
            assert_eq!(instance.status(), AgentStatus::Exited);

            instance.pty.kill(None);
        }

        #[tokio::test]
        async fn test_snapshot_reflects_state() {
            let instance = spawn_instance();
            instance.transition(AgentStatus::Running);
            instance.touch(2000);
            instance.record_exit(Some(1));

            let info = instance.snapshot();
            assert_eq!(info.status, AgentStatus::Running);
            assert_eq!(info.last_activity_at, 2000);
            assert_eq!(info.exit_code, Some(1));

            instance.pty.kill(None);
        }
    }
}
