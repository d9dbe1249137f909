//! PTY process registry
//!
//! Tracks live PTY processes keyed by agent id. Shell resolution and
//! pre-spawn validation happen here so a bad request never reaches
//! `openpty`.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use tether_core::{AgentId, SpawnError};
use tether_protocol::TerminalSize;

use super::process::{PtyProcess, SpawnOptions};

/// Registry of live PTY processes
pub struct PtyManager {
    /// Processes indexed by agent id
    processes: DashMap<AgentId, Arc<PtyProcess>>,
    /// Shell used when the caller does not specify one
    default_shell: Option<PathBuf>,
}

impl PtyManager {
    /// Create a new PTY manager
    pub fn new() -> Self {
        Self {
            processes: DashMap::new(),
            default_shell: None,
        }
    }

    /// Create a PTY manager with a configured default shell
    pub fn with_default_shell(default_shell: Option<PathBuf>) -> Self {
        Self {
            processes: DashMap::new(),
            default_shell,
        }
    }

    /// Resolve which shell to spawn: configured default, then `$SHELL`,
    /// then a platform fallback.
    pub fn resolve_shell(&self) -> PathBuf {
        self.default_shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                if cfg!(windows) {
                    PathBuf::from("cmd.exe")
                } else {
                    PathBuf::from("/bin/sh")
                }
            })
    }

    /// Spawn a shell in a new PTY for the given agent.
    ///
    /// Validation errors surface before any process is started.
    pub fn spawn(
        &self,
        agent_id: AgentId,
        cwd: PathBuf,
        env: Vec<(String, String)>,
        size: TerminalSize,
    ) -> Result<Arc<PtyProcess>, SpawnError> {
        let shell = self.resolve_shell();
        tracing::info!("Spawning shell {} for agent {}", shell.display(), agent_id);

        let process = Arc::new(PtyProcess::spawn(SpawnOptions {
            command: shell,
            args: vec![],
            cwd,
            env,
            size,
        })?);

        self.processes.insert(agent_id, Arc::clone(&process));
        Ok(process)
    }

    /// Get a process by agent id
    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<PtyProcess>> {
        self.processes.get(agent_id).map(|r| Arc::clone(&r))
    }

    /// Remove a process from the registry (it may still be draining)
    pub fn remove(&self, agent_id: &AgentId) -> Option<Arc<PtyProcess>> {
        self.processes.remove(agent_id).map(|(_, p)| p)
    }

    /// Number of tracked processes
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl Default for PtyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_shell_prefers_configured() {
        let manager = PtyManager::with_default_shell(Some(PathBuf::from("/bin/bash")));
        assert_eq!(manager.resolve_shell(), PathBuf::from("/bin/bash"));
    }

    #[test]
    fn test_spawn_invalid_cwd_leaves_no_state() {
        let manager = PtyManager::with_default_shell(Some(
            if cfg!(windows) {
                PathBuf::from("C:\\Windows\\System32\\cmd.exe")
            } else {
                PathBuf::from("/bin/sh")
            },
        ));
        let result = manager.spawn(
            AgentId::generate(),
            PathBuf::from("/nonexistent/dir"),
            vec![],
            TerminalSize::default(),
        );
        assert!(matches!(result, Err(SpawnError::CwdNotFound { .. })));
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_and_remove() {
        let manager = PtyManager::with_default_shell(Some(PathBuf::from("/bin/sh")));
        let id = AgentId::generate();

        let process = manager
            .spawn(id.clone(), PathBuf::from("/tmp"), vec![], TerminalSize::default())
            .expect("Failed to spawn");
        assert_eq!(manager.len(), 1);

        process.kill(None);
        manager.remove(&id);
        assert!(manager.is_empty());
    }
}
