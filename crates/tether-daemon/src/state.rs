//! Shared daemon state
//!
//! One `DaemonState` is built at startup and shared (Arc) across the server,
//! the connection handlers, and the background maintenance tasks.

use std::sync::Arc;

use tether_core::DaemonConfig;

use crate::agent::AgentManager;
use crate::arbiter::InputArbiter;
use crate::pty::PtyManager;
use crate::security::{PairingCodeManager, RateLimiter, TokenManager};
use crate::server::registry::ClientRegistry;

/// Everything the daemon's components share
pub struct DaemonState {
    /// Validated configuration
    pub config: DaemonConfig,
    /// Agent registry and lifecycle
    pub agents: Arc<AgentManager>,
    /// Input arbitration engine
    pub arbiter: Arc<InputArbiter>,
    /// Session tokens
    pub tokens: Arc<TokenManager>,
    /// Pairing codes
    pub pairing: Arc<PairingCodeManager>,
    /// Connection rate limiting keyed by peer address
    pub rate_limiter: Arc<RateLimiter>,
    /// Connected clients
    pub clients: Arc<ClientRegistry>,
}

impl DaemonState {
    /// Wire up all components from a validated config
    pub fn new(config: DaemonConfig) -> Self {
        let security = &config.security;

        let ptys = Arc::new(PtyManager::new());
        let agents = Arc::new(AgentManager::new(
            ptys,
            config.max_sessions,
            config.data_dir.clone(),
        ));
        let arbiter = Arc::new(InputArbiter::new(
            security.non_writer_policy,
            security.max_queue_len,
        ));
        let tokens = Arc::new(TokenManager::new(
            security.token_lifetime.as_millis() as u64,
            security.token_grace.as_millis() as u64,
        ));
        let pairing = Arc::new(PairingCodeManager::new(
            security.code_lifetime.as_millis() as u64,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            security.rate_window.as_millis() as u64,
            security.rate_max,
        ));

        Self {
            config,
            agents,
            arbiter,
            tokens,
            pairing,
            rate_limiter,
            clients: Arc::new(ClientRegistry::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wires_from_config() {
        let state = DaemonState::new(DaemonConfig::default().validated());
        assert!(state.agents.list().is_empty());
        assert!(state.tokens.is_empty());
        assert!(state.pairing.is_empty());
        assert_eq!(state.clients.len(), 0);
    }
}
