//! Connected client registry

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use tether_core::{AgentId, ClientId, SessionId};
use tether_protocol::ClientType;

/// One authenticated client connection
pub struct ClientSession {
    /// Connection-scoped client id
    pub client_id: ClientId,
    /// Session the client authenticated into
    pub session_id: SessionId,
    /// What kind of client this is
    pub client_type: ClientType,
    /// When the connection authenticated (unix millis)
    pub connected_at: u64,

    read_only: AtomicBool,
    focused_agent: Mutex<Option<AgentId>>,
}

impl ClientSession {
    /// Create a session for a freshly authenticated connection
    pub fn new(
        client_id: ClientId,
        session_id: SessionId,
        client_type: ClientType,
        connected_at: u64,
    ) -> Self {
        Self {
            client_id,
            session_id,
            client_type,
            connected_at,
            read_only: AtomicBool::new(false),
            focused_agent: Mutex::new(None),
        }
    }

    /// Whether this client is read-only
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    /// Toggle read-only mode
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Agent this client is focused on, if any
    pub fn focused_agent(&self) -> Option<AgentId> {
        self.focused_agent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Change focus, returning the previously focused agent
    pub fn set_focused_agent(&self, agent_id: Option<AgentId>) -> Option<AgentId> {
        let mut focused = self
            .focused_agent
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *focused, agent_id)
    }
}

/// Registry of connected clients
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientSession>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated client
    pub fn insert(&self, session: Arc<ClientSession>) {
        self.clients.insert(session.client_id.clone(), session);
    }

    /// Remove a client on disconnect
    pub fn remove(&self, client_id: &ClientId) -> Option<Arc<ClientSession>> {
        self.clients.remove(client_id).map(|(_, s)| s)
    }

    /// Look up a client
    pub fn get(&self, client_id: &ClientId) -> Option<Arc<ClientSession>> {
        self.clients.get(client_id).map(|r| Arc::clone(&r))
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
