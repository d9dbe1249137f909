//! Message types for the tether protocol
//!
//! This module defines the messages exchanged between clients (mobile device,
//! operator's own machine) and the daemon. One logical message travels per
//! frame; framing is handled by the codec in `codec.rs`.
//!
//! # Message Flow
//!
//! Typical sequence for a client connection:
//!
//! 1. Client connects and sends `Handshake` with a session token or pairing code
//! 2. Daemon responds with `SessionInfo` (or `Error` and closes the connection)
//! 3. Client drives agents with `Input`/`Resize`/`CreateAgent`/`KillAgent`
//! 4. Daemon streams `Output` and lifecycle events to every attached client
//! 5. `ScrollbackRequest`/`ScrollbackResponse` backfill terminal history

use serde::{Deserialize, Serialize};

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns
    pub cols: u16,
    /// Number of rows
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Kind of client driving a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// The operator's own machine
    Pc,
    /// A mobile device
    Mobile,
}

impl ClientType {
    /// Priority class used by the input arbiter. Higher wins.
    ///
    /// Mobile outranks PC: an operator reaching for their phone takes over,
    /// while a PC writer only yields via the idle detector.
    pub fn priority_class(&self) -> u8 {
        match self {
            ClientType::Mobile => 1,
            ClientType::Pc => 0,
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::Pc => write!(f, "pc"),
            ClientType::Mobile => write!(f, "mobile"),
        }
    }
}

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Shell is being spawned
    Starting,
    /// Agent is processing
    Running,
    /// Agent produced no activity recently
    Idle,
    /// Agent is waiting for user input
    Waiting,
    /// Process exited (terminal)
    Exited,
    /// Spawn or runtime failure (terminal)
    Error,
}

impl AgentStatus {
    /// Whether this status is terminal (no transitions leave it)
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Exited | AgentStatus::Error)
    }

    /// Whether the state machine allows a transition to `next`
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (AgentStatus::Starting, AgentStatus::Running) => true,
            (AgentStatus::Starting, AgentStatus::Error) => true,
            (AgentStatus::Running, AgentStatus::Idle) => true,
            (AgentStatus::Running, AgentStatus::Waiting) => true,
            (AgentStatus::Idle, AgentStatus::Running) => true,
            (AgentStatus::Idle, AgentStatus::Waiting) => true,
            (AgentStatus::Waiting, AgentStatus::Running) => true,
            (AgentStatus::Waiting, AgentStatus::Idle) => true,
            (_, AgentStatus::Exited) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Idle => "idle",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Exited => "exited",
            AgentStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Kind of agent to run inside the spawned shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Plain shell, no auto-run command
    Shell,
    /// An AI coding CLI launched via shell-first auto-run
    AiCli,
}

/// Configuration for creating an agent
///
/// `cwd` is optional on the wire: preset-driven creation supplies a shared
/// working directory, and the daemon falls back to its data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// What kind of agent this is
    pub kind: AgentKind,
    /// Human-readable name
    pub name: String,
    /// Command to auto-run inside the shell (AI CLI binary), if any
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for the auto-run command
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the shell
    #[serde(default)]
    pub cwd: Option<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Initial prompt typed into the agent after launch
    #[serde(default)]
    pub initial_prompt: Option<String>,
    /// Whether to auto-run the command after the shell settles
    #[serde(default = "default_auto_run")]
    pub auto_run: bool,
}

fn default_auto_run() -> bool {
    true
}

/// Snapshot of an agent for protocol responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Unique agent id (never reused)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Agent kind
    pub kind: AgentKind,
    /// Current lifecycle status
    pub status: AgentStatus,
    /// Creation timestamp (unix millis)
    pub created_at: u64,
    /// Last activity timestamp (unix millis)
    pub last_activity_at: u64,
    /// Exit code, once exited
    pub exit_code: Option<i32>,
}

/// A numbered scrollback line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollbackLine {
    /// Absolute line number (0-based, monotonically increasing)
    pub line_no: u64,
    /// Line content without its terminator
    pub text: String,
}

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the connection. Must be the first message.
    Handshake {
        /// Session token, if the client holds one
        #[serde(default)]
        token: Option<String>,
        /// Pairing code as an alternative to the token
        #[serde(default)]
        pairing_code: Option<String>,
        /// What kind of client this is
        client_type: ClientType,
    },

    /// Terminal input for an agent
    Input { agent_id: String, data: Vec<u8> },

    /// Resize an agent's terminal
    Resize {
        agent_id: String,
        cols: u16,
        rows: u16,
    },

    /// Create a new agent
    CreateAgent { config: AgentConfig },

    /// Kill an agent
    KillAgent {
        agent_id: String,
        #[serde(default)]
        signal: Option<i32>,
    },

    /// Focus a different agent
    SwitchAgent { agent_id: String },

    /// List all agents
    ListAgents,

    /// Keepalive
    Ping,

    /// Toggle read-only mode for this session
    ModeChange { read_only: bool },

    /// Request a range of scrollback history
    ScrollbackRequest {
        session_id: String,
        from_line: u64,
        count: u64,
    },
}

/// Messages sent from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Raw terminal output from an agent
    Output {
        agent_id: String,
        data: Vec<u8>,
        timestamp: u64,
    },

    /// An agent was created
    AgentCreated { agent: AgentInfo, timestamp: u64 },

    /// An agent's process exited
    AgentExited {
        agent_id: String,
        exit_code: Option<i32>,
        #[serde(default)]
        signal: Option<i32>,
        timestamp: u64,
    },

    /// An agent's status changed
    AgentStatus {
        agent_id: String,
        status: AgentStatus,
        timestamp: u64,
    },

    /// Full agent list
    AgentList {
        agents: Vec<AgentInfo>,
        timestamp: u64,
    },

    /// Session details, sent after a successful handshake
    SessionInfo {
        session_id: String,
        is_read_only: bool,
        agents: Vec<AgentInfo>,
        timestamp: u64,
    },

    /// Read-only mode changed
    ModeChanged { is_read_only: bool, timestamp: u64 },

    /// An error, optionally tied to an agent
    Error {
        message: String,
        #[serde(default)]
        agent_id: Option<String>,
        timestamp: u64,
    },

    /// A command was blocked by policy
    CommandBlocked {
        agent_id: String,
        command: String,
        reason: String,
        timestamp: u64,
    },

    /// A suspicious command needs approval before it runs
    ApprovalRequest {
        agent_id: String,
        command: String,
        reason: String,
        timestamp: u64,
    },

    /// Keepalive response
    Pong { timestamp: u64 },

    /// A range of scrollback history
    ScrollbackResponse {
        lines: Vec<ScrollbackLine>,
        from_line: u64,
        total_lines: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::Input {
            agent_id: "agent-1".to_string(),
            data: b"ls\r".to_vec(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"input\""));
        assert!(json.contains("agent_id"));

        let decoded: ClientMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ClientMessage::Input { agent_id, data } => {
                assert_eq!(agent_id, "agent-1");
                assert_eq!(data, b"ls\r");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_handshake_optional_fields() {
        let json = r#"{"type":"handshake","client_type":"mobile"}"#;
        let decoded: ClientMessage = serde_json::from_str(json).unwrap();
        match decoded {
            ClientMessage::Handshake {
                token,
                pairing_code,
                client_type,
            } => {
                assert!(token.is_none());
                assert!(pairing_code.is_none());
                assert_eq!(client_type, ClientType::Mobile);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::AgentExited {
            agent_id: "agent-1".to_string(),
            exit_code: Some(0),
            signal: None,
            timestamp: 1000,
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"agent_exited\""));

        let decoded: ServerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ServerMessage::AgentExited { exit_code, .. } => assert_eq!(exit_code, Some(0)),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_priority_class_ordering() {
        assert!(ClientType::Mobile.priority_class() > ClientType::Pc.priority_class());
    }

    #[test]
    fn test_status_transitions() {
        use AgentStatus::*;

        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Error));
        assert!(Running.can_transition_to(Idle));
        assert!(Running.can_transition_to(Waiting));
        assert!(Idle.can_transition_to(Running));
        assert!(Waiting.can_transition_to(Exited));

        // Terminal states have no outgoing transitions
        assert!(!Exited.can_transition_to(Running));
        assert!(!Error.can_transition_to(Starting));
        assert!(!Exited.can_transition_to(Error));

        // Starting does not jump straight to idle/waiting
        assert!(!Starting.can_transition_to(Idle));
        assert!(!Starting.can_transition_to(Waiting));
    }

    #[test]
    fn test_agent_config_defaults() {
        let json = r#"{"kind":"shell","name":"work"}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert!(config.command.is_none());
        assert!(config.args.is_empty());
        assert!(config.auto_run);
    }
}
