//! Core error types for tether

use std::path::PathBuf;
use thiserror::Error;

use tether_protocol::ProtocolError;

/// Top-level error type for the tether ecosystem
#[derive(Error, Debug)]
pub enum TetherError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Spawn error
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// Token error
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Pairing code error
    #[error("Pairing code error: {0}")]
    Pairing(#[from] PairingError),

    /// Rate limit exceeded
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Shutdown error
    #[error("Shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    /// The configured agent capacity is already reached
    #[error("Agent limit reached ({max})")]
    AgentLimit { max: usize },

    /// Referenced agent does not exist
    #[error("Unknown agent: {id}")]
    UnknownAgent { id: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating or spawning an agent process.
///
/// The validation variants (`ShellNotFound`, `ShellNotExecutable`,
/// `CwdNotFound`) are checked before any process is started, so a failed
/// create leaves no partial state behind.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// Shell path does not resolve to an existing file
    #[error("Shell not found: {path}")]
    ShellNotFound { path: PathBuf },

    /// Shell path exists but is not executable
    #[error("Shell is not executable: {path}")]
    ShellNotExecutable { path: PathBuf },

    /// Working directory does not resolve to an existing directory
    #[error("Working directory not found: {path}")]
    CwdNotFound { path: PathBuf },

    /// Native process creation failed
    #[error("Failed to spawn '{command}' in {cwd}: {message}")]
    Pty {
        command: String,
        cwd: PathBuf,
        message: String,
    },
}

/// Session token validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    /// Token was valid once but its lifetime (including any grace window)
    /// has elapsed
    #[error("Token expired")]
    Expired,

    /// Token does not match any issued token
    #[error("Invalid token")]
    Invalid,
}

/// Pairing code validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PairingError {
    /// Code existed but its lifetime has elapsed
    #[error("Pairing code expired")]
    Expired,

    /// Code does not match any active code
    #[error("Invalid pairing code")]
    Invalid,
}

/// Rate limiting errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many requests for this key within the current window
    #[error("Rate limit exceeded for {key}, retry in {retry_after_ms}ms")]
    Exceeded { key: String, retry_after_ms: u64 },
}

/// Reasons the input arbiter can refuse an input event.
///
/// Denials are non-fatal: they are logged to the audit trail and reported to
/// the denied client, never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Another client holds the active-writer role
    NotActiveWriter,
    /// The per-agent request queue is full
    QueueFull,
    /// The client was just demoted by the idle detector
    IdlePreempted,
    /// This session is in read-only mode
    ReadOnly,
}

impl DenyReason {
    /// Stable string form used in audit entries and client-facing errors
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotActiveWriter => "not-active-writer",
            DenyReason::QueueFull => "queue-full",
            DenyReason::IdlePreempted => "idle-preempted",
            DenyReason::ReadOnly => "read-only",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shutdown errors
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The global hard timeout elapsed before all handlers finished.
    /// Fatal: the caller is expected to force-exit.
    #[error("Shutdown timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display_carries_context() {
        let err = SpawnError::Pty {
            command: "/bin/zsh".to_string(),
            cwd: PathBuf::from("/work"),
            message: "out of ptys".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("/bin/zsh"));
        assert!(text.contains("/work"));
    }

    #[test]
    fn test_deny_reason_strings_are_distinguishable() {
        let reasons = [
            DenyReason::NotActiveWriter,
            DenyReason::QueueFull,
            DenyReason::IdlePreempted,
            DenyReason::ReadOnly,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for (j, b) in reasons.iter().enumerate() {
                if i != j {
                    assert_ne!(a.as_str(), b.as_str());
                }
            }
        }
    }
}
