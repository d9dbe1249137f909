//! Daemon configuration
//!
//! Loading from disk is the bootstrap layer's job; this module defines the
//! configuration contract the daemon consumes. Every field has a documented
//! default and a validated range. Out-of-range values fall back to the
//! default (logged at warn) instead of failing startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use self::serde_utils::duration_millis;

/// Default TCP port the daemon listens on
pub const DEFAULT_LISTEN_PORT: u16 = 8320;

/// Configuration for the tether daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for daemon state. Default: `~/.local/share/tether` (or the
    /// platform equivalent).
    pub data_dir: PathBuf,

    /// TCP port to listen on. Must be non-zero; default 8320.
    pub listen_port: u16,

    /// Log level: error, warn, info, debug, trace. Default "info".
    pub log_level: String,

    /// Maximum concurrent authenticated sessions. Range 1..=1024, default 32.
    pub max_sessions: usize,

    /// Disable the outbound tunnel subprocess
    pub tunnel_disabled: bool,

    /// Idle detection settings
    pub idle: IdleConfig,

    /// Security layer settings
    pub security: SecurityConfig,
}

/// Idle detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// How long a writer may go without input before it is considered idle.
    /// Range 1s..=1h, default 30s.
    #[serde(with = "duration_millis")]
    pub idle_threshold: Duration,

    /// How often the idle sweep runs. Range 100ms..=idle_threshold, default 5s.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

/// Policy for input arriving from a client that is not the active writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonWriterPolicy {
    /// Reject the input with a distinguishable reason
    Deny,
    /// Enqueue the client as a pending write-access request
    Enqueue,
}

/// Security layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Grace window during which a rotated-out token still validates.
    /// Range 0..=10m, default 60s.
    #[serde(with = "duration_millis")]
    pub token_grace: Duration,

    /// Session token lifetime. Range 1m..=30d, default 7d.
    #[serde(with = "duration_millis")]
    pub token_lifetime: Duration,

    /// Pairing code lifetime. Range 30s..=1h, default 5m.
    #[serde(with = "duration_millis")]
    pub code_lifetime: Duration,

    /// Rate limiter window. Range 1s..=10m, default 60s.
    #[serde(with = "duration_millis")]
    pub rate_window: Duration,

    /// Maximum requests per key per window. Range 1..=10000, default 100.
    pub rate_max: u32,

    /// What to do with input from a non-active writer
    pub non_writer_policy: NonWriterPolicy,

    /// Maximum queued write-access requests per agent. Range 1..=64, default 8.
    pub max_queue_len: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            listen_port: DEFAULT_LISTEN_PORT,
            log_level: "info".to_string(),
            max_sessions: 32,
            tunnel_disabled: false,
            idle: IdleConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_grace: Duration::from_secs(60),
            token_lifetime: Duration::from_secs(7 * 24 * 3600),
            code_lifetime: Duration::from_secs(300),
            rate_window: Duration::from_secs(60),
            rate_max: 100,
            non_writer_policy: NonWriterPolicy::Enqueue,
            max_queue_len: 8,
        }
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl DaemonConfig {
    /// Normalize the config, replacing out-of-range values with defaults.
    /// Never fails: a bad value is logged and falls back.
    pub fn validated(mut self) -> Self {
        let defaults = DaemonConfig::default();

        if self.listen_port == 0 {
            tracing::warn!(
                "Invalid listen_port 0, falling back to {}",
                defaults.listen_port
            );
            self.listen_port = defaults.listen_port;
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            tracing::warn!(
                "Unknown log_level '{}', falling back to '{}'",
                self.log_level,
                defaults.log_level
            );
            self.log_level = defaults.log_level.clone();
        }

        if self.max_sessions == 0 || self.max_sessions > 1024 {
            tracing::warn!(
                "max_sessions {} out of range 1..=1024, falling back to {}",
                self.max_sessions,
                defaults.max_sessions
            );
            self.max_sessions = defaults.max_sessions;
        }

        self.idle = self.idle.validated();
        self.security = self.security.validated();
        self
    }
}

impl IdleConfig {
    fn validated(mut self) -> Self {
        let defaults = IdleConfig::default();

        if self.idle_threshold < Duration::from_secs(1)
            || self.idle_threshold > Duration::from_secs(3600)
        {
            tracing::warn!(
                "idle_threshold {:?} out of range, falling back to {:?}",
                self.idle_threshold,
                defaults.idle_threshold
            );
            self.idle_threshold = defaults.idle_threshold;
        }

        if self.poll_interval < Duration::from_millis(100) || self.poll_interval > self.idle_threshold
        {
            tracing::warn!(
                "poll_interval {:?} out of range, falling back to {:?}",
                self.poll_interval,
                defaults.poll_interval
            );
            self.poll_interval = defaults.poll_interval.min(self.idle_threshold);
        }

        self
    }
}

impl SecurityConfig {
    fn validated(mut self) -> Self {
        let defaults = SecurityConfig::default();

        if self.token_grace > Duration::from_secs(600) {
            tracing::warn!(
                "token_grace {:?} out of range, falling back to {:?}",
                self.token_grace,
                defaults.token_grace
            );
            self.token_grace = defaults.token_grace;
        }

        if self.code_lifetime < Duration::from_secs(30)
            || self.code_lifetime > Duration::from_secs(3600)
        {
            tracing::warn!(
                "code_lifetime {:?} out of range, falling back to {:?}",
                self.code_lifetime,
                defaults.code_lifetime
            );
            self.code_lifetime = defaults.code_lifetime;
        }

        if self.rate_window < Duration::from_secs(1) || self.rate_window > Duration::from_secs(600)
        {
            tracing::warn!(
                "rate_window {:?} out of range, falling back to {:?}",
                self.rate_window,
                defaults.rate_window
            );
            self.rate_window = defaults.rate_window;
        }

        if self.rate_max == 0 || self.rate_max > 10_000 {
            tracing::warn!(
                "rate_max {} out of range, falling back to {}",
                self.rate_max,
                defaults.rate_max
            );
            self.rate_max = defaults.rate_max;
        }

        if self.max_queue_len == 0 || self.max_queue_len > 64 {
            tracing::warn!(
                "max_queue_len {} out of range, falling back to {}",
                self.max_queue_len,
                defaults.max_queue_len
            );
            self.max_queue_len = defaults.max_queue_len;
        }

        self
    }
}

/// Shared serde helpers for configuration types
pub mod serde_utils {
    /// Serialize a `Duration` as milliseconds (u64), matching the protocol's
    /// millisecond timestamps.
    pub mod duration_millis {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        /// Serialize a Duration as milliseconds (u64)
        pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_u64(duration.as_millis() as u64)
        }

        /// Deserialize a Duration from milliseconds (u64)
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = u64::deserialize(deserializer)?;
            Ok(Duration::from_millis(millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaemonConfig::default().validated();
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.idle.idle_threshold, Duration::from_secs(30));
        assert_eq!(config.idle.poll_interval, Duration::from_secs(5));
        assert_eq!(config.security.token_grace, Duration::from_secs(60));
        assert_eq!(config.security.code_lifetime, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = DaemonConfig {
            listen_port: 0,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn test_invalid_log_level_falls_back() {
        let config = DaemonConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        }
        .validated();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_out_of_range_max_sessions_falls_back() {
        let config = DaemonConfig {
            max_sessions: 0,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.max_sessions, 32);

        let config = DaemonConfig {
            max_sessions: 100_000,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.max_sessions, 32);
    }

    #[test]
    fn test_poll_interval_capped_by_threshold() {
        let config = DaemonConfig {
            idle: IdleConfig {
                idle_threshold: Duration::from_secs(2),
                poll_interval: Duration::from_secs(10),
            },
            ..Default::default()
        }
        .validated();
        assert!(config.idle.poll_interval <= config.idle.idle_threshold);
    }

    #[test]
    fn test_duration_millis_roundtrip() {
        let config = SecurityConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"token_grace\":60000"));
        let parsed: SecurityConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.token_grace, config.token_grace);
    }
}
