//! tether-core: Domain types, configuration, and shutdown plumbing
//!
//! Shared foundation for the tether daemon and its clients: ids and agent
//! specifications, the error taxonomy, the daemon configuration contract,
//! time helpers, and the graceful-shutdown coordinator.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod time;
pub mod types;

pub use config::{DaemonConfig, IdleConfig, NonWriterPolicy, SecurityConfig};
pub use error::{
    DenyReason, PairingError, RateLimitError, ShutdownError, SpawnError, TetherError, TokenError,
};
pub use shutdown::ShutdownCoordinator;
pub use time::current_time_millis;
pub use types::{AgentId, AgentSpec, ClientId, Preset, PresetAgent, SessionId};
