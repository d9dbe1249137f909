//! tether-protocol: Wire protocol for tether client/daemon communication
//!
//! This crate defines the JSON-lines protocol spoken between the daemon and
//! remote clients (mobile devices, the operator's own machine) over a
//! multiplexed transport.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{ClientCodec, JsonCodec, ServerCodec, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use message::{
    AgentConfig, AgentInfo, AgentKind, AgentStatus, ClientMessage, ClientType, ScrollbackLine,
    ServerMessage, TerminalSize,
};
