//! tether-daemon: PTY multiplexer for jointly controlled agent sessions
//!
//! The daemon spawns shells in pseudo-terminals, runs AI coding agents
//! inside them, and lets multiple authenticated clients observe and take
//! turns controlling each one. Input goes through an arbitration engine
//! so exactly one client writes at a time; output fans out to everyone.

pub mod agent;
pub mod arbiter;
pub mod history;
pub mod pty;
pub mod security;
pub mod server;
pub mod state;
pub mod tasks;

pub use state::DaemonState;
