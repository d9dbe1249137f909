//! Agent lifecycle: instances, the registry, and event fan-out

pub mod instance;
pub mod manager;

pub use instance::AgentInstance;
pub use manager::{AgentEvent, AgentManager};
