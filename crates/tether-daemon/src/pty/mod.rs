//! PTY process ownership and registry

pub mod manager;
pub mod process;

pub use manager::PtyManager;
pub use process::{clamp_size, PtyEvent, PtyProcess, SpawnOptions, MIN_COLS, MIN_ROWS};
