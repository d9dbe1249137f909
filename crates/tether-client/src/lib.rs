//! tether-client: client-side reassembly for tether front-ends
//!
//! The daemon streams raw terminal output and serves scrollback history in
//! numbered ranges; this crate turns both back into ordered lines a UI can
//! render.

pub mod scrollback;
pub mod stream;

pub use scrollback::ScrollbackBuffer;
pub use stream::StreamAssembler;
