//! Protocol error types

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message exceeds the maximum frame length
    #[error("Frame too large: exceeds maximum of {max} bytes")]
    FrameTooLarge { max: usize },

    /// Message could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LinesCodecError> for ProtocolError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::FrameTooLarge {
                max: crate::codec::MAX_FRAME_SIZE,
            },
            LinesCodecError::Io(e) => ProtocolError::Io(e),
        }
    }
}
