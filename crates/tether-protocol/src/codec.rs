//! Tokio codec for framed protocol messages
//!
//! One logical message per frame, encoded as a newline-delimited JSON line.
//! The codec is generic over the inbound/outbound message types so the same
//! implementation serves both ends of a connection.

use std::marker::PhantomData;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::error::ProtocolError;
use crate::message::{ClientMessage, ServerMessage};

/// Maximum encoded frame size (1MB). Oversized frames are rejected rather
/// than buffered indefinitely.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// JSON-lines codec over a pair of message types.
///
/// `In` is decoded from received lines, `Out` is encoded onto the wire.
#[derive(Debug)]
pub struct JsonCodec<In, Out> {
    lines: LinesCodec,
    _marker: PhantomData<(In, Out)>,
}

/// Codec for the daemon side: decodes client messages, encodes server messages
pub type ServerCodec = JsonCodec<ClientMessage, ServerMessage>;

/// Codec for the client side: decodes server messages, encodes client messages
pub type ClientCodec = JsonCodec<ServerMessage, ClientMessage>;

impl<In, Out> JsonCodec<In, Out> {
    /// Create a new codec with the default frame size limit
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_FRAME_SIZE),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for JsonCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned, Out> Decoder for JsonCodec<In, Out> {
    type Item = In;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode(src)? {
                Some(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue; // Skip blank lines between frames
                    }
                    return Ok(Some(serde_json::from_str(trimmed)?));
                }
                None => return Ok(None),
            }
        }
    }
}

impl<In, Out: Serialize> Encoder<Out> for JsonCodec<In, Out> {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&msg)?;
        if json.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
            });
        }
        self.lines.encode(json, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ClientType;

    #[test]
    fn test_codec_roundtrip() {
        let mut server = ServerCodec::new();

        let msg = ClientMessage::Handshake {
            token: Some("abc123".to_string()),
            pairing_code: None,
            client_type: ClientType::Mobile,
        };

        // Encode with the client-side codec, decode with the server-side one
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();
        client.encode(msg, &mut buf).unwrap();

        let decoded = server.decode(&mut buf).unwrap().unwrap();
        match decoded {
            ClientMessage::Handshake {
                token, client_type, ..
            } => {
                assert_eq!(token.as_deref(), Some("abc123"));
                assert_eq!(client_type, ClientType::Mobile);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_codec_partial_frame() {
        let mut server = ServerCodec::new();

        let json = r#"{"type":"ping"}"#;
        let mut buf = BytesMut::from(&json[..json.len() - 3]);

        // Incomplete line: need more data
        assert!(server.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&json.as_bytes()[json.len() - 3..]);
        buf.extend_from_slice(b"\n");

        let decoded = server.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(decoded, ClientMessage::Ping));
    }

    #[test]
    fn test_codec_multiple_frames() {
        let mut server = ServerCodec::new();

        let mut buf = BytesMut::from(
            "{\"type\":\"ping\"}\n{\"type\":\"list_agents\"}\n",
        );

        assert!(matches!(
            server.decode(&mut buf).unwrap().unwrap(),
            ClientMessage::Ping
        ));
        assert!(matches!(
            server.decode(&mut buf).unwrap().unwrap(),
            ClientMessage::ListAgents
        ));
        assert!(server.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_skips_blank_lines() {
        let mut server = ServerCodec::new();
        let mut buf = BytesMut::from("\n\n{\"type\":\"ping\"}\n");
        assert!(matches!(
            server.decode(&mut buf).unwrap().unwrap(),
            ClientMessage::Ping
        ));
    }

    #[test]
    fn test_codec_invalid_json_is_error() {
        let mut server = ServerCodec::new();
        let mut buf = BytesMut::from("not json\n");
        assert!(matches!(
            server.decode(&mut buf),
            Err(ProtocolError::Serialization(_))
        ));
    }
}
