//! Error types shared by the codec, the broadcast path, and the session loop.
//!
//! - [`DecodeError`]: a wire frame could not be turned into a [`Message`].
//!   Fatal to the session that received it.
//! - [`EncodeError`]: a [`Message`] could not be serialized.
//! - [`DeliveryError`]: pushing a frame to one participant's channel failed.
//!   Fatal only to that participant's directory membership.
//! - [`TransportError`]: the session's own inbound channel failed, or
//!   carried a frame that is not text.
//!
//! [`Message`]: crate::protocol::Message

use thiserror::Error;

use crate::ids::ConnectionId;
use crate::protocol::MessageKind;

/// A frame that is not a valid protocol message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON, or the envelope has the wrong shape.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The envelope has no `messagetype` field.
    #[error("frame has no messagetype discriminator")]
    MissingDiscriminator,

    /// The `messagetype` value is not one the protocol defines.
    #[error("unknown messagetype {0:?}")]
    UnknownDiscriminator(String),

    /// The discriminator is known but the body lacks or mistypes a field.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The variant the discriminator selected.
        kind: MessageKind,
        /// The underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A message could not be serialized to a wire frame.
#[derive(Debug, Error)]
#[error("failed to encode {kind} message: {source}")]
pub struct EncodeError {
    /// Variant that failed.
    pub kind: MessageKind,
    /// The underlying serialization failure.
    #[source]
    pub source: serde_json::Error,
}

/// Delivery of an outbound frame to one participant failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The participant's outbound writer has gone away.
    #[error("outbound channel for {connection_id} is closed")]
    Closed {
        /// The channel that rejected the frame.
        connection_id: ConnectionId,
    },
}

/// The session's inbound side reported a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Reading the next frame failed.
    #[error("read failed: {0}")]
    Read(String),
    /// A binary frame arrived that is not UTF-8 text.
    #[error("binary frame of {len} bytes is not UTF-8")]
    NotUtf8 {
        /// Frame length in bytes.
        len: usize,
    },
}
