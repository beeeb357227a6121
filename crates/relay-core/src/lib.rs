//! # relay-core
//!
//! Shared vocabulary for the relay crates:
//!
//! - **Protocol**: the `Message` sum type and its two-pass JSON codec
//! - **IDs**: `ConnectionId` (per socket) and `ParticipantId` (per registration)
//! - **Errors**: decode, encode, delivery, and transport failures via `thiserror`
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{DecodeError, DeliveryError, EncodeError, TransportError};
pub use ids::{ConnectionId, ParticipantId};
pub use protocol::{Message, MessageKind, RosterEntry, decode, encode};
