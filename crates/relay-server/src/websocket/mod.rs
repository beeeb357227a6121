//! Per-connection plumbing: outbound channel, participant directory,
//! broadcast fan-out, the session state machine, and the axum entry point.

pub mod broadcast;
pub mod connection;
pub mod directory;
pub mod handler;
pub mod session;
