//! # relay-server
//!
//! Axum HTTP + `WebSocket` server for the relay.
//!
//! - `GET /ws`: upgrade, then one session per connection
//! - `GET /health`, `GET /metrics`: liveness and Prometheus exposition
//! - [`websocket::directory::Directory`]: the shared participant set
//! - [`websocket::broadcast::broadcast`]: fan-out with eviction of dead channels
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
