//! Entry point for an upgraded WebSocket.
//!
//! Splits the socket, spawns the outbound writer, adapts inbound frames to
//! text, and runs a [`Session`] to completion.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt, future};
use metrics::{counter, gauge, histogram};
use relay_core::{ConnectionId, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::directory::Directory;
use super::session::{Session, SessionOutcome};
use crate::metrics::{CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, SESSION_DURATION_SECONDS};

/// How long the writer gets to flush its close frame before it is aborted.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Per-connection settings handed to [`accept_session`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Capacity of the outbound queue.
    pub outbound_buffer: usize,
    /// Cancelled at process shutdown; ends the read loop.
    pub shutdown: CancellationToken,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Run one upgraded connection until it closes.
pub async fn accept_session(
    socket: WebSocket,
    directory: Arc<Directory>,
    config: SessionConfig,
) -> SessionOutcome {
    run_connection(socket, ConnectionId::new(), directory, config).await
}

#[instrument(skip_all, fields(connection_id = %connection_id))]
async fn run_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    directory: Arc<Directory>,
    config: SessionConfig,
) -> SessionOutcome {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
    info!("client connected");

    let (mut ws_tx, ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(config.outbound_buffer.max(1));
    let channel = Arc::new(ClientConnection::new(connection_id, tx));

    let closing = CancellationToken::new();
    let writer_closing = closing.clone();
    let mut writer = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    biased;
                    () = writer_closing.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some(frame) => {
                            if ws_tx.send(WsMessage::Text(frame.as_str().into())).await.is_err() {
                                debug!("socket write failed, stopping writer");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = ws_tx.close().await;
        }
        .in_current_span(),
    );

    let inbound = ws_rx
        .take_until(config.shutdown.cancelled_owned())
        .take_while(|frame| {
            let open = !matches!(frame, Ok(WsMessage::Close(_)));
            if !open {
                debug!("client sent close frame");
            }
            future::ready(open)
        })
        .filter_map(|frame| future::ready(inbound_text(frame)));

    let outcome = Session::new(directory, Arc::clone(&channel))
        .run(inbound)
        .await;

    closing.cancel();
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }

    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    let age = channel.age();
    histogram!(SESSION_DURATION_SECONDS).record(age.as_secs_f64());
    info!(
        reason = %outcome.reason,
        age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
    outcome
}

/// Text carried by an inbound frame, if any.
///
/// Binary frames count as text when they are valid UTF-8; any other binary
/// frame is an error that ends the session. Control frames carry nothing.
fn inbound_text(frame: Result<WsMessage, axum::Error>) -> Option<Result<String, TransportError>> {
    match frame {
        Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(WsMessage::Binary(data)) => match std::str::from_utf8(&data) {
            Ok(text) => Some(Ok(text.to_owned())),
            Err(_) => {
                warn!(len = data.len(), "binary frame is not UTF-8, ending session");
                Some(Err(TransportError::NotUtf8 { len: data.len() }))
            }
        },
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_)) => None,
        Err(error) => Some(Err(TransportError::Read(error.to_string()))),
    }
}
