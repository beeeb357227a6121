//! Outbound half of a client connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::{ConnectionId, DeliveryError};
use tokio::sync::mpsc;

/// Handle for pushing frames to one client.
///
/// Frames go into a bounded queue drained by the connection's writer task.
/// Once the writer is gone every send fails with [`DeliveryError::Closed`].
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
}

impl ClientConnection {
    /// Wrap the sending side of a writer queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
        }
    }

    /// Queue a frame, waiting for space if the queue is full.
    pub async fn send(&self, frame: Arc<String>) -> Result<(), DeliveryError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| DeliveryError::Closed {
                connection_id: self.id.clone(),
            })
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
