//! Fan-out of one message to every registered participant.

use std::sync::Arc;

use metrics::counter;
use relay_core::{EncodeError, Message, MessageKind, encode};
use thiserror::Error;
use tracing::{debug, warn};

use super::directory::{Directory, Participant};
use crate::metrics::{BROADCASTS_TOTAL, DELIVERIES_FAILED_TOTAL};

/// Why a message was not broadcast at all.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Only client-originated variants are relayed.
    #[error("{0} messages are never broadcast")]
    NotBroadcastable(MessageKind),
    /// The message could not be serialized.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Result of one fan-out.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Participants in the snapshot.
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Participants removed after a failed send.
    pub evicted: Vec<Participant>,
}

impl BroadcastReport {
    /// Sends that failed.
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Send `message` to every participant in `directory`.
///
/// The frame is encoded once and sent to a snapshot of the directory in
/// registration order. A failed send does not stop the loop. Failed
/// participants are removed after the loop, with no retry.
pub async fn broadcast(
    message: &Message,
    directory: &Directory,
) -> Result<BroadcastReport, BroadcastError> {
    if let Message::RosterSnapshot { .. } = message {
        warn!(kind = %message.kind(), "refusing to broadcast server-only message");
        return Err(BroadcastError::NotBroadcastable(message.kind()));
    }

    let frame = Arc::new(encode(message)?);
    let recipients = directory.snapshot();

    let mut delivered = 0;
    let mut failed = Vec::new();
    for participant in &recipients {
        match participant.channel.send(Arc::clone(&frame)).await {
            Ok(()) => delivered += 1,
            Err(error) => {
                warn!(
                    participant_id = %participant.id,
                    connection_id = %participant.channel.id,
                    %error,
                    "delivery failed"
                );
                failed.push(participant);
            }
        }
    }

    counter!(BROADCASTS_TOTAL).increment(1);
    if !failed.is_empty() {
        counter!(DELIVERIES_FAILED_TOTAL).increment(failed.len() as u64);
    }

    let evicted: Vec<Participant> = failed
        .into_iter()
        .filter_map(|p| directory.remove(&p.channel))
        .collect();

    debug!(
        kind = %message.kind(),
        recipients = recipients.len(),
        delivered,
        evicted = evicted.len(),
        "broadcast complete"
    );

    Ok(BroadcastReport {
        attempted: recipients.len(),
        delivered,
        evicted,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use relay_core::logging::capture_logs;
    use relay_core::{ConnectionId, RosterEntry, decode};
    use tokio::sync::mpsc;
    use tracing::Level;

    use super::*;
    use crate::websocket::connection::ClientConnection;

    fn join(
        dir: &Directory,
        name: &str,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let ch = Arc::new(ClientConnection::new(ConnectionId::from(name), tx));
        let _ = dir.register(Arc::clone(&ch), name);
        (ch, rx)
    }

    fn chat(from: &str, text: &str) -> Message {
        Message::Broadcast {
            sender_display_name: from.into(),
            payload: text.into(),
        }
    }

    #[tokio::test]
    async fn everyone_receives_the_same_frame() {
        let dir = Directory::new();
        let (_a, mut rx_a) = join(&dir, "alice");
        let (_b, mut rx_b) = join(&dir, "bob");

        let report = broadcast(&chat("alice", "hi"), &dir).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(report.evicted.is_empty());

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(decode(&a).unwrap(), chat("alice", "hi"));
    }

    #[tokio::test]
    async fn failed_recipients_are_evicted_and_others_still_receive() {
        let dir = Directory::new();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for i in 0..5 {
            let (ch, rx) = join(&dir, &format!("p{i}"));
            if i % 2 == 0 {
                live.push(rx);
            } else {
                drop(rx);
                dead.push(ch.id.clone());
            }
        }

        let report = broadcast(&chat("p0", "hello"), &dir).await.unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed(), 2);

        let evicted: Vec<_> = report.evicted.iter().map(|p| p.channel.id.clone()).collect();
        assert_eq!(evicted, dead);
        assert_eq!(dir.len(), 3);
        for rx in &mut live {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn directory_stays_usable_while_a_send_is_parked() {
        let dir = Arc::new(Directory::new());
        let (tx, mut rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new(ConnectionId::from("slow"), tx));
        let _ = dir.register(Arc::clone(&slow), "slow");
        slow.send(Arc::new("backlog".into())).await.unwrap();

        let fanout = {
            let dir = Arc::clone(&dir);
            tokio::spawn(async move { broadcast(&chat("slow", "stuck"), &dir).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fanout.is_finished(), "send should be waiting on the full queue");

        // Blocking thread, so a held lock shows up as a timeout rather than a hang.
        let ops = {
            let dir = Arc::clone(&dir);
            tokio::task::spawn_blocking(move || {
                let (tx, _rx) = mpsc::channel(1);
                let other = Arc::new(ClientConnection::new(ConnectionId::from("other"), tx));
                let _ = dir.register(Arc::clone(&other), "other");
                let during = dir.snapshot().len();
                let removed = dir.remove(&other).is_some();
                (during, removed)
            })
        };
        let (during, removed) = tokio::time::timeout(Duration::from_secs(2), ops)
            .await
            .expect("directory lock held across a send")
            .unwrap();
        assert_eq!(during, 2);
        assert!(removed);
        assert!(!fanout.is_finished());

        assert_eq!(*rx.recv().await.unwrap(), "backlog");
        let report = tokio::time::timeout(Duration::from_secs(2), fanout)
            .await
            .expect("broadcast never finished")
            .unwrap()
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(decode(&rx.recv().await.unwrap()).unwrap(), chat("slow", "stuck"));
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn empty_directory_is_a_noop() {
        let dir = Directory::new();
        let report = broadcast(&chat("ghost", "anyone?"), &dir).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn announce_is_broadcast() {
        let dir = Directory::new();
        let (_a, mut rx) = join(&dir, "alice");
        let announce = Message::Announce {
            display_name: "alice".into(),
        };
        let _ = broadcast(&announce, &dir).await.unwrap();
        assert_eq!(decode(&rx.recv().await.unwrap()).unwrap(), announce);
    }

    #[tokio::test]
    async fn roster_snapshot_is_rejected_and_logged() {
        let (logs, _guard) = capture_logs();
        let dir = Directory::new();
        let (_a, mut rx) = join(&dir, "alice");

        let roster = Message::RosterSnapshot {
            entries: vec![RosterEntry {
                id: relay_core::ParticipantId::new(1),
                display_name: "alice".into(),
            }],
        };
        let err = broadcast(&roster, &dir).await.unwrap_err();
        assert_matches!(err, BroadcastError::NotBroadcastable(MessageKind::RosterSnapshot));
        assert!(logs.has_event(Level::WARN, "refusing to broadcast"));
        assert!(rx.try_recv().is_err());
        assert_eq!(dir.len(), 1);
    }
}
