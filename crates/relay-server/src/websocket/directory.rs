//! The set of registered participants.
//!
//! Every operation takes one synchronous lock and returns owned data, so no
//! caller can hold the lock across an `.await` or iterate under it.

use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use relay_core::{ParticipantId, RosterEntry};
use tracing::debug;

use super::connection::ClientConnection;
use crate::metrics::PARTICIPANTS_ACTIVE;

/// A registered client.
#[derive(Clone, Debug)]
pub struct Participant {
    /// Assigned at registration, never reused.
    pub id: ParticipantId,
    /// Name from the client's announce frame.
    pub display_name: String,
    /// Outbound handle, shared with the session that owns the socket.
    pub channel: Arc<ClientConnection>,
}

impl Participant {
    /// `(id, display_name)` pair for roster snapshots.
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id,
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    participants: Vec<Participant>,
    next_id: u64,
}

/// Registered participants in registration order.
#[derive(Debug)]
pub struct Directory {
    inner: Mutex<Inner>,
}

impl Directory {
    /// Empty directory. Ids start at 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                participants: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Register `channel` under a fresh id.
    ///
    /// A channel that is already registered loses its old entry, so each
    /// channel appears at most once.
    pub fn register(
        &self,
        channel: Arc<ClientConnection>,
        display_name: impl Into<String>,
    ) -> Participant {
        let mut inner = self.inner.lock();
        inner.participants.retain(|p| p.channel.id != channel.id);

        let id = ParticipantId::new(inner.next_id);
        inner.next_id += 1;
        let participant = Participant {
            id,
            display_name: display_name.into(),
            channel,
        };
        inner.participants.push(participant.clone());
        record_count(inner.participants.len());
        drop(inner);

        debug!(
            participant_id = %participant.id,
            connection_id = %participant.channel.id,
            "participant registered"
        );
        participant
    }

    /// Remove the entry bound to `channel`. Absent channels are a no-op.
    pub fn remove(&self, channel: &ClientConnection) -> Option<Participant> {
        let mut inner = self.inner.lock();
        let index = inner
            .participants
            .iter()
            .position(|p| p.channel.id == channel.id)?;
        let removed = inner.participants.remove(index);
        record_count(inner.participants.len());
        drop(inner);

        debug!(participant_id = %removed.id, connection_id = %channel.id, "participant removed");
        Some(removed)
    }

    /// Copy of every participant, in registration order.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.inner.lock().participants.clone()
    }

    /// Roster view of [`snapshot`](Self::snapshot).
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.inner
            .lock()
            .participants
            .iter()
            .map(Participant::roster_entry)
            .collect()
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.inner.lock().participants.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_count(count: usize) {
    gauge!(PARTICIPANTS_ACTIVE).set(count as f64);
}
