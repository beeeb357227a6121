//! Per-connection state machine.
//!
//! ```text
//! AwaitingAnnounce --newUser--> Active --broadcastMessage--> Active
//!        |                        |
//!        +--- anything else ------+--- read error / close / bad frame ---> Terminated
//! ```
//!
//! On join the newcomer is sent the roster before the join notice is
//! broadcast, and both go through the same outbound queue, so the newcomer
//! always sees itself in the roster first. Any frame that fails to decode ends
//! the session. Leaving the loop for any reason removes the participant.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use metrics::counter;
use relay_core::{
    DecodeError, DeliveryError, EncodeError, Message, MessageKind, TransportError, decode, encode,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::broadcast::broadcast;
use super::connection::ClientConnection;
use super::directory::{Directory, Participant};
use crate::metrics::DECODE_ERRORS_TOTAL;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no participant registered yet.
    AwaitingAnnounce,
    /// Registered and relaying broadcasts.
    Active,
    /// The read loop has exited.
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum TerminationReason {
    /// The inbound stream ended (close frame, disconnect, or shutdown).
    #[error("inbound channel closed")]
    ChannelClosed,
    /// Reading the next frame failed.
    #[error(transparent)]
    Transport(TransportError),
    /// A frame could not be decoded.
    #[error(transparent)]
    Decode(DecodeError),
    /// A valid frame of the wrong kind arrived before the announce.
    #[error("expected newUser, got {0}")]
    ProtocolViolation(MessageKind),
    /// The newcomer's own channel rejected its roster.
    #[error("roster undeliverable: {0}")]
    RosterUndeliverable(DeliveryError),
    /// The roster could not be serialized.
    #[error(transparent)]
    Encode(EncodeError),
}

/// Summary returned when a session ends.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Why the loop exited.
    pub reason: TerminationReason,
    /// The participant this session registered, if it got that far.
    pub participant: Option<Participant>,
    /// Frames read, including the one that ended the session.
    pub frames: u64,
}

/// One client's session.
pub struct Session {
    directory: Arc<Directory>,
    channel: Arc<ClientConnection>,
    state: SessionState,
    participant: Option<Participant>,
    frames: u64,
}

impl Session {
    /// New session for `channel`, not yet registered.
    pub fn new(directory: Arc<Directory>, channel: Arc<ClientConnection>) -> Self {
        Self {
            directory,
            channel,
            state: SessionState::AwaitingAnnounce,
            participant: None,
            frames: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Participant registered by this session, if any.
    pub fn participant(&self) -> Option<&Participant> {
        self.participant.as_ref()
    }

    /// Drive the session until `inbound` ends or a frame is fatal.
    pub async fn run<S>(mut self, inbound: S) -> SessionOutcome
    where
        S: Stream<Item = Result<String, TransportError>>,
    {
        let mut inbound = std::pin::pin!(inbound);
        let reason = loop {
            match inbound.next().await {
                None => break TerminationReason::ChannelClosed,
                Some(Err(error)) => break TerminationReason::Transport(error),
                Some(Ok(frame)) => {
                    if let ControlFlow::Break(reason) = self.handle_frame(&frame).await {
                        break reason;
                    }
                }
            }
        };
        self.finish(reason)
    }

    /// Apply one inbound text frame.
    ///
    /// A `Break` moves the session to [`SessionState::Terminated`]; later
    /// frames are refused.
    pub async fn handle_frame(&mut self, raw: &str) -> ControlFlow<TerminationReason> {
        self.frames += 1;
        let flow = self.apply(raw).await;
        if flow.is_break() {
            self.state = SessionState::Terminated;
        }
        flow
    }

    async fn apply(&mut self, raw: &str) -> ControlFlow<TerminationReason> {
        let message = match decode(raw) {
            Ok(message) => message,
            Err(error) => {
                counter!(DECODE_ERRORS_TOTAL).increment(1);
                warn!(%error, state = ?self.state, "undecodable frame, ending session");
                return ControlFlow::Break(TerminationReason::Decode(error));
            }
        };

        match self.state {
            SessionState::AwaitingAnnounce => match message {
                Message::Announce { display_name } => self.join(display_name).await,
                other => {
                    warn!(kind = %other.kind(), "first frame was not an announce");
                    ControlFlow::Break(TerminationReason::ProtocolViolation(other.kind()))
                }
            },
            SessionState::Active => {
                if let Message::Broadcast { .. } = message {
                    self.relay(&message).await;
                } else {
                    debug!(kind = %message.kind(), "ignoring frame in active session");
                }
                ControlFlow::Continue(())
            }
            SessionState::Terminated => ControlFlow::Break(TerminationReason::ChannelClosed),
        }
    }

    async fn join(&mut self, display_name: String) -> ControlFlow<TerminationReason> {
        let participant = self
            .directory
            .register(Arc::clone(&self.channel), display_name.clone());
        info!(participant_id = %participant.id, display_name = %display_name, "participant joined");
        self.participant = Some(participant);

        let roster = Message::RosterSnapshot {
            entries: self.directory.roster(),
        };
        let frame = match encode(&roster) {
            Ok(frame) => Arc::new(frame),
            Err(error) => return ControlFlow::Break(TerminationReason::Encode(error)),
        };
        if let Err(error) = self.channel.send(frame).await {
            warn!(%error, "could not deliver roster to newcomer");
            return ControlFlow::Break(TerminationReason::RosterUndeliverable(error));
        }

        self.state = SessionState::Active;
        self.relay(&Message::Announce { display_name }).await;
        ControlFlow::Continue(())
    }

    async fn relay(&self, message: &Message) {
        match broadcast(message, &self.directory).await {
            Ok(report) if !report.evicted.is_empty() => {
                debug!(
                    delivered = report.delivered,
                    evicted = report.evicted.len(),
                    "broadcast evicted participants"
                );
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "broadcast failed"),
        }
    }

    fn finish(mut self, reason: TerminationReason) -> SessionOutcome {
        let removed = self.directory.remove(&self.channel);
        let participant = removed.or_else(|| self.participant.take());

        info!(
            participant_id = participant.as_ref().map(|p| p.id.get()),
            frames = self.frames,
            %reason,
            "session ended"
        );
        SessionOutcome {
            reason,
            participant,
            frames: self.frames,
        }
    }
}
