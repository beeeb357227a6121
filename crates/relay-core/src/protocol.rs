//! Wire protocol: the [`Message`] sum type and its JSON codec.
//!
//! Every frame is a flat JSON object with a `messagetype` string
//! discriminator plus variant-specific fields:
//!
//! | `messagetype`      | Variant                     | Fields                         |
//! |--------------------|-----------------------------|--------------------------------|
//! | `newUser`          | [`Message::Announce`]       | `username`                     |
//! | `broadcastMessage` | [`Message::Broadcast`]      | `username`, `payload`          |
//! | `userList`         | [`Message::RosterSnapshot`] | `users: [{userId, username}]`  |
//!
//! Decoding is two-pass: the frame is parsed once into a JSON object, a
//! minimal [`Envelope`] is read to find the discriminator, and the same object
//! is then decoded into the body type for that variant. This keeps "unknown
//! discriminator" distinct from "known discriminator, bad body".

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DecodeError, EncodeError};
use crate::ids::ParticipantId;

/// One entry of a roster snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Participant identity.
    #[serde(rename = "userId")]
    pub id: ParticipantId,
    /// Name the participant announced with.
    #[serde(rename = "username")]
    pub display_name: String,
}

/// A protocol message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "messagetype")]
pub enum Message {
    /// A client introduces itself. Also relayed to everyone as the join notice.
    #[serde(rename = "newUser")]
    Announce {
        /// Name chosen by the client.
        #[serde(rename = "username")]
        display_name: String,
    },
    /// A chat line relayed to every participant.
    #[serde(rename = "broadcastMessage")]
    Broadcast {
        /// Name the sender put on the message.
        #[serde(rename = "username")]
        sender_display_name: String,
        /// Message text.
        payload: String,
    },
    /// Server-originated list of everyone currently present.
    #[serde(rename = "userList")]
    RosterSnapshot {
        /// Participants in registration order.
        #[serde(rename = "users")]
        entries: Vec<RosterEntry>,
    },
}

impl Message {
    /// The variant tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Announce { .. } => MessageKind::Announce,
            Self::Broadcast { .. } => MessageKind::Broadcast,
            Self::RosterSnapshot { .. } => MessageKind::RosterSnapshot,
        }
    }
}

/// Discriminator values understood by the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `newUser`
    Announce,
    /// `broadcastMessage`
    Broadcast,
    /// `userList`
    RosterSnapshot,
}

impl MessageKind {
    /// The wire string for this kind.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Announce => "newUser",
            Self::Broadcast => "broadcastMessage",
            Self::RosterSnapshot => "userList",
        }
    }

    /// Look up a kind by its wire string.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "newUser" => Some(Self::Announce),
            "broadcastMessage" => Some(Self::Broadcast),
            "userList" => Some(Self::RosterSnapshot),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// First-pass view of a frame: only the discriminator.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    messagetype: Option<String>,
}

#[derive(Deserialize)]
struct AnnounceBody {
    username: String,
}

#[derive(Deserialize)]
struct BroadcastBody {
    username: String,
    payload: String,
}

#[derive(Deserialize)]
struct RosterBody {
    users: Vec<RosterEntry>,
}

/// Decode one wire frame.
pub fn decode(raw: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let envelope = Envelope::deserialize(&value).map_err(DecodeError::Malformed)?;
    let tag = envelope
        .messagetype
        .ok_or(DecodeError::MissingDiscriminator)?;
    let kind = MessageKind::from_tag(&tag).ok_or(DecodeError::UnknownDiscriminator(tag))?;

    let invalid = |source| DecodeError::InvalidPayload { kind, source };
    let message = match kind {
        MessageKind::Announce => {
            let body = AnnounceBody::deserialize(&value).map_err(invalid)?;
            Message::Announce {
                display_name: body.username,
            }
        }
        MessageKind::Broadcast => {
            let body = BroadcastBody::deserialize(&value).map_err(invalid)?;
            Message::Broadcast {
                sender_display_name: body.username,
                payload: body.payload,
            }
        }
        MessageKind::RosterSnapshot => {
            let body = RosterBody::deserialize(&value).map_err(invalid)?;
            Message::RosterSnapshot {
                entries: body.users,
            }
        }
    };
    Ok(message)
}

/// Encode a message as a wire frame.
pub fn encode(message: &Message) -> Result<String, EncodeError> {
    serde_json::to_string(message).map_err(|source| EncodeError {
        kind: message.kind(),
        source,
    })
}
