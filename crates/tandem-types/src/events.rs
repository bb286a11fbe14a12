use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, MessageType};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { username: String },

    /// A new message was stored
    MessageCreate(ChatMessage),

    /// `reader` has read everything their partner sent in `room_id`
    MessageRead { room_id: String, reader: String },

    /// A user started typing
    TypingStart { room_id: String, username: String },

    /// The sender revoked a message; content is already replaced
    MessageRevoke(ChatMessage),

    /// Snapshot of a message after a reaction changed. `message_type` is
    /// `REACT` on this payload only.
    MessageReact(ChatMessage),

    /// A user came online or went offline
    PresenceUpdate {
        username: String,
        online: bool,
        last_active: Option<DateTime<Utc>>,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of rooms this connection receives events for.
    Subscribe { room_ids: Vec<String> },

    SendMessage {
        room_id: String,
        content: String,
        #[serde(default = "default_message_type")]
        message_type: MessageType,
    },

    MarkRead { room_id: String },

    StartTyping { room_id: String },

    Revoke { message_id: i64 },

    React { message_id: i64, content: String },
}

fn default_message_type() -> MessageType {
    MessageType::Chat
}

/// Pub/sub topic an event is published on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Everyone subscribed to the room
    Room(String),
    /// A single user's notification feed
    Notify(String),
    /// Delivered to every connection
    Presence,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(room_id) => write!(f, "room:{room_id}"),
            Self::Notify(username) => write!(f, "notify:{username}"),
            Self::Presence => f.write_str("presence"),
        }
    }
}
