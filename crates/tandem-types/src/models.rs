use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a chat message.
///
/// `React` only ever appears on broadcast snapshots; it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Chat,
    Join,
    Leave,
    Image,
    Revoked,
    React,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::Image => "IMAGE",
            Self::Revoked => "REVOKED",
            Self::React => "REACT",
        }
    }

    /// Whether a client may create a message of this type through `send`.
    pub fn is_sendable(&self) -> bool {
        !matches!(self, Self::Revoked | Self::React)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHAT" => Ok(Self::Chat),
            "JOIN" => Ok(Self::Join),
            "LEAVE" => Ok(Self::Leave),
            "IMAGE" => Ok(Self::Image),
            "REVOKED" => Ok(Self::Revoked),
            "REACT" => Ok(Self::React),
            other => Err(UnknownVariant {
                kind: "message type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Read => "READ",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "READ" => Ok(Self::Read),
            other => Err(UnknownVariant {
                kind: "message status",
                value: other.to_string(),
            }),
        }
    }
}

/// One reaction per user: username -> emoji. Setting a user's reaction
/// replaces whatever they had before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, String>);

impl Reactions {
    /// Decode the stored column. Absent or empty means no reactions.
    pub fn decode(raw: Option<&str>) -> Result<Self, serde_json::Error> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(json) => serde_json::from_str(json),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn set(&mut self, username: &str, emoji: &str) {
        self.0.insert(username.to_string(), emoji.to_string());
    }

    pub fn get(&self, username: &str) -> Option<&str> {
        self.0.get(username).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub message_type: MessageType,
    /// Server-assigned send time. Only legacy rows lack one.
    pub timestamp: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub reactions: Reactions,
}

/// Public view of a registered user, for the contact list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPresence {
    pub username: String,
    pub display_name: Option<String>,
    pub online: bool,
    pub last_active: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reaction_column_decodes_to_empty_map() {
        assert!(Reactions::decode(None).unwrap().is_empty());
        assert!(Reactions::decode(Some("")).unwrap().is_empty());
        assert!(Reactions::decode(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn reaction_overwrites_per_user() {
        let mut reactions = Reactions::decode(Some(r#"{"alice":"👍"}"#)).unwrap();
        reactions.set("bob", "❤️");
        reactions.set("alice", "😂");
        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions.get("alice"), Some("😂"));
        assert_eq!(reactions.get("bob"), Some("❤️"));
    }

    #[test]
    fn garbage_reaction_column_is_an_error() {
        assert!(Reactions::decode(Some("alice:👍,bob")).is_err());
    }

    #[test]
    fn message_type_wire_names() {
        assert_eq!(serde_json::to_string(&MessageType::Revoked).unwrap(), "\"REVOKED\"");
        assert_eq!("IMAGE".parse::<MessageType>().unwrap(), MessageType::Image);
        assert!("TYPING".parse::<MessageType>().is_err());
        assert!(!MessageType::React.is_sendable());
        assert!(MessageType::Join.is_sendable());
    }
}
