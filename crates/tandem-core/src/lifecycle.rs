use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use tandem_types::models::{ChatMessage, MessageType, Reactions};
use tandem_types::room;

use crate::{ChatError, ChatService, decode_row, now, to_micros};

/// Content that replaces a revoked message.
pub const REVOKED_PLACEHOLDER: &str = "This message was revoked";

/// Payload of a read event: `reader` has seen everything in `room_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub room_id: String,
    pub reader: String,
    /// How many messages flipped to READ; zero on a repeat.
    pub updated: usize,
}

impl ChatService {
    /// Store a new message stamped with the server clock. The sender must
    /// be one of the room's two participants.
    pub fn send(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
        message_type: MessageType,
    ) -> Result<ChatMessage, ChatError> {
        if !message_type.is_sendable() {
            return Err(ChatError::Unsendable(message_type));
        }
        if !room::is_member(room_id, sender) {
            return Err(ChatError::Forbidden);
        }

        let row = self.db.insert_message(
            room_id,
            sender,
            content,
            message_type.as_str(),
            Some(to_micros(now())),
        )?;

        debug!("{} sent message {} ({}) to {}", sender, row.id, message_type, room_id);
        decode_row(row)
    }

    /// Mark everything the partner sent in `room_id` as read.
    ///
    /// Always yields a receipt, even when nothing changed, so repeat reads
    /// are still broadcast. Outsiders get [`ChatError::Forbidden`].
    pub fn mark_read(&self, room_id: &str, reader: &str) -> Result<ReadReceipt, ChatError> {
        if !room::is_member(room_id, reader) {
            return Err(ChatError::Forbidden);
        }

        let updated = self.db.mark_room_read(room_id, reader)?;
        if updated > 0 {
            debug!("{} read {} messages in {}", reader, updated, room_id);
        }

        Ok(ReadReceipt {
            room_id: room_id.to_string(),
            reader: reader.to_string(),
            updated,
        })
    }

    /// Replace a message's content with [`REVOKED_PLACEHOLDER`].
    ///
    /// Only the sender may revoke. Any failure leaves the message as it was
    /// and returns `None`.
    pub fn revoke(&self, message_id: i64, requester: &str) -> Option<ChatMessage> {
        self.try_revoke(message_id, requester)
            .map_err(|e| absorb("revoke", message_id, requester, e))
            .ok()
    }

    fn try_revoke(&self, message_id: i64, requester: &str) -> Result<ChatMessage, ChatError> {
        let row = self
            .db
            .update_message::<_, ChatError>(message_id, |row| {
                if row.sender != requester {
                    return Err(ChatError::Forbidden);
                }
                row.message_type = MessageType::Revoked.as_str().to_string();
                row.content = REVOKED_PLACEHOLDER.to_string();
                Ok(true)
            })?
            .ok_or(ChatError::NotFound(message_id))?;

        info!("{} revoked message {}", requester, message_id);
        decode_row(row)
    }

    /// Set `reactor`'s reaction on a message, replacing any previous one.
    ///
    /// Returns a snapshot typed `REACT` for broadcasting; the stored type is
    /// untouched. A missing message, a reactor outside the room or an
    /// undecodable reaction column makes this a no-op returning `None`.
    pub fn react(&self, message_id: i64, reactor: &str, emoji: &str) -> Option<ChatMessage> {
        self.try_react(message_id, reactor, emoji)
            .map_err(|e| absorb("react", message_id, reactor, e))
            .ok()
    }

    fn try_react(
        &self,
        message_id: i64,
        reactor: &str,
        emoji: &str,
    ) -> Result<ChatMessage, ChatError> {
        let row = self
            .db
            .update_message::<_, ChatError>(message_id, |row| {
                if !room::is_member(&row.room_id, reactor) {
                    return Err(ChatError::Forbidden);
                }
                let mut reactions = Reactions::decode(row.reactions.as_deref()).map_err(|e| {
                    ChatError::MalformedState(format!("reactions of message {}: {}", row.id, e))
                })?;
                reactions.set(reactor, emoji);
                let encoded = reactions
                    .encode()
                    .map_err(|e| ChatError::MalformedState(e.to_string()))?;
                row.reactions = Some(encoded);
                Ok(true)
            })?
            .ok_or(ChatError::NotFound(message_id))?;

        let mut snapshot = decode_row(row)?;
        snapshot.message_type = MessageType::React;
        Ok(snapshot)
    }

    /// Hide a message from `username` only. Repeat calls are no-ops.
    pub fn soft_delete_for_user(&self, message_id: i64, username: &str) -> Result<(), ChatError> {
        match self.db.hide_message(message_id, username)? {
            None => Err(ChatError::NotFound(message_id)),
            Some(true) => {
                debug!("{} hid message {}", username, message_id);
                Ok(())
            }
            Some(false) => Ok(()),
        }
    }

    /// Hide everything currently in `room_id` from `username`. Returns the
    /// new watermark; only messages strictly after it stay visible.
    pub fn clear_history(&self, room_id: &str, username: &str) -> Result<DateTime<Utc>, ChatError> {
        let cleared_at = now();
        self.db
            .upsert_clear_record(username, room_id, to_micros(cleared_at))?;
        info!("{} cleared history of {}", username, room_id);
        Ok(cleared_at)
    }
}

/// Recovery policy for event-channel mutations: log and do nothing.
fn absorb(op: &str, message_id: i64, user: &str, err: ChatError) {
    match err {
        ChatError::NotFound(_) | ChatError::Forbidden => {
            debug!("{} of message {} by {} ignored: {}", op, message_id, user, err)
        }
        ChatError::MalformedState(_) | ChatError::Unsendable(_) => {
            warn!("{} of message {} by {} dropped: {}", op, message_id, user, err)
        }
        ChatError::Storage(_) => {
            error!("{} of message {} by {} failed: {}", op, message_id, user, err)
        }
    }
}
