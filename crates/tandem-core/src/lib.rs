//! Message lifecycle and visibility rules for two-party rooms.
//!
//! [`ChatService`] owns every state change a message goes through (send,
//! read, revoke, react, hide) and builds the per-user views of the shared
//! log (history, search, latest summaries). It is synchronous; async callers
//! run it inside `spawn_blocking`.

pub mod error;
pub mod history;
pub mod lifecycle;
pub mod normalize;
pub mod presence;
pub mod search;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use tandem_db::Database;
use tandem_db::models::MessageRow;
use tandem_types::models::{ChatMessage, Reactions};

pub use error::ChatError;
pub use lifecycle::{REVOKED_PLACEHOLDER, ReadReceipt};

#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
}

impl ChatService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Current time at storage precision.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    from_micros(to_micros(now)).unwrap_or(now)
}

/// Strict conversion: any undecodable column is an error.
pub(crate) fn decode_row(row: MessageRow) -> Result<ChatMessage, ChatError> {
    let reactions = Reactions::decode(row.reactions.as_deref()).map_err(|e| {
        ChatError::MalformedState(format!("reactions of message {}: {}", row.id, e))
    })?;
    build_message(row, reactions)
}

/// Lenient conversion for read views. Broken reactions are shown as none
/// rather than hiding the message; an unknown type or status drops the row.
pub(crate) fn view_row(row: MessageRow) -> Option<ChatMessage> {
    let reactions = Reactions::decode(row.reactions.as_deref()).unwrap_or_else(|e| {
        warn!("Message {} has undecodable reactions: {}", row.id, e);
        Reactions::default()
    });

    let id = row.id;
    build_message(row, reactions)
        .map_err(|e| warn!("Skipping message {}: {}", id, e))
        .ok()
}

fn build_message(row: MessageRow, reactions: Reactions) -> Result<ChatMessage, ChatError> {
    let message_type = row
        .message_type
        .parse()
        .map_err(|e| ChatError::MalformedState(format!("message {}: {}", row.id, e)))?;
    let status = row
        .status
        .parse()
        .map_err(|e| ChatError::MalformedState(format!("message {}: {}", row.id, e)))?;

    Ok(ChatMessage {
        id: row.id,
        room_id: row.room_id,
        sender: row.sender,
        content: row.content,
        message_type,
        timestamp: row.created_at.and_then(from_micros),
        status,
        reactions,
    })
}
