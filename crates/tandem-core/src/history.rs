use tandem_types::models::ChatMessage;

use crate::{ChatError, ChatService, view_row};

impl ChatService {
    /// Messages of `room_id` that `username` may see, oldest first.
    ///
    /// Drops everything at or before the user's clear watermark and every
    /// message they hid. The other participant's view is unaffected.
    pub fn history(&self, room_id: &str, username: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let since = self
            .db
            .get_clear_record(username, room_id)?
            .map(|record| record.cleared_at);

        let rows = self.db.room_history(room_id, username, since)?;
        Ok(rows.into_iter().filter_map(view_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tandem_db::Database;
    use tandem_types::models::MessageType;

    use super::*;

    fn service() -> ChatService {
        ChatService::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn watermark_is_exclusive() {
        let chat = service();
        let db = chat.db();
        db.insert_message("alice_bob", "bob", "before", "CHAT", Some(999)).unwrap();
        db.insert_message("alice_bob", "bob", "at", "CHAT", Some(1_000)).unwrap();
        db.insert_message("alice_bob", "bob", "after", "CHAT", Some(1_001)).unwrap();
        db.upsert_clear_record("alice", "alice_bob", 1_000).unwrap();

        let alice = chat.history("alice_bob", "alice").unwrap();
        assert_eq!(contents(&alice), vec!["after"]);

        let bob = chat.history("alice_bob", "bob").unwrap();
        assert_eq!(bob.len(), 3);
    }

    #[test]
    fn legacy_rows_without_timestamp() {
        let chat = service();
        let db = chat.db();
        db.insert_message("alice_bob", "bob", "legacy", "CHAT", None).unwrap();
        db.insert_message("alice_bob", "bob", "dated", "CHAT", Some(5)).unwrap();

        let before_clear = chat.history("alice_bob", "alice").unwrap();
        assert_eq!(contents(&before_clear), vec!["legacy", "dated"]);
        assert!(before_clear[0].timestamp.is_none());

        db.upsert_clear_record("alice", "alice_bob", 1).unwrap();
        let after_clear = chat.history("alice_bob", "alice").unwrap();
        assert_eq!(contents(&after_clear), vec!["dated"]);
    }

    #[test]
    fn clear_then_send_shows_only_new() {
        let chat = service();
        chat.send("alice_bob", "alice", "old", MessageType::Chat).unwrap();
        let cleared_at = chat.clear_history("alice_bob", "alice").unwrap();

        let fresh = chat.db()
            .insert_message(
                "alice_bob",
                "bob",
                "new",
                "CHAT",
                Some(cleared_at.timestamp_micros() + 1),
            )
            .unwrap();

        let alice = chat.history("alice_bob", "alice").unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, fresh.id);
    }

    #[test]
    fn soft_delete_twice_is_same_as_once() {
        let chat = service();
        let m = chat.send("alice_bob", "alice", "hi", MessageType::Chat).unwrap();

        chat.soft_delete_for_user(m.id, "alice").unwrap();
        let once = chat.history("alice_bob", "alice").unwrap();
        chat.soft_delete_for_user(m.id, "alice").unwrap();
        let twice = chat.history("alice_bob", "alice").unwrap();

        assert!(once.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn undecodable_reactions_still_listed() {
        let chat = service();
        let m = chat.send("alice_bob", "alice", "hi", MessageType::Chat).unwrap();
        chat.db()
            .with_conn_mut(|conn| {
                conn.execute("UPDATE messages SET reactions = '[' WHERE id = ?1", [m.id])?;
                Ok(())
            })
            .unwrap();

        let listed = chat.history("alice_bob", "bob").unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].reactions.is_empty());
    }
}
