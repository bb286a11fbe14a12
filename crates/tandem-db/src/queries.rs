use crate::models::{ClearRecordRow, MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str =
    "m.id, m.room_id, m.sender, m.content, m.message_type, m.created_at, m.status, m.reactions";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, password_hash, display_name],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, display_name, status, last_active, created_at
                 FROM users ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if no such user exists.
    pub fn set_user_status(&self, username: &str, status: &str, at: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET status = ?2, last_active = ?3 WHERE username = ?1",
                rusqlite::params![username, status, at],
            )?;
            Ok(n > 0)
        })
    }

    /// Flip every user still marked ONLINE to OFFLINE. Returns how many changed.
    pub fn reset_online_users(&self, at: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET status = 'OFFLINE', last_active = ?1 WHERE status = 'ONLINE'",
                [at],
            )?;
            Ok(n)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
        message_type: &str,
        created_at: Option<i64>,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (room_id, sender, content, message_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![room_id, sender, content, message_type, created_at],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Inserted message {} vanished", id))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Read-modify-write of a single message under the writer lock.
    ///
    /// `f` returns whether it changed the row; only then is the row written
    /// back. Returns `Ok(None)` if the message does not exist. An error from
    /// `f` rolls the transaction back.
    pub fn update_message<F, E>(&self, id: i64, f: F) -> std::result::Result<Option<MessageRow>, E>
    where
        F: FnOnce(&mut MessageRow) -> std::result::Result<bool, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;

        let Some(mut row) = query_message(&tx, id)? else {
            return Ok(None);
        };

        if f(&mut row)? {
            tx.execute(
                "UPDATE messages SET content = ?2, message_type = ?3, status = ?4, reactions = ?5
                 WHERE id = ?1",
                rusqlite::params![row.id, row.content, row.message_type, row.status, row.reactions],
            )
            .map_err(anyhow::Error::from)?;
            tx.commit().map_err(anyhow::Error::from)?;
        }

        Ok(Some(row))
    }

    /// Mark every message in the room not sent by `reader` as READ.
    /// Returns the number of messages that changed.
    pub fn mark_room_read(&self, room_id: &str, reader: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET status = 'READ'
                 WHERE room_id = ?1 AND sender <> ?2 AND status <> 'READ'",
                rusqlite::params![room_id, reader],
            )?;
            Ok(n)
        })
    }

    /// Hide a message from `username` only.
    ///
    /// Returns `None` if the message does not exist, otherwise whether a new
    /// marker was written (false when it was already hidden).
    pub fn hide_message(&self, id: i64, username: &str) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM messages WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Ok(None);
            }

            let n = conn.execute(
                "INSERT OR IGNORE INTO message_hidden (message_id, username) VALUES (?1, ?2)",
                rusqlite::params![id, username],
            )?;
            Ok(Some(n > 0))
        })
    }

    /// Messages in a room visible to `viewer`, oldest first.
    ///
    /// With `after`, only messages strictly newer than it are returned;
    /// rows without a timestamp fail that comparison and are dropped.
    pub fn room_history(
        &self,
        room_id: &str,
        viewer: &str,
        after: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 WHERE m.room_id = ?1
                   AND (?3 IS NULL OR m.created_at > ?3)
                   AND NOT EXISTS (
                       SELECT 1 FROM message_hidden h
                       WHERE h.message_id = m.id AND h.username = ?2)
                 ORDER BY m.created_at, m.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![room_id, viewer, after], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every message `username` can still see across rooms whose id contains
    /// their name: not hidden by them and newer than their clear watermark
    /// for that room. Optionally restricted to one message type.
    ///
    /// The room match is a substring match; callers resolve the partner to
    /// confirm membership.
    pub fn member_messages(
        &self,
        username: &str,
        message_type: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        let pattern = format!("%{}%", escape_like(username));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 LEFT JOIN clear_records c
                   ON c.username = ?1 AND c.room_id = m.room_id
                 WHERE m.room_id LIKE ?2 ESCAPE '\\'
                   AND (?3 IS NULL OR m.message_type = ?3)
                   AND (c.cleared_at IS NULL OR m.created_at > c.cleared_at)
                   AND NOT EXISTS (
                       SELECT 1 FROM message_hidden h
                       WHERE h.message_id = m.id AND h.username = ?1)
                 ORDER BY m.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![username, pattern, message_type], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Clear records --

    pub fn upsert_clear_record(&self, username: &str, room_id: &str, at: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO clear_records (username, room_id, cleared_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username, room_id) DO UPDATE SET cleared_at = excluded.cleared_at",
                rusqlite::params![username, room_id, at],
            )?;
            Ok(())
        })
    }

    pub fn get_clear_record(&self, username: &str, room_id: &str) -> Result<Option<ClearRecordRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username, room_id, cleared_at FROM clear_records
                 WHERE username = ?1 AND room_id = ?2",
                [username, room_id],
                |row| {
                    Ok(ClearRecordRow {
                        username: row.get(0)?,
                        room_id: row.get(1)?,
                        cleared_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, display_name, status, last_active, created_at
         FROM users WHERE username = ?1",
    )?;

    let row = stmt.query_row([username], map_user_row).optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], map_message_row).optional()?;
    Ok(row)
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        status: row.get(4)?,
        last_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        created_at: row.get(5)?,
        status: row.get(6)?,
        reactions: row.get(7)?,
    })
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn ids_are_monotonic() {
        let db = db();
        let a = db.insert_message("a_b", "a", "one", "CHAT", Some(1)).unwrap();
        let b = db.insert_message("a_b", "a", "two", "CHAT", Some(2)).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.status, "SENT");
        assert!(a.reactions.is_none());
    }

    #[test]
    fn history_respects_watermark_and_null_timestamps() {
        let db = db();
        db.insert_message("a_b", "a", "legacy", "CHAT", None).unwrap();
        db.insert_message("a_b", "a", "old", "CHAT", Some(10)).unwrap();
        db.insert_message("a_b", "b", "new", "CHAT", Some(30)).unwrap();

        let all = db.room_history("a_b", "a", None).unwrap();
        assert_eq!(all.len(), 3);

        let after = db.room_history("a_b", "a", Some(20)).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].content, "new");
    }

    #[test]
    fn hide_is_a_set_insert() {
        let db = db();
        let m = db.insert_message("a_b", "a", "hi", "CHAT", Some(1)).unwrap();
        assert_eq!(db.hide_message(m.id, "a").unwrap(), Some(true));
        assert_eq!(db.hide_message(m.id, "a").unwrap(), Some(false));
        assert_eq!(db.hide_message(m.id + 100, "a").unwrap(), None);

        assert!(db.room_history("a_b", "a", None).unwrap().is_empty());
        assert_eq!(db.room_history("a_b", "b", None).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_skips_own_and_already_read() {
        let db = db();
        db.insert_message("a_b", "a", "1", "CHAT", Some(1)).unwrap();
        db.insert_message("a_b", "a", "2", "CHAT", Some(2)).unwrap();
        db.insert_message("a_b", "b", "3", "CHAT", Some(3)).unwrap();

        assert_eq!(db.mark_room_read("a_b", "b").unwrap(), 2);
        assert_eq!(db.mark_room_read("a_b", "b").unwrap(), 0);

        let rows = db.room_history("a_b", "b", None).unwrap();
        assert_eq!(rows[2].status, "SENT");
    }

    #[test]
    fn clear_record_upserts() {
        let db = db();
        db.upsert_clear_record("a", "a_b", 5).unwrap();
        db.upsert_clear_record("a", "a_b", 9).unwrap();
        let rec = db.get_clear_record("a", "a_b").unwrap().unwrap();
        assert_eq!(rec.cleared_at, 9);
        assert!(db.get_clear_record("b", "a_b").unwrap().is_none());
    }

    #[test]
    fn update_message_rolls_back_on_error() {
        let db = db();
        let m = db.insert_message("a_b", "a", "hi", "CHAT", Some(1)).unwrap();

        let res: std::result::Result<_, anyhow::Error> = db.update_message(m.id, |row| {
            row.content = "changed".into();
            Err(anyhow::anyhow!("nope"))
        });
        assert!(res.is_err());
        assert_eq!(db.get_message(m.id).unwrap().unwrap().content, "hi");
    }

    #[test]
    fn member_messages_match_escaped_substring() {
        let db = db();
        db.insert_message("a_b", "a", "x", "CHAT", Some(1)).unwrap();
        db.insert_message("axb", "a", "y", "CHAT", Some(1)).unwrap();
        let rows = db.member_messages("a_b", None).unwrap();
        // literal underscore, not a LIKE wildcard
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn presence_reset_only_touches_online_users() {
        let db = db();
        db.create_user("1", "alice", "h", None).unwrap();
        db.create_user("2", "bob", "h", Some("Bob")).unwrap();
        assert!(db.set_user_status("alice", "ONLINE", 10).unwrap());

        assert_eq!(db.reset_online_users(20).unwrap(), 1);
        let alice = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(alice.status, "OFFLINE");
        assert_eq!(alice.last_active, Some(20));
        let bob = db.get_user_by_username("bob").unwrap().unwrap();
        assert_eq!(bob.last_active, None);
    }
}
