use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            username     TEXT NOT NULL UNIQUE,
            password     TEXT NOT NULL,
            display_name TEXT,
            status       TEXT NOT NULL DEFAULT 'OFFLINE',
            last_active  INTEGER,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Timestamps are microseconds since the Unix epoch.
        CREATE TABLE IF NOT EXISTS messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id       TEXT NOT NULL,
            sender        TEXT NOT NULL,
            content       TEXT NOT NULL,
            message_type  TEXT NOT NULL,
            created_at    INTEGER,
            status        TEXT NOT NULL DEFAULT 'SENT',
            reactions     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        -- Per-user soft delete. The key makes repeat hides a no-op.
        CREATE TABLE IF NOT EXISTS message_hidden (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            username    TEXT NOT NULL,
            PRIMARY KEY (message_id, username)
        );

        CREATE TABLE IF NOT EXISTS clear_records (
            username    TEXT NOT NULL,
            room_id     TEXT NOT NULL,
            cleared_at  INTEGER NOT NULL,
            PRIMARY KEY (username, room_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
