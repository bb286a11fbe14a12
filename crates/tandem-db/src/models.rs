/// Database row types. These map directly to SQLite rows.
/// Distinct from tandem-types models to keep the DB layer independent.
/// Instants are microseconds since the Unix epoch.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub status: String,
    pub last_active: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub message_type: String,
    pub created_at: Option<i64>,
    pub status: String,
    /// JSON object of username -> emoji, NULL until the first reaction
    pub reactions: Option<String>,
}

pub struct ClearRecordRow {
    pub username: String,
    pub room_id: String,
    pub cleared_at: i64,
}
