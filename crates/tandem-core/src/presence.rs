use tracing::info;

use tandem_db::models::UserRow;
use tandem_types::models::UserPresence;

use crate::{ChatError, ChatService, from_micros, now, to_micros};

const ONLINE: &str = "ONLINE";
const OFFLINE: &str = "OFFLINE";

impl ChatService {
    /// Record that `username` connected or disconnected. Returns the new
    /// presence, or `None` for an unknown user.
    pub fn set_presence(
        &self,
        username: &str,
        online: bool,
    ) -> Result<Option<UserPresence>, ChatError> {
        let status = if online { ONLINE } else { OFFLINE };
        if !self.db.set_user_status(username, status, to_micros(now()))? {
            return Ok(None);
        }

        Ok(self.db.get_user_by_username(username)?.map(presence_from_row))
    }

    /// Startup reconciliation: nobody is connected yet, so any persisted
    /// ONLINE flag is stale.
    pub fn reset_presence(&self) -> Result<usize, ChatError> {
        let reset = self.db.reset_online_users(to_micros(now()))?;
        info!("Reset {} stale online users to offline", reset);
        Ok(reset)
    }

    pub fn list_users(&self) -> Result<Vec<UserPresence>, ChatError> {
        Ok(self
            .db
            .list_users()?
            .into_iter()
            .map(presence_from_row)
            .collect())
    }
}

fn presence_from_row(row: UserRow) -> UserPresence {
    UserPresence {
        online: row.status == ONLINE,
        last_active: row.last_active.and_then(from_micros),
        username: row.username,
        display_name: row.display_name,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tandem_db::Database;

    use super::*;

    #[test]
    fn presence_round_trip_and_reset() {
        let chat = ChatService::new(Arc::new(Database::open_in_memory().unwrap()));
        chat.db().create_user("1", "alice", "hash", None).unwrap();
        chat.db().create_user("2", "bob", "hash", None).unwrap();

        let alice = chat.set_presence("alice", true).unwrap().unwrap();
        assert!(alice.online);
        assert!(alice.last_active.is_some());
        assert!(chat.set_presence("nobody", true).unwrap().is_none());

        assert_eq!(chat.reset_presence().unwrap(), 1);
        assert!(chat.list_users().unwrap().iter().all(|u| !u.online));
    }
}
