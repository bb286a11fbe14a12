use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::trace;
use uuid::Uuid;

use tandem_types::events::{GatewayEvent, Topic};
use tandem_types::room;

/// An event together with the topic it was published on.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub topic: Topic,
    pub event: GatewayEvent,
}

/// Topic-based fan-out to every connected client.
///
/// Publishing never waits for subscribers. A connection that is not
/// listening, or lags too far behind, misses the event and must reload
/// history.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection receives every dispatch and filters by topic
    broadcast_tx: broadcast::Sender<Dispatch>,

    /// Track online users: username -> live connection ids
    online_users: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Dispatch> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn publish(&self, topic: Topic, event: GatewayEvent) {
        trace!("Publishing on {}", topic);
        // No receivers is not an error: nobody is online.
        let _ = self.inner.broadcast_tx.send(Dispatch { topic, event });
    }

    pub fn publish_room(&self, room_id: &str, event: GatewayEvent) {
        self.publish(Topic::Room(room_id.to_string()), event);
    }

    /// Publish to the room, plus a copy to the partner's notification feed
    /// when `actor`'s partner can be resolved from the room id.
    ///
    /// A partner subscribed to the room gets the event on both topics, so
    /// clients de-duplicate by message id.
    pub fn publish_with_notify(&self, room_id: &str, actor: &str, event: GatewayEvent) {
        if let Some(partner) = room::partner(room_id, actor) {
            self.publish(Topic::Notify(partner.to_string()), event.clone());
        }
        self.publish_room(room_id, event);
    }

    /// Register a connection for `username`. Returns its id and whether it
    /// is the user's first live connection.
    pub async fn connect(&self, username: &str) -> (Uuid, bool) {
        let conn_id = Uuid::new_v4();
        let mut online = self.inner.online_users.write().await;
        let conns = online.entry(username.to_string()).or_default();
        let first = conns.is_empty();
        conns.insert(conn_id);
        (conn_id, first)
    }

    /// Drop a connection. Returns true if it was the user's last one, so an
    /// old socket closing never marks a newer session offline.
    pub async fn disconnect(&self, username: &str, conn_id: Uuid) -> bool {
        let mut online = self.inner.online_users.write().await;
        let Some(conns) = online.get_mut(username) else {
            return false;
        };
        if !conns.remove(&conn_id) {
            return false;
        }
        if conns.is_empty() {
            online.remove(username);
            true
        } else {
            false
        }
    }

    /// Usernames with at least one live connection.
    pub async fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.inner.online_users.read().await.keys().cloned().collect();
        users.sort();
        users
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
