use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use tandem_core::ChatService;
use tandem_types::events::{GatewayCommand, GatewayEvent, Topic};
use tandem_types::room;

use crate::commands::handle_command;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<std::sync::RwLock<HashSet<String>>>;

/// Handle a single WebSocket connection.
///
/// The client must send `Identify` with a valid token first; after that the
/// connection receives its own notifications, presence updates and events
/// for the rooms it subscribes to.
pub async fn handle_connection(
    socket: WebSocket,
    chat: ChatService,
    dispatcher: Dispatcher,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let username = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(username) => username,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", username);

    let ready = GatewayEvent::Ready {
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Subscribe before announcing ourselves so our own presence is not missed
    let broadcast_rx = dispatcher.subscribe();
    let (conn_id, first) = dispatcher.connect(&username).await;
    if first {
        announce_presence(&chat, &dispatcher, &username, true).await;
    }

    for other in dispatcher.online_users().await {
        if other == username {
            continue;
        }
        let event = GatewayEvent::PresenceUpdate {
            username: other,
            online: true,
            last_active: None,
        };
        if send_event(&mut sender, &event).await.is_err() {
            break;
        }
    }

    run_connection_loop(sender, receiver, broadcast_rx, chat.clone(), dispatcher.clone(), username.clone())
        .await;

    if dispatcher.disconnect(&username, conn_id).await {
        announce_presence(&chat, &dispatcher, &username, false).await;
    }
    info!("{} disconnected from gateway", username);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut broadcast_rx: tokio::sync::broadcast::Receiver<crate::dispatcher::Dispatch>,
    chat: ChatService,
    dispatcher: Dispatcher,
    username: String,
) {
    // Per-connection room subscriptions (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward matching dispatches -> client, with heartbeat
    let username_send = username.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let dispatch = match result {
                        Ok(dispatch) => dispatch,
                        Err(RecvError::Lagged(n)) => {
                            warn!("{} lagged by {} events", username_send, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if !wants(&dispatch.topic, &username_send, &send_subscriptions) {
                        continue;
                    }

                    if send_event(&mut sender, &dispatch.event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Subscribe { room_ids }) => {
                        subscribe(&username, room_ids, &recv_subscriptions);
                    }
                    Ok(cmd) => handle_command(&chat, &dispatcher, &username, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            username,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Replace the room set, keeping only rooms `username` belongs to.
fn subscribe(username: &str, room_ids: Vec<String>, subscriptions: &Subscriptions) {
    let (allowed, rejected): (Vec<String>, Vec<String>) = room_ids
        .into_iter()
        .partition(|room_id| room::is_member(room_id, username));

    if !rejected.is_empty() {
        warn!("{} tried to subscribe to foreign rooms: {:?}", username, rejected);
    }
    info!("{} subscribing to {} rooms", username, allowed.len());

    let mut subs = subscriptions.write().expect("subscription lock poisoned");
    *subs = allowed.into_iter().collect();
}

fn wants(topic: &Topic, username: &str, subscriptions: &Subscriptions) -> bool {
    match topic {
        Topic::Room(room_id) => subscriptions
            .read()
            .expect("subscription lock poisoned")
            .contains(room_id),
        Topic::Notify(target) => target == username,
        Topic::Presence => true,
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| error!("Event encode failed: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn announce_presence(chat: &ChatService, dispatcher: &Dispatcher, username: &str, online: bool) {
    let chat = chat.clone();
    let name = username.to_string();
    let stored = tokio::task::spawn_blocking(move || chat.set_presence(&name, online)).await;

    let last_active = match stored {
        Ok(Ok(Some(presence))) => presence.last_active,
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            error!("Failed to store presence of {}: {}", username, e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    };

    dispatcher.publish(
        Topic::Presence,
        GatewayEvent::PresenceUpdate {
            username: username.to_string(),
            online,
            last_active,
        },
    );
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<String> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use tandem_types::api::Claims;

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.username);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriptions_filter_foreign_rooms() {
        let subs: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
        subscribe(
            "alice",
            vec!["alice_bob".into(), "carol_dave".into(), "carol_alice".into()],
            &subs,
        );

        assert!(wants(&Topic::Room("alice_bob".into()), "alice", &subs));
        assert!(wants(&Topic::Room("carol_alice".into()), "alice", &subs));
        assert!(!wants(&Topic::Room("carol_dave".into()), "alice", &subs));
    }

    #[test]
    fn notify_and_presence_need_no_subscription() {
        let subs: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
        assert!(wants(&Topic::Notify("alice".into()), "alice", &subs));
        assert!(!wants(&Topic::Notify("bob".into()), "alice", &subs));
        assert!(wants(&Topic::Presence, "alice", &subs));
    }
}
