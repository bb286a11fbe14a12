//! Lifecycle commands arriving over the gateway.
//!
//! Each command runs the matching [`ChatService`] operation off the async
//! runtime and publishes the result. Failures are logged and otherwise
//! invisible to the client: the absence of a broadcast is the only signal.

use tracing::{error, warn};

use tandem_core::ChatService;
use tandem_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

pub async fn handle_command(
    chat: &ChatService,
    dispatcher: &Dispatcher,
    username: &str,
    cmd: GatewayCommand,
) {
    match cmd {
        // Connection-level commands are handled by the session loop
        GatewayCommand::Identify { .. } | GatewayCommand::Subscribe { .. } => {}

        GatewayCommand::SendMessage {
            room_id,
            content,
            message_type,
        } => {
            let sender = username.to_string();
            let rid = room_id.clone();
            let sent = run_blocking(chat, move |chat| {
                chat.send(&rid, &sender, &content, message_type)
            })
            .await;

            match sent {
                Some(Ok(message)) => {
                    dispatcher.publish_with_notify(
                        &room_id,
                        username,
                        GatewayEvent::MessageCreate(message),
                    );
                }
                Some(Err(e)) => warn!("{} send to {} dropped: {}", username, room_id, e),
                None => {}
            }
        }

        GatewayCommand::MarkRead { room_id } => {
            let reader = username.to_string();
            let rid = room_id.clone();
            let receipt = run_blocking(chat, move |chat| chat.mark_read(&rid, &reader)).await;

            match receipt {
                Some(Ok(receipt)) => {
                    dispatcher.publish_with_notify(
                        &room_id,
                        username,
                        GatewayEvent::MessageRead {
                            room_id: receipt.room_id,
                            reader: receipt.reader,
                        },
                    );
                }
                Some(Err(e)) => warn!("{} read of {} dropped: {}", username, room_id, e),
                None => {}
            }
        }

        GatewayCommand::StartTyping { room_id } => {
            dispatcher.publish_room(
                &room_id,
                GatewayEvent::TypingStart {
                    room_id: room_id.clone(),
                    username: username.to_string(),
                },
            );
        }

        GatewayCommand::Revoke { message_id } => {
            let requester = username.to_string();
            let revoked =
                run_blocking(chat, move |chat| chat.revoke(message_id, &requester)).await;

            if let Some(Some(message)) = revoked {
                let room_id = message.room_id.clone();
                dispatcher.publish_room(&room_id, GatewayEvent::MessageRevoke(message));
            }
        }

        GatewayCommand::React {
            message_id,
            content,
        } => {
            let reactor = username.to_string();
            let snapshot =
                run_blocking(chat, move |chat| chat.react(message_id, &reactor, &content)).await;

            if let Some(Some(message)) = snapshot {
                let room_id = message.room_id.clone();
                dispatcher.publish_room(&room_id, GatewayEvent::MessageReact(message));
            }
        }
    }
}

/// Run blocking DB work off the async runtime. `None` means the task
/// itself failed.
async fn run_blocking<F, T>(chat: &ChatService, f: F) -> Option<T>
where
    F: FnOnce(&ChatService) -> T + Send + 'static,
    T: Send + 'static,
{
    let chat = chat.clone();
    tokio::task::spawn_blocking(move || f(&chat))
        .await
        .map_err(|e| error!("spawn_blocking join error: {}", e))
        .ok()
}
