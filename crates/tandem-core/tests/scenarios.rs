use std::sync::Arc;
use std::thread;

use tandem_core::ChatService;
use tandem_db::Database;
use tandem_types::models::{MessageStatus, MessageType};
use tandem_types::room;

fn service() -> ChatService {
    ChatService::new(Arc::new(Database::open_in_memory().unwrap()))
}

#[test]
fn read_receipt_visible_to_both_sides() {
    let chat = service();
    let room_id = room::room_id("A", "B");

    let hello = chat.send(&room_id, "A", "hello", MessageType::Chat).unwrap();
    assert_eq!(hello.status, MessageStatus::Sent);

    chat.mark_read(&room_id, "B").unwrap();

    for viewer in ["A", "B"] {
        let history = chat.history(&room_id, viewer).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, hello.id);
        assert_eq!(history[0].status, MessageStatus::Read);
    }
}

#[test]
fn sender_reading_own_room_changes_nothing() {
    let chat = service();
    chat.send("A_B", "A", "hello", MessageType::Chat).unwrap();

    let receipt = chat.mark_read("A_B", "A").unwrap();
    assert_eq!(receipt.updated, 0);
    assert_eq!(chat.history("A_B", "B").unwrap()[0].status, MessageStatus::Sent);
}

#[test]
fn image_hidden_only_for_the_user_who_deleted_it() {
    let chat = service();
    let image = chat
        .send("A_B", "A", "data:image/png;base64,iVBORw0KGgo=", MessageType::Image)
        .unwrap();

    chat.soft_delete_for_user(image.id, "A").unwrap();

    assert!(chat.history("A_B", "A").unwrap().is_empty());
    let b_view = chat.history("A_B", "B").unwrap();
    assert_eq!(b_view.len(), 1);
    assert_eq!(b_view[0].message_type, MessageType::Image);
}

#[test]
fn revoked_message_is_revoked_for_everyone() {
    let chat = service();
    let m = chat.send("A_B", "A", "secret", MessageType::Chat).unwrap();
    chat.revoke(m.id, "A").unwrap();

    for viewer in ["A", "B"] {
        let history = chat.history("A_B", viewer).unwrap();
        assert_eq!(history[0].message_type, MessageType::Revoked);
        assert_eq!(history[0].content, tandem_core::REVOKED_PLACEHOLDER);
    }

    // revoked content no longer turns up in search
    assert!(chat.search("B", "secret").unwrap().is_empty());
}

#[test]
fn concurrent_reactions_all_survive() {
    let chat = service();
    let messages: Vec<_> = (0..4)
        .map(|i| chat.send("A_B", "A", &format!("react to me {i}"), MessageType::Chat).unwrap())
        .collect();

    let handles: Vec<_> = ["A", "B"]
        .into_iter()
        .flat_map(|user| messages.iter().map(move |m| (user, m.id)))
        .map(|(user, id)| {
            let chat = chat.clone();
            thread::spawn(move || {
                for emoji in ["👍", "❤️", "😂"] {
                    chat.react(id, user, emoji).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for stored in chat.history("A_B", "A").unwrap() {
        assert_eq!(stored.reactions.len(), 2);
        assert_eq!(stored.reactions.get("A"), Some("😂"));
        assert_eq!(stored.reactions.get("B"), Some("😂"));
    }
}

#[test]
fn clearing_one_room_leaves_others() {
    let chat = service();
    chat.send("A_B", "B", "in ab", MessageType::Chat).unwrap();
    chat.send("C_A", "C", "in ca", MessageType::Chat).unwrap();

    chat.clear_history("A_B", "A").unwrap();

    assert!(chat.history("A_B", "A").unwrap().is_empty());
    assert_eq!(chat.history("C_A", "A").unwrap().len(), 1);

    let latest = chat.latest_summaries("A").unwrap();
    assert!(!latest.contains_key("B"));
    assert_eq!(latest["C"].content, "in ca");
}
