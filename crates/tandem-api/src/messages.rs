use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use tandem_core::ChatError;
use tandem_types::api::{ClearHistoryResponse, Claims, SearchHit, SearchQuery};
use tandem_types::models::ChatMessage;
use tandem_types::room;

use crate::auth::AppState;
use crate::run_chat;

/// GET /api/rooms/{room_id}/messages: the caller's view of a room.
pub async fn get_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let messages = run_chat(&state, move |chat| {
        ensure_member(&room_id, &claims.username)?;
        chat.history(&room_id, &claims.username)
    })
    .await?;

    Ok(Json(messages))
}

/// DELETE /api/rooms/{room_id}/messages: clear the room for the caller only.
pub async fn clear_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ClearHistoryResponse>, StatusCode> {
    let cleared_at = run_chat(&state, move |chat| {
        ensure_member(&room_id, &claims.username)?;
        chat.clear_history(&room_id, &claims.username)
    })
    .await?;

    Ok(Json(ClearHistoryResponse { cleared_at }))
}

/// DELETE /api/messages/{message_id}: hide one message from the caller.
pub async fn delete_for_me(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    run_chat(&state, move |chat| {
        chat.soft_delete_for_user(message_id, &claims.username)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/search?keyword=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SearchHit>>, StatusCode> {
    let hits = run_chat(&state, move |chat| {
        chat.search(&claims.username, &query.keyword)
    })
    .await?;

    Ok(Json(hits))
}

/// GET /api/conversations: newest visible message per partner.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BTreeMap<String, ChatMessage>>, StatusCode> {
    let latest = run_chat(&state, move |chat| chat.latest_summaries(&claims.username)).await?;
    Ok(Json(latest))
}

fn ensure_member(room_id: &str, username: &str) -> Result<(), ChatError> {
    if room::is_member(room_id, username) {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}
