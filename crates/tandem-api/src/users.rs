use axum::{Json, extract::State, http::StatusCode};

use tandem_types::models::UserPresence;

use crate::auth::AppState;
use crate::run_chat;

/// GET /api/users: everyone registered, with last known presence.
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserPresence>>, StatusCode> {
    let users = run_chat(&state, |chat| chat.list_users()).await?;
    Ok(Json(users))
}
