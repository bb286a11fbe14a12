pub mod auth;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    http::StatusCode,
    routing::{delete, get, post},
};
use tracing::error;

use tandem_core::{ChatError, ChatService};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// HTTP routes. The gateway WebSocket route is added by the server.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route(
            "/api/rooms/{room_id}/messages",
            get(messages::get_history).delete(messages::clear_history),
        )
        .route("/api/messages/{message_id}", delete(messages::delete_for_me))
        .route("/api/search", get(messages::search))
        .route("/api/conversations", get(messages::conversations))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Run a [`ChatService`] call off the async runtime and map its error to a
/// status code.
pub(crate) async fn run_chat<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&ChatService) -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || f(&chat))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_for)
}

pub(crate) fn status_for(err: ChatError) -> StatusCode {
    match err {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Forbidden => StatusCode::FORBIDDEN,
        ChatError::Unsendable(_) => StatusCode::BAD_REQUEST,
        ChatError::MalformedState(_) | ChatError::Storage(_) => {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
