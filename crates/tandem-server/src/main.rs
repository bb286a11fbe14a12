use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_api::auth::AppStateInner;
use tandem_core::ChatService;
use tandem_gateway::connection;
use tandem_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct GatewayState {
    chat: ChatService,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

struct Config {
    host: String,
    port: u16,
    db_path: PathBuf,
    jwt_secret: String,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: std::env::var("TANDEM_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("TANDEM_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            db_path: std::env::var("TANDEM_DB_PATH")
                .unwrap_or_else(|_| "tandem.db".into())
                .into(),
            jwt_secret: std::env::var("TANDEM_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(tandem_db::Database::open(&config.db_path)?);
    let app_state = AppStateInner::new(db, config.jwt_secret.clone());

    // Nobody is connected yet; clear presence left over from the last run
    app_state.chat.reset_presence()?;

    let gateway_state = GatewayState {
        chat: app_state.chat.clone(),
        dispatcher: Dispatcher::new(),
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = tandem_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tandem server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.chat, state.dispatcher, state.jwt_secret)
    })
}
