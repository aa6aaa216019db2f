use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{health_handler, index_handler};
use crate::signaling::ws_handler;
use crate::AppState;
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer(config))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

/// Binds and serves until the listener fails.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.socket_addr();
    let state = Arc::new(AppState::new(&config));
    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!("Signaling server listening on http://{}", addr);
    info!("CORS configured for: {}", config.allowed_origins.join(", "));

    axum::serve(listener, app).await?;
    Ok(())
}
