use crate::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        connections: state.signaling.connection_count(),
        rooms: state.registry.room_count(),
    })
}

pub async fn index_handler() -> &'static str {
    "Meshcall signaling server is running"
}
