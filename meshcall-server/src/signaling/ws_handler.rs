use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientMessage, ConnectionId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_connection(connection_id, tx);
    state
        .signaling
        .send_message(&connection_id, &ServerMessage::Welcome { connection_id });
    state.signaling.send_message(
        &connection_id,
        &ServerMessage::IceConfig {
            ice_servers: state.signaling.ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(client_msg) => {
                                dispatch(&state, connection_id, client_msg).await;
                            }
                            Err(e) => warn!("Invalid frame from {}: {:?}", connection_id, e),
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            // A dispatch cut short must be fully dropped before leaving.
            let _ = recv_task.await;
        }
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.signaling.remove_connection(&connection_id);
    state.registry.leave(&connection_id).await;
    info!("WebSocket disconnected: {}", connection_id);
}

/// Applies one client frame on behalf of `connection_id`. Frames from a
/// single connection are dispatched in arrival order.
pub async fn dispatch(state: &AppState, connection_id: ConnectionId, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinRoom { room } => {
            info!("Connection {} joining room '{}'", connection_id, room);
            if let Err(e) = state.registry.join(connection_id, room).await {
                error!("Join failed for {}: {}", connection_id, e);
                state.signaling.send_message(
                    &connection_id,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    },
                );
            }
        }

        ClientMessage::LeaveRoom => {
            state.registry.leave(&connection_id).await;
        }

        ClientMessage::Signal(envelope) => {
            state.relay.relay(connection_id, envelope).await;
        }

        ClientMessage::Heartbeat => {
            debug!("Heartbeat from {}", connection_id);
            state
                .signaling
                .send_message(&connection_id, &ServerMessage::HeartbeatAck);
        }
    }
}
