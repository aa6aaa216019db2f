use crate::config::ReconnectPolicy;
use crate::transport::TransportEvent;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum PumpEnd {
    /// The socket went away; reconnect.
    Lost,
    /// The client dropped its side; stop for good.
    Shutdown,
}

/// WebSocket channel to the coordination server with bounded reconnect.
pub struct WsTransport;

impl WsTransport {
    /// Runs until the outgoing sender is dropped or reconnecting is given up.
    /// Frames queued while disconnected are discarded, since they refer to a
    /// connection id the server no longer knows.
    pub fn spawn(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    ) -> (mpsc::UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(url.into(), policy, outgoing, events_tx));
        (events_rx, handle)
    }
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut failures: u32 = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Signaling channel connected to {}", url);
                failures = 0;
                if events.send(TransportEvent::Connected).is_err() {
                    return;
                }

                match pump(stream, &mut outgoing, &events).await {
                    PumpEnd::Shutdown => {
                        debug!("Signaling transport shut down");
                        return;
                    }
                    PumpEnd::Lost => {
                        warn!("Signaling channel lost");
                        if events.send(TransportEvent::Disconnected).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to connect to {}: {}", url, e),
        }

        failures += 1;
        if failures > policy.max_attempts {
            warn!("Giving up after {} reconnect attempts", policy.max_attempts);
            let _ = events.send(TransportEvent::GaveUp {
                attempts: policy.max_attempts,
            });
            return;
        }

        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            policy.delay(),
            failures,
            policy.max_attempts
        );
        tokio::time::sleep(policy.delay()).await;

        loop {
            match outgoing.try_recv() {
                Ok(stale) => debug!("Discarding stale frame {:?}", stale),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }
    }
}

async fn pump(
    stream: WsStream,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> PumpEnd {
    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else {
                    let _ = ws_write.send(Message::Close(None)).await;
                    return PumpEnd::Shutdown;
                };

                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {:?}: {}", message, e);
                        continue;
                    }
                };
                if ws_write.send(Message::Text(text.into())).await.is_err() {
                    return PumpEnd::Lost;
                }
            }

            frame = ws_read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => {
                            if events.send(TransportEvent::Message(message)).is_err() {
                                return PumpEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!("Invalid server frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return PumpEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    match &err {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Signaling websocket closed: {}", err);
                        }
                        _ => warn!("Signaling websocket error: {}", err),
                    }
                    return PumpEnd::Lost;
                }
            },
        }
    }
}
