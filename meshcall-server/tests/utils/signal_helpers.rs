use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientMessage, ConnectionId, ServerMessage};
use meshcall_server::{AppState, ServerConfig, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Timeout for a single expected frame (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 5000;

/// Window used to assert that nothing else arrives (ms).
pub const QUIET_WINDOW_MS: u64 = 200;

/// Start a real server on an ephemeral port.
pub async fn spawn_server() -> Result<(SocketAddr, Arc<AppState>)> {
    let config = ServerConfig {
        allowed_origins: vec![],
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(&config));
    let app = router(state.clone(), &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind test listener")?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((addr, state))
}

pub struct WsTestClient {
    pub connection_id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    /// Connect and consume the `welcome` / `ice-config` preamble.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let (stream, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .context("Failed to open websocket")?;

        let mut client = Self {
            connection_id: ConnectionId::new(),
            stream,
        };

        match client.recv().await? {
            ServerMessage::Welcome { connection_id } => client.connection_id = connection_id,
            other => anyhow::bail!("Expected welcome, got {:?}", other),
        }
        match client.recv().await? {
            ServerMessage::IceConfig { .. } => {}
            other => anyhow::bail!("Expected ice-config, got {:?}", other),
        }

        Ok(client)
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<ServerMessage> {
        let timeout = Duration::from_millis(SIGNAL_TIMEOUT_MS);

        loop {
            let frame = tokio::time::timeout(timeout, self.stream.next())
                .await
                .context("Timeout waiting for server frame")?
                .context("Websocket closed")??;

            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).context("Bad server frame");
            }
        }
    }

    /// Assert that no frame arrives within the quiet window.
    pub async fn expect_silence(&mut self) -> Result<()> {
        let window = Duration::from_millis(QUIET_WINDOW_MS);
        match tokio::time::timeout(window, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => anyhow::bail!("Unexpected frame: {:?}", frame),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
