//! WebSocket implementation of the upstream transport

use crate::error::{GatewayError, Result};
use crate::providers::base::{Connector, FrameTransport};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens TLS WebSocket connections with a bounded handshake time
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the given handshake timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>> {
        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                GatewayError::Transport(format!(
                    "connect timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| GatewayError::Transport(format!("WebSocket connect: {}", e)))?;

        tracing::debug!("Upstream WebSocket connected");
        Ok(Box::new(WsTransport { ws }))
    }
}

/// One open WebSocket session
struct WsTransport {
    ws: WsStream,
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.ws
            .send(WsMessage::text(frame))
            .await
            .map_err(|e| GatewayError::Transport(format!("send failed: {}", e)).into())
    }

    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.ws.next().await {
            let message =
                message.map_err(|e| GatewayError::Transport(format!("receive failed: {}", e)))?;
            match message {
                WsMessage::Text(text) => return Ok(Some(text.as_str().to_owned())),
                WsMessage::Binary(bytes) => {
                    let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                        GatewayError::Transport("binary frame is not UTF-8".to_string())
                    })?;
                    return Ok(Some(text));
                }
                WsMessage::Close(_) => return Ok(None),
                // tungstenite answers pings itself
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "WebSocket close returned an error");
        }
    }
}
