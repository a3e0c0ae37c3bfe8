//! The transport adapter.
//!
//! A byte-framed bidirectional channel that delivers UTF-8 text frames in
//! order. Production code talks to a real server through
//! [`WebSocketTransport`]; tests drive the engine through an in-memory
//! channel pair instead of standing up a socket.

use futures::SinkExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use http::HeaderValue;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use crate::error::ModelSocketError;
use crate::error::Result;

/// A bidirectional channel that exchanges whole UTF-8 text frames.
///
/// Each `send` writes one frame; `recv` yields frames as they arrive, `Ok(None)`
/// once the peer closes cleanly. Non-string payloads are a protocol error the
/// implementation is expected to surface as `Err`, not silently drop.
pub trait Transport: Send {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>>;
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Production transport backed by `tokio-tungstenite`.
pub struct WebSocketTransport {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WebSocketTransport {
    /// Opens the handshake, attaching `Authorization: Bearer <secret>` when
    /// `api_key` is `Some`.
    pub async fn connect(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ModelSocketError::Transport(e.to_string()))?;
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ModelSocketError::Transport(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }
        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ModelSocketError::Transport(e.to_string()))?;
        Ok(Self { socket })
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.socket.send(Message::Text(text.into())).await?;
            Ok(())
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            loop {
                match self.socket.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(other)) => {
                        return Err(ModelSocketError::Protocol(format!(
                            "non-text frame: {other:?}"
                        )));
                    }
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        })
    }
}
