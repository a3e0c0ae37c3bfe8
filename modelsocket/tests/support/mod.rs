//! Shared test harness: an in-memory transport pair standing in for the
//! socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::future::BoxFuture;
use modelsocket::Result;
use modelsocket::error::ModelSocketError;
use modelsocket::transport::Transport;
use tokio::sync::mpsc;

pub struct MockTransport {
    incoming: mpsc::Receiver<String>,
    outgoing: mpsc::Sender<String>,
}

impl Transport for MockTransport {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        let outgoing = self.outgoing.clone();
        Box::pin(async move {
            outgoing
                .send(text)
                .await
                .map_err(|_| ModelSocketError::Transport("mock server dropped".to_string()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(self.incoming.recv().await) })
    }
}

/// The "server" end of a mock pair: send frames into the client, and drain
/// the frames the client sends out.
pub struct MockServer {
    pub to_client: mpsc::Sender<String>,
    pub from_client: mpsc::Receiver<String>,
}

pub fn mock_pair() -> (Box<dyn Transport>, MockServer) {
    let (to_client_tx, to_client_rx) = mpsc::channel(64);
    let (from_client_tx, from_client_rx) = mpsc::channel(64);
    let transport = MockTransport {
        incoming: to_client_rx,
        outgoing: from_client_tx,
    };
    (
        Box::new(transport),
        MockServer {
            to_client: to_client_tx,
            from_client: from_client_rx,
        },
    )
}

impl MockServer {
    /// Reads the next frame the client sent, parsed as JSON.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        let text = self
            .from_client
            .recv()
            .await
            .expect("client did not send a frame before the channel closed");
        serde_json::from_str(&text).expect("client frame was not valid JSON")
    }

    /// Sends a raw inbound event frame to the client.
    pub async fn send_json(&self, value: serde_json::Value) {
        self.to_client
            .send(value.to_string())
            .await
            .expect("client transport dropped");
    }
}
