use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelSocketError>;

/// The crate's error taxonomy.
#[derive(Error, Debug)]
pub enum ModelSocketError {
    /// Handshake failed or the channel errored before a single frame was
    /// exchanged.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame parsed but was missing a field the dispatch loop required
    /// (e.g. `seq_id` on an event kind that must carry one).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An event referenced a `seq_id` with no live sequence — effectively a
    /// bug indicator rather than a recoverable condition.
    #[error("state error: unknown seq_id {0}")]
    State(String),

    /// `error` event whose cid matched an opening waiter.
    #[error("open error: {0}")]
    Server(String),

    /// Invalid tool, tools disabled, duplicate tool name, or another
    /// rejection raised before any I/O.
    #[error("caller error: {0}")]
    Caller(String),

    /// The owning sequence or connection tore down while this waiter was
    /// outstanding.
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// The two lifecycle-teardown rejections a torn-down connection or
/// sequence injects into every outstanding waiter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("seq closed")]
    SeqClosed,
    #[error("websocket closed by client")]
    ConnectionClosed,
}
