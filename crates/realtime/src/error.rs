//! Errors from the real-time feed.

use tokio_tungstenite::tungstenite;

/// Errors raised inside the feed. None of them reach subscribers; they end
/// up in logs, in [`ConnectionEvent`](crate::ConnectionEvent)s, or in a
/// reconnect.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[from] blockfeed_protocol::DecodeError),

    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    QueueFull,

    #[error("no tokio runtime available")]
    NoRuntime,
}
