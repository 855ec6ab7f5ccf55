//! Transport seam between the connection manager and the network.
//!
//! Production code dials with `tokio-tungstenite`; tests plug in an
//! in-memory [`Connector`].

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{Sink, StreamExt};
use tokio_tungstenite::tungstenite;
use tracing::debug;

use crate::error::FeedError;

/// Outbound half of an open transport.
pub type WsSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of an open transport.
pub type WsStream = BoxStream<'static, Result<tungstenite::Message, tungstenite::Error>>;

/// An open, not yet driven, WebSocket connection.
pub struct Transport {
    pub sink: WsSink,
    pub stream: WsStream,
}

/// Opens transports to the upstream endpoint.
pub trait Connector: Send + Sync + 'static {
    /// Dials `url`. The returned future must not borrow `self`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport, FeedError>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    max_message_size: usize,
}

impl TungsteniteConnector {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport, FeedError>> {
        let url = url.to_string();
        let max_message_size = self.max_message_size;
        Box::pin(async move {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(max_message_size);
            ws_config.max_frame_size = Some(max_message_size);
            let (ws_stream, response) =
                tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                    .await?;
            debug!(url = %url, status = %response.status(), "upstream handshake complete");
            let (write, read) = ws_stream.split();
            Ok(Transport {
                sink: Box::pin(write),
                stream: read.boxed(),
            })
        })
    }
}
