//! WebSocket write pump. Serialises outbound messages.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes queued messages to the WebSocket.
///
/// A write failure cancels `cancel`, which stops the read pump and sends
/// the connection down the close path. On exit a close frame is flushed,
/// bounded by `write_wait`.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
    write_wait: Duration,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            cancel.cancel();
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if tokio::time::timeout(write_wait, write.send(tungstenite::Message::Close(None)))
        .await
        .is_err()
    {
        debug!("close frame not flushed in time");
    }
}
