//! WebSocket read pump that hands text frames to the service.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Called with every accepted text frame, in arrival order.
pub(crate) type FrameCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Called once when the read loop ends, whatever the reason.
pub(crate) type CloseCallback = Box<dyn FnOnce() + Send>;

/// Limits applied by the read pump.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadLimits {
    pub(crate) read_deadline: Duration,
    pub(crate) max_message_size: usize,
}

/// Reads frames until the stream ends, errors, goes silent past the read
/// deadline, or is cancelled; then fires `on_close`.
///
/// A read error ends the stream, so errors are logged here and handled by
/// the close path like any other drop.
pub(crate) async fn read_pump<S>(
    mut read: S,
    on_frame: FrameCallback,
    on_close: CloseCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    limits: ReadLimits,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(limits.read_deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!(
                    silence_secs = limits.read_deadline.as_secs(),
                    "read deadline passed, treating connection as dead"
                );
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + limits.read_deadline);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if text.len() > limits.max_message_size {
                                    warn!(bytes = text.len(), "message too large, dropping");
                                    continue;
                                }
                                trace!(bytes = text.len(), "received text frame");
                                on_frame(text.as_str());
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(frame = ?frame, "received close frame");
                                break;
                            }
                            _ => {} // Binary and raw frames are not part of the feed.
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read error");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    on_close();
}
