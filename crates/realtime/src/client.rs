//! Owner of one live transport and its pump tasks.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FeedError;
use crate::pumps::read::{CloseCallback, FrameCallback, ReadLimits};
use crate::transport::Transport;
use crate::types::FeedConfig;

/// Capacity of the outbound queue. Only announcements and pongs go out.
const WRITE_QUEUE: usize = 64;

/// A transport being driven by read, write and ping pumps.
///
/// Dropping the client aborts the pumps. [`FeedClient::retire`] instead
/// lets them wind down (flushing a close frame) and hands back something
/// the next dial can wait on.
pub(crate) struct FeedClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedClient {
    /// Spawns the pumps for `transport`.
    pub(crate) fn start(
        transport: Transport,
        config: &FeedConfig,
        on_frame: FrameCallback,
        on_close: CloseCallback,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                transport.sink,
                write_rx,
                cancel,
                config.write_wait,
            ))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            let limits = ReadLimits {
                read_deadline: config.read_deadline,
                max_message_size: config.max_message_size,
            };
            tokio::spawn(crate::pumps::read::read_pump(
                transport.stream,
                on_frame,
                on_close,
                write_tx,
                cancel,
                limits,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                cancel,
                config.ping_period,
            ))
        };

        Self {
            write_tx,
            cancel,
            tasks: vec![read_handle, write_handle, ping_handle],
        }
    }

    /// Queues a text frame without waiting.
    pub(crate) fn send_text(&self, text: String) -> Result<(), FeedError> {
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => FeedError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => FeedError::Closed,
            })
    }

    /// Stops the pumps gracefully.
    pub(crate) fn retire(mut self) -> RetiredClient {
        self.cancel.cancel();
        RetiredClient {
            tasks: std::mem::take(&mut self.tasks),
        }
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Pump tasks of a transport that is shutting down.
pub(crate) struct RetiredClient {
    tasks: Vec<JoinHandle<()>>,
}

impl RetiredClient {
    /// Waits for every pump to exit, aborting any that take longer than
    /// `grace`. Once this returns the transport halves are dropped.
    pub(crate) async fn finished(self, grace: Duration) {
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                debug!("pump did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures_util::{StreamExt, sink, stream};

    fn idle_transport() -> (Transport, mpsc::UnboundedReceiver<tungstenite::Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });
        let transport = Transport {
            sink: Box::pin(sink),
            stream: stream::pending().boxed(),
        };
        (transport, rx)
    }

    #[tokio::test]
    async fn send_text_reaches_the_sink() {
        let (transport, mut outbound) = idle_transport();
        let client = FeedClient::start(
            transport,
            &FeedConfig::default(),
            Box::new(|_| {}),
            Box::new(|| {}),
        );

        client.send_text("hello".into()).unwrap();
        match outbound.recv().await {
            Some(tungstenite::Message::Text(t)) => assert_eq!(t.as_str(), "hello"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retire_flushes_close_and_runs_close_callback() {
        let (transport, mut outbound) = idle_transport();
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let client = FeedClient::start(
            transport,
            &FeedConfig::default(),
            Box::new(|_| {}),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        client.retire().finished(Duration::from_secs(2)).await;

        assert!(closed.load(Ordering::SeqCst));
        let mut saw_close = false;
        while let Ok(msg) = outbound.try_recv() {
            saw_close |= matches!(msg, tungstenite::Message::Close(_));
        }
        assert!(saw_close);
    }
}
