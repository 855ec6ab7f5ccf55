//! In-memory transport for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{StreamExt, sink, stream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::FeedError;
use crate::transport::{Connector, Transport};

/// Lets spawned tasks run; advances a paused clock by 1ms.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Decrements the live counter when the inbound stream is dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The far end of one mock transport.
pub(crate) struct MockServer {
    inbound: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

impl MockServer {
    /// Sends a text frame to the client. Ignored once the client is gone.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.inbound.send(Ok(Message::Text(text.into())));
    }

    /// Fails the client's read half, as a dropped TCP connection would.
    pub(crate) fn drop_connection(&self) {
        let _ = self
            .inbound
            .send(Err(tungstenite::Error::ConnectionClosed));
    }

    /// Text frames the client has sent since the last call.
    pub(crate) fn sent_texts(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            if let Message::Text(t) = msg {
                texts.push(t.as_str().to_string());
            }
        }
        texts
    }
}

/// [`Connector`] that hands out in-memory transports.
pub(crate) struct MockConnector {
    fail: AtomicBool,
    dials: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    servers_tx: mpsc::UnboundedSender<MockServer>,
    servers_rx: Mutex<mpsc::UnboundedReceiver<MockServer>>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            fail: AtomicBool::new(false),
            dials: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            servers_tx,
            servers_rx: Mutex::new(servers_rx),
        })
    }

    /// While set, every dial fails with a connection error.
    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Transports whose read half is still alive.
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Waits for the next successful dial and returns its server end.
    pub(crate) async fn accept(&self) -> MockServer {
        let mut rx = self.servers_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("no dial within 60s")
            .expect("connector dropped")
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Transport, FeedError>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Box::pin(async { Err(FeedError::Ws(tungstenite::Error::ConnectionClosed)) });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());

        let inbound = stream::unfold((inbound_rx, guard), |(mut rx, guard)| async move {
            let msg = rx.recv().await?;
            Some((msg, (rx, guard)))
        });
        let outbound = sink::unfold(outbound_tx, |tx, msg: Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });

        let _ = self.servers_tx.send(MockServer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });

        let transport = Transport {
            sink: Box::pin(outbound),
            stream: inbound.boxed(),
        };
        Box::pin(async move { Ok(transport) })
    }
}
