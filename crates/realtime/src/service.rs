//! Connection manager and the public service handle.
//!
//! [`RealtimeService`] owns one logical upstream connection and its topic
//! table. Transports come and go underneath it (reconnects), but the
//! subscriptions survive until an explicit [`RealtimeService::disconnect`].
//!
//! Every transport is tagged with a generation number. Events from a
//! transport whose generation is no longer current are ignored, and a dial
//! that completes under a stale generation closes its transport at once.
//! Dials are serialized and wait for retired transports to wind down, so
//! at most one transport is ever live.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use blockfeed_protocol::{InboundMessage, Topic, WantRequest};

use crate::client::{FeedClient, RetiredClient};
use crate::error::FeedError;
use crate::multiplexer::{self, CallbackError, DispatchSummary, Subscription, TopicTable};
use crate::pumps::read::{CloseCallback, FrameCallback};
use crate::reconnection::{cancel_timer, schedule_reconnect};
use crate::transport::{Connector, Transport, TungsteniteConnector};
use crate::types::{ConnectionEvent, ConnectionState, FeedConfig};

/// Mutable connection state. Guarded by `Shared::link`.
pub(crate) struct Link {
    state: ConnectionState,
    attempts: u32,
    last_delay: Option<Duration>,
    intentionally_closed: bool,
    exhausted: bool,
    generation: u64,
    client: Option<FeedClient>,
    retired: Vec<RetiredClient>,
    reconnect_timer: Option<CancellationToken>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_delay: None,
            intentionally_closed: false,
            exhausted: false,
            generation: 0,
            client: None,
            retired: Vec::new(),
            reconnect_timer: None,
        }
    }
}

/// State shared between the service handle, the pumps and the timers.
///
/// Lock order is `link` then `topics`. Neither lock is held while a
/// subscriber callback runs or across an `.await`.
pub(crate) struct Shared {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    link: Mutex<Link>,
    topics: Mutex<TopicTable>,
    /// Serializes dials so two transports are never opened side by side.
    dial: tokio::sync::Mutex<()>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl Shared {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_topics(&self) -> MutexGuard<'_, TopicTable> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends an observer event without ever blocking.
    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("observer event dropped: {e}");
        }
    }

    fn set_state(&self, link: &mut Link, state: ConnectionState) {
        if link.state != state {
            link.state = state;
            self.emit(ConnectionEvent::StateChanged(state));
        }
    }

    fn announce(&self, client: &FeedClient, topics: Vec<Topic>) {
        let want = WantRequest::new(topics);
        let sent = want
            .to_json()
            .map_err(FeedError::from)
            .and_then(|json| client.send_text(json));
        match sent {
            Ok(()) => debug!(topics = ?want.data, "interest announced"),
            Err(e) => warn!(error = %e, "failed to send interest announcement"),
        }
    }

    /// Caller-requested connect. Clears the intentional-close flag.
    pub(crate) fn connect(self: &Arc<Self>) {
        let mut link = self.lock_link();
        link.intentionally_closed = false;
        self.start_connect(&mut link);
    }

    fn start_connect(self: &Arc<Self>, link: &mut Link) {
        if matches!(
            link.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            trace!(state = ?link.state, "connect ignored, already connecting or open");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(error = %FeedError::NoRuntime, "cannot connect");
            return;
        };

        cancel_timer(&mut link.reconnect_timer);
        link.exhausted = false;
        link.generation += 1;
        let generation = link.generation;
        self.set_state(link, ConnectionState::Connecting);
        info!(url = %self.config.url, generation, "connecting to upstream");

        let shared = Arc::clone(self);
        runtime.spawn(shared.dial(generation));
    }

    async fn dial(self: Arc<Self>, generation: u64) {
        let _dial = self.dial.lock().await;

        let retired = {
            let mut link = self.lock_link();
            if link.generation != generation {
                debug!(generation, "dial superseded before it started");
                return;
            }
            std::mem::take(&mut link.retired)
        };
        for client in retired {
            client.finished(self.config.write_wait).await;
        }

        match self.connector.connect(&self.config.url).await {
            Ok(transport) => self.on_transport_open(generation, transport),
            Err(e) => {
                warn!(error = %e, generation, "failed to open upstream connection");
                self.on_transport_closed(generation);
            }
        }
    }

    fn on_transport_open(self: &Arc<Self>, generation: u64, transport: Transport) {
        let mut link = self.lock_link();
        if link.generation != generation || link.intentionally_closed {
            debug!(generation, "discarding transport from a superseded dial");
            drop(transport);
            return;
        }

        let weak = Arc::downgrade(self);
        let on_frame: FrameCallback = {
            let weak = weak.clone();
            Box::new(move |text| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_frame(generation, text);
                }
            })
        };
        let on_close: CloseCallback = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_transport_closed(generation);
            }
        });
        let client = FeedClient::start(transport, &self.config, on_frame, on_close);

        link.attempts = 0;
        self.set_state(&mut link, ConnectionState::Open);
        info!(generation, "upstream connection open");

        let topics = self.lock_topics().topics();
        if !topics.is_empty() {
            self.announce(&client, topics);
        }
        link.client = Some(client);
    }

    fn on_frame(&self, generation: u64, text: &str) {
        {
            let link = self.lock_link();
            if link.generation != generation || !link.state.is_open() {
                trace!(generation, "dropping frame from a superseded transport");
                return;
            }
        }

        let message = match InboundMessage::parse(text).map_err(FeedError::from) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                self.emit(ConnectionEvent::DecodeFailed {
                    error: e.to_string(),
                });
                return;
            }
        };
        self.dispatch(message);
    }

    pub(crate) fn dispatch(&self, message: InboundMessage) -> DispatchSummary {
        multiplexer::dispatch(
            message,
            |topic| self.lock_topics().callbacks(topic),
            |failure| {
                self.emit(ConnectionEvent::CallbackFailed {
                    topic: failure.topic,
                    error: failure.error,
                })
            },
        )
    }

    /// Close path for the transport of `generation`, whether it dropped,
    /// errored, went silent, or never opened.
    fn on_transport_closed(self: &Arc<Self>, generation: u64) {
        let mut link = self.lock_link();
        if link.generation != generation {
            trace!(generation, "ignoring close of a superseded transport");
            return;
        }
        if let Some(client) = link.client.take() {
            link.retired.push(client.retire());
        }

        if link.intentionally_closed {
            self.set_state(&mut link, ConnectionState::Disconnected);
            return;
        }

        let max_attempts = self.config.reconnect.max_attempts;
        if link.attempts >= max_attempts {
            link.exhausted = true;
            self.set_state(&mut link, ConnectionState::Disconnected);
            error!(
                attempts = link.attempts,
                "max reconnect attempts reached, giving up"
            );
            self.emit(ConnectionEvent::RetriesExhausted {
                attempts: link.attempts,
            });
            return;
        }

        let delay = self.config.reconnect.delay_for_attempt(link.attempts);
        link.attempts += 1;
        link.last_delay = Some(delay);
        let attempt = link.attempts;
        self.set_state(
            &mut link,
            ConnectionState::ReconnectScheduled { attempt, delay },
        );
        self.emit(ConnectionEvent::Reconnecting { attempt, delay });
        info!(
            attempt,
            delay_secs = format_args!("{:.2}", delay.as_secs_f64()),
            "upstream connection lost, reconnect scheduled"
        );

        schedule_reconnect(self, &mut link.reconnect_timer, delay);
    }

    /// Called by the reconnect timer once its delay has elapsed.
    pub(crate) fn fire_reconnect(self: &Arc<Self>, token: &CancellationToken) {
        let mut link = self.lock_link();
        if token.is_cancelled() || link.intentionally_closed {
            return;
        }
        link.reconnect_timer = None;
        if matches!(link.state, ConnectionState::ReconnectScheduled { .. }) {
            self.start_connect(&mut link);
        }
    }

    pub(crate) fn disconnect(&self) {
        let drained = {
            let mut link = self.lock_link();
            link.intentionally_closed = true;
            cancel_timer(&mut link.reconnect_timer);
            link.generation += 1;
            if let Some(client) = link.client.take() {
                self.set_state(&mut link, ConnectionState::Closing);
                link.retired.push(client.retire());
            }
            let drained = self.lock_topics().drain();
            if link.state != ConnectionState::Disconnected {
                self.set_state(&mut link, ConnectionState::Disconnected);
                info!("disconnected from upstream");
            }
            drained
        };
        drop(drained);
    }

    /// Clears the topic table. When open, tells upstream it now wants
    /// nothing.
    pub(crate) fn remove_all_subscriptions(&self) {
        let drained = {
            let link = self.lock_link();
            let drained = self.lock_topics().drain();
            if !drained.is_empty()
                && link.state.is_open()
                && let Some(client) = link.client.as_ref()
            {
                self.announce(client, Vec::new());
            }
            drained
        };
        debug!(removed = drained.len(), "all subscriptions removed");
    }

    pub(crate) fn reconnect(self: &Arc<Self>) {
        self.disconnect();
        let mut link = self.lock_link();
        link.intentionally_closed = false;
        link.attempts = 0;
        info!("forced reconnect");
        self.start_connect(&mut link);
    }

    fn subscribe(self: &Arc<Self>, topic: Topic, callback: multiplexer::Callback) -> Subscription {
        let mut link = self.lock_link();
        let (id, first, topics) = {
            let mut table = self.lock_topics();
            let (id, first) = table.insert(topic, callback);
            (id, first, table.topics())
        };
        debug!(topic = %topic, first, "subscribed");

        if first
            && link.state.is_open()
            && let Some(client) = link.client.as_ref()
        {
            self.announce(client, topics);
        }

        if link.state == ConnectionState::Disconnected
            && !link.intentionally_closed
            && !link.exhausted
        {
            self.start_connect(&mut link);
        }

        Subscription::new(topic, id, Arc::downgrade(self))
    }

    pub(crate) fn is_registered(&self, topic: Topic, id: multiplexer::SubscriberId) -> bool {
        self.lock_topics().contains(topic, id)
    }

    pub(crate) fn unsubscribe(&self, topic: Topic, id: multiplexer::SubscriberId) {
        let removed = {
            let link = self.lock_link();
            let (removed, topics) = {
                let mut table = self.lock_topics();
                let removed = table.remove(topic, id);
                (removed, table.topics())
            };
            match &removed {
                None => trace!(topic = %topic, "unsubscribe of unknown registration"),
                Some(r) if r.last => {
                    debug!(topic = %topic, "last subscriber gone");
                    if link.state.is_open()
                        && let Some(client) = link.client.as_ref()
                    {
                        self.announce(client, topics);
                    }
                }
                Some(_) => debug!(topic = %topic, "unsubscribed"),
            }
            removed
        };
        drop(removed);
    }
}

/// Handle to the shared real-time feed. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeService {
    shared: Arc<Shared>,
}

impl RealtimeService {
    /// Creates a service that dials with `tokio-tungstenite`.
    ///
    /// Nothing connects until the first [`subscribe`](Self::subscribe) or
    /// an explicit [`connect`](Self::connect).
    pub fn new(config: FeedConfig) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.max_message_size));
        Self::with_connector(config, connector)
    }

    /// Creates a service with a custom transport.
    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                link: Mutex::new(Link::default()),
                topics: Mutex::new(TopicTable::default()),
                dial: tokio::sync::Mutex::new(()),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Registers `callback` for `topic`.
    ///
    /// The first subscriber of a topic triggers an interest announcement
    /// when the connection is open; otherwise the topic is announced on the
    /// next open. The first subscription of a fresh service also starts
    /// the connection.
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&Value) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.shared.subscribe(topic, Arc::new(callback))
    }

    /// Opens the connection. No-op while connecting or open.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Closes the connection, cancels any pending reconnect and drops every
    /// subscription. Idempotent.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Drops every subscription without closing the connection.
    pub fn remove_all_subscriptions(&self) {
        self.shared.remove_all_subscriptions();
    }

    /// [`disconnect`](Self::disconnect), then connect again with the attempt
    /// counter reset.
    pub fn reconnect(&self) {
        self.shared.reconnect();
    }

    /// Routes a decoded frame to subscribers, exactly as an inbound frame
    /// would be.
    pub fn dispatch(&self, message: InboundMessage) -> DispatchSummary {
        self.shared.dispatch(message)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock_link().state.is_open()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock_link().state
    }

    /// `true` once the reconnect budget has been spent. Cleared by the
    /// next connect.
    pub fn is_exhausted(&self) -> bool {
        self.shared.lock_link().exhausted
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock_link().attempts
    }

    /// Most recently computed backoff delay.
    pub fn last_delay(&self) -> Option<Duration> {
        self.shared.lock_link().last_delay
    }

    /// Topics with at least one subscriber.
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.shared.lock_topics().topics()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.shared.lock_topics().subscriber_count(topic)
    }

    /// Takes the observer event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.shared
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    /// Returns `true` if both handles point at the same service.
    pub fn same_service(&self, other: &RealtimeService) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for RealtimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeService")
            .field("url", &self.shared.config.url)
            .field("state", &self.connection_state())
            .finish()
    }
}
