//! Public types for the real-time feed.

use std::time::Duration;

use blockfeed_protocol::Topic;
use blockfeed_protocol::constants::{
    DEFAULT_WS_URL, RECONNECT_BACKOFF_FACTOR, RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS,
    RECONNECT_MAX_DELAY, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_READ_DEADLINE, WS_WRITE_WAIT,
};

/// Lifecycle state of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and nothing scheduled.
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport is open and frames are being dispatched.
    Open,
    /// Caller asked to close; the transport is shutting down.
    Closing,
    /// Connection dropped unexpectedly; a reconnect timer is pending.
    ReconnectScheduled { attempt: u32, delay: Duration },
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Open`].
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Events emitted for observers (UI status badges, logs, tests).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// A reconnect has been scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The reconnect budget is spent; the connection stays down until a
    /// forced reconnect.
    RetriesExhausted { attempts: u32 },
    /// An inbound frame could not be decoded and was dropped.
    DecodeFailed { error: String },
    /// A subscriber callback failed while handling an event.
    CallbackFailed { topic: Topic, error: String },
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Multiplier applied for each previous attempt.
    pub backoff_factor: f64,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            backoff_factor: RECONNECT_BACKOFF_FACTOR,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
            max_delay: RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Delay after `prior_attempts` failed attempts:
    /// `base_delay * backoff_factor ^ prior_attempts`, capped at `max_delay`.
    ///
    /// Growth past what a [`Duration`] can hold, or a factor that yields no
    /// valid duration, saturates to `max_delay`.
    pub fn delay_for_attempt(&self, prior_attempts: u32) -> Duration {
        let exp = prior_attempts.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Settings for one [`RealtimeService`](crate::RealtimeService).
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Upstream WebSocket URL.
    pub url: String,
    /// Backoff policy.
    pub reconnect: ReconnectConfig,
    /// Keepalive ping interval.
    pub ping_period: Duration,
    /// Silence after which the transport is considered dead.
    pub read_deadline: Duration,
    /// Grace period for flushing the close frame of a retired transport.
    pub write_wait: Duration,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Capacity of the observer event channel.
    pub event_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            ping_period: WS_PING_PERIOD,
            read_deadline: WS_READ_DEADLINE,
            write_wait: WS_WRITE_WAIT,
            max_message_size: WS_MAX_MESSAGE_SIZE,
            event_buffer: 64,
        }
    }
}
