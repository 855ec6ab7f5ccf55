//! Real-time event distribution for the block explorer.
//!
//! One upstream WebSocket connection is shared by every consumer and
//! multiplexed into topic subscriptions (`blocks`, `mempool-blocks`,
//! `stats`, `data`). The connection reconnects with exponential backoff
//! and re-announces the current interest set after every open.

pub(crate) mod client;
pub mod error;
pub mod factory;
pub mod multiplexer;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod service;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use blockfeed_protocol::Topic;
pub use error::FeedError;
pub use factory::FeedFactory;
pub use multiplexer::{CallbackError, DispatchSummary, Subscription};
pub use service::RealtimeService;
pub use transport::{Connector, Transport, TungsteniteConnector};
pub use types::{ConnectionEvent, ConnectionState, FeedConfig, ReconnectConfig};
