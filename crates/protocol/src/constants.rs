use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time endpoint of the public mempool.space instance.
pub const DEFAULT_WS_URL: &str = "wss://mempool.space/api/v1/ws";

/// REST base of the public mempool.space instance (used by fallback polling).
pub const DEFAULT_API_URL: &str = "https://mempool.space/api";

/// Base delay before the first reconnect attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(3000);

/// Growth factor applied per failed attempt.
pub const RECONNECT_BACKOFF_FACTOR: f64 = 1.5;

/// Reconnect attempts before the connection gives up for good.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Upper bound on a single reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(300);

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Read deadline: if nothing at all arrives within this window (no data,
/// no pong) the connection is treated as dead.
///
/// mempool.space pushes `mempool-blocks` updates every few seconds, so a
/// two-minute silence means the socket is gone.
pub const WS_READ_DEADLINE: Duration = Duration::from_secs(120);

/// Time allowed to flush the close frame when a transport is retired.
pub const WS_WRITE_WAIT: Duration = Duration::from_secs(5);

/// Maximum inbound message size in bytes (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Action name of the interest announcement.
pub const WANT_ACTION: &str = "want";

/// Logical event stream a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    /// Newly mined block (`block` field).
    #[serde(rename = "blocks")]
    Blocks,
    /// Projected next blocks (`mempool-blocks` field).
    #[serde(rename = "mempool-blocks")]
    MempoolBlocks,
    /// Price conversions (`conversions` field).
    #[serde(rename = "stats")]
    Stats,
    /// Generic payload (`data` field).
    #[serde(rename = "data")]
    Data,
}

impl Topic {
    /// Every topic, in dispatch order.
    pub const ALL: [Topic; 4] = [Topic::Blocks, Topic::MempoolBlocks, Topic::Stats, Topic::Data];

    /// Wire name used in the `want` announcement.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Blocks => "blocks",
            Topic::MempoolBlocks => "mempool-blocks",
            Topic::Stats => "stats",
            Topic::Data => "data",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown topic name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_serialization() {
        assert_eq!(serde_json::to_string(&Topic::Blocks).unwrap(), "\"blocks\"");
        assert_eq!(
            serde_json::to_string(&Topic::MempoolBlocks).unwrap(),
            "\"mempool-blocks\""
        );
        assert_eq!(serde_json::to_string(&Topic::Stats).unwrap(), "\"stats\"");
    }

    #[test]
    fn topic_deserialization() {
        let t: Topic = serde_json::from_str("\"mempool-blocks\"").unwrap();
        assert_eq!(t, Topic::MempoolBlocks);
    }

    #[test]
    fn topic_from_str_matches_wire_name() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
            assert_eq!(topic.to_string(), topic.as_str());
        }
        assert_eq!(
            "live-2h-chart".parse::<Topic>(),
            Err(UnknownTopic("live-2h-chart".into()))
        );
    }

    #[test]
    fn backoff_defaults() {
        assert_eq!(RECONNECT_BASE_DELAY, Duration::from_secs(3));
        assert_eq!(RECONNECT_MAX_ATTEMPTS, 10);
        assert!((RECONNECT_BACKOFF_FACTOR - 1.5).abs() < f64::EPSILON);
        assert!(RECONNECT_MAX_DELAY > RECONNECT_BASE_DELAY.mul_f64(1.5f64.powi(9)));
    }
}
