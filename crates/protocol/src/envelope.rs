use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{Topic, WANT_ACTION};

/// Errors produced while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotObject(&'static str),
}

/// Interest announcement sent to the upstream endpoint.
///
/// Serializes as `{"action": "want", "data": ["blocks", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantRequest {
    pub action: String,
    pub data: Vec<Topic>,
}

impl WantRequest {
    /// Builds an announcement for the given topics (sorted, de-duplicated).
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Self {
        let mut data: Vec<Topic> = topics.into_iter().collect();
        data.sort_unstable();
        data.dedup();
        Self {
            action: WANT_ACTION.to_string(),
            data,
        }
    }

    /// Serializes the announcement to its wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One inbound frame from the real-time endpoint.
///
/// Every field is optional and checked independently: a single frame may
/// carry a new block, a projected-block set and a price map at the same
/// time. JSON `null` counts as absent and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub block: Option<Value>,
    #[serde(default, rename = "mempool-blocks")]
    pub mempool_blocks: Option<Value>,
    #[serde(default)]
    pub conversions: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded (topic, payload) pair ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicEvent {
    pub topic: Topic,
    pub payload: Value,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// Only JSON objects are accepted; arrays and scalars are rejected so
    /// that a positional array never fills the optional fields.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decodes an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let kind = match &value {
            Value::Object(_) => return Ok(serde_json::from_value(value)?),
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        };
        Err(DecodeError::NotObject(kind))
    }

    /// Returns `true` if no known field is present.
    pub fn is_empty(&self) -> bool {
        self.block.is_none()
            && self.mempool_blocks.is_none()
            && self.conversions.is_none()
            && self.data.is_none()
    }

    /// Splits the frame into topic events.
    ///
    /// Order is fixed: `blocks`, `mempool-blocks`, `stats`, `data`. The
    /// `stats` payload wraps the price map as `{"conversions": ...}`.
    pub fn into_events(self) -> Vec<TopicEvent> {
        let mut events = Vec::with_capacity(4);
        if let Some(block) = self.block {
            events.push(TopicEvent {
                topic: Topic::Blocks,
                payload: block,
            });
        }
        if let Some(projected) = self.mempool_blocks {
            events.push(TopicEvent {
                topic: Topic::MempoolBlocks,
                payload: projected,
            });
        }
        if let Some(conversions) = self.conversions {
            events.push(TopicEvent {
                topic: Topic::Stats,
                payload: serde_json::json!({ "conversions": conversions }),
            });
        }
        if let Some(data) = self.data {
            events.push(TopicEvent {
                topic: Topic::Data,
                payload: data,
            });
        }
        events
    }
}
