pub mod constants;
pub mod envelope;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Topic;
pub use envelope::{DecodeError, InboundMessage, TopicEvent, WantRequest};
pub use types::{Block, BlockExtras, Conversions, MiningPool, ProjectedBlock};
