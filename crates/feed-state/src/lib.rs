pub mod error;
pub mod history;
pub mod hooks;
pub mod poll;
pub mod state;

pub use error::{PayloadError, PollError};
pub use history::BlockHistory;
pub use hooks::{HookBinding, SharedView, mount_all, shared_view, use_blocks, use_mempool_blocks, use_stats};
pub use poll::{PollReport, PollSource, poll_once, run_fallback_poller};
pub use state::{ChainView, UpdateSource};
