use std::time::{Duration, Instant};

use blockfeed_protocol::{Block, Conversions, ProjectedBlock};

use crate::history::BlockHistory;

/// Default number of recent blocks kept.
pub const DEFAULT_HISTORY: usize = 15;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Push,
    Poll,
}

/// What consumers render: the chain tip, recent blocks, projected mempool
/// blocks and prices.
///
/// Fed by the realtime hooks and by the polling fallback at the same time.
/// All methods are synchronous.
#[derive(Debug, Clone)]
pub struct ChainView {
    tip_height: Option<u64>,
    blocks: BlockHistory,
    projected: Vec<ProjectedBlock>,
    conversions: Conversions,
    last_push: Option<Instant>,
    last_poll: Option<Instant>,
}

impl Default for ChainView {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl ChainView {
    pub fn new(history: usize) -> Self {
        Self {
            tip_height: None,
            blocks: BlockHistory::new(history),
            projected: Vec::new(),
            conversions: Conversions::default(),
            last_push: None,
            last_poll: None,
        }
    }

    fn touch(&mut self, source: UpdateSource) {
        let now = Some(Instant::now());
        match source {
            UpdateSource::Push => self.last_push = now,
            UpdateSource::Poll => self.last_poll = now,
        }
    }

    /// Records a new block. The tip never moves backwards.
    pub fn apply_block(&mut self, block: Block, source: UpdateSource) -> bool {
        self.tip_height = Some(self.tip_height.map_or(block.height, |t| t.max(block.height)));
        self.touch(source);
        self.blocks.insert(block)
    }

    /// Merges a batch of blocks (typically a poll result). Returns how many
    /// changed the history.
    pub fn apply_blocks(&mut self, blocks: Vec<Block>, source: UpdateSource) -> usize {
        let mut changed = 0;
        for block in blocks {
            if self.apply_block(block, source) {
                changed += 1;
            }
        }
        self.touch(source);
        changed
    }

    /// Projected blocks are always replaced wholesale.
    pub fn replace_projected(&mut self, projected: Vec<ProjectedBlock>, source: UpdateSource) {
        self.projected = projected;
        self.touch(source);
    }

    /// Merges prices field by field; currencies missing from `update` keep
    /// their previous rate.
    pub fn merge_conversions(&mut self, update: Conversions, source: UpdateSource) {
        if update.time.is_some() {
            self.conversions.time = update.time;
        }
        self.conversions.rates.extend(update.rates);
        self.touch(source);
    }

    pub fn tip_height(&self) -> Option<u64> {
        self.tip_height
    }

    pub fn blocks(&self) -> &BlockHistory {
        &self.blocks
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.newest()
    }

    pub fn projected(&self) -> &[ProjectedBlock] {
        &self.projected
    }

    /// The next block template, if the mempool has one.
    pub fn next_block(&self) -> Option<&ProjectedBlock> {
        self.projected.first()
    }

    pub fn conversions(&self) -> &Conversions {
        &self.conversions
    }

    pub fn last_push(&self) -> Option<Instant> {
        self.last_push
    }

    pub fn last_poll(&self) -> Option<Instant> {
        self.last_poll
    }

    /// `true` when no push arrived within `threshold`, including never.
    pub fn is_push_stale(&self, threshold: Duration) -> bool {
        self.last_push.is_none_or(|t| t.elapsed() > threshold)
    }
}
