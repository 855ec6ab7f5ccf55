use std::collections::VecDeque;

use blockfeed_protocol::Block;

/// Bounded list of recent blocks, newest (highest) first.
///
/// Push and poll both feed the same history, so an insert replaces any
/// entry with the same hash or the same height instead of duplicating it.
/// When full, the lowest block is evicted.
#[derive(Debug, Clone)]
pub struct BlockHistory {
    buf: VecDeque<Block>,
    capacity: usize,
}

impl BlockHistory {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BlockHistory capacity must be > 0");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a block. Returns `false` when nothing changed: the same block
    /// was already stored, or the history is full of newer blocks.
    pub fn insert(&mut self, block: Block) -> bool {
        if let Some(pos) = self
            .buf
            .iter()
            .position(|b| b.id == block.id || b.height == block.height)
        {
            if self.buf[pos] == block {
                return false;
            }
            // Same height under a new hash: the chain reorganized.
            self.buf[pos] = block;
            return true;
        }

        let pos = self
            .buf
            .iter()
            .position(|b| b.height < block.height)
            .unwrap_or(self.buf.len());
        if pos == self.capacity {
            return false;
        }
        self.buf.insert(pos, block);
        self.buf.truncate(self.capacity);
        true
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.buf.iter()
    }

    /// The highest block, if any.
    pub fn newest(&self) -> Option<&Block> {
        self.buf.front()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, id: &str) -> Block {
        Block {
            id: id.to_string(),
            height,
            timestamp: 1_700_000_000 + height as i64,
            tx_count: 1,
            size: 0,
            weight: 0,
            previous_block_hash: None,
            extras: None,
        }
    }

    fn heights(h: &BlockHistory) -> Vec<u64> {
        h.iter().map(|b| b.height).collect()
    }

    #[test]
    fn keeps_newest_first() {
        let mut h = BlockHistory::new(5);
        h.insert(block(10, "a"));
        h.insert(block(12, "c"));
        h.insert(block(11, "b"));

        assert_eq!(heights(&h), vec![12, 11, 10]);
        assert_eq!(h.newest().map(|b| b.height), Some(12));
    }

    #[test]
    fn duplicate_is_ignored() {
        let mut h = BlockHistory::new(5);
        assert!(h.insert(block(10, "a")));
        assert!(!h.insert(block(10, "a")));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn same_height_new_hash_replaces() {
        let mut h = BlockHistory::new(5);
        h.insert(block(10, "stale"));
        assert!(h.insert(block(10, "winner")));

        assert_eq!(h.len(), 1);
        assert_eq!(h.newest().unwrap().id, "winner");
    }

    #[test]
    fn evicts_lowest_when_full() {
        let mut h = BlockHistory::new(3);
        for height in 1..=5 {
            h.insert(block(height, &height.to_string()));
        }
        assert_eq!(heights(&h), vec![5, 4, 3]);

        assert!(!h.insert(block(1, "old")), "older than everything kept");
        assert_eq!(heights(&h), vec![5, 4, 3]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut h = BlockHistory::new(3);
        h.insert(block(1, "a"));
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.capacity(), 3);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = BlockHistory::new(0);
    }
}
