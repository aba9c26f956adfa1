//! Progress tracking for block ingestion.
//!
//! The `SyncProgressTracker` counts committed blocks and transactions for one sync run and logs a
//! summary every [`LOG_EVERY_BLOCKS`] blocks, and once more when the run ends.

use std::time::{Duration, Instant};
use tracing::info;

pub const LOG_EVERY_BLOCKS: u64 = 100;

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Checkpoint when this run started
    start_height: Option<u64>,
    /// The highest height committed in this run
    last_committed_height: Option<u64>,
    blocks_processed: u64,
    transactions_processed: u64,
    domain_events_published: u64,
    /// Blocks committed when progress was last logged
    last_logged_blocks: u64,
    started_at: Instant,
}

impl SyncProgressTracker {
    pub fn new(start_height: Option<u64>) -> Self {
        Self {
            start_height,
            last_committed_height: None,
            blocks_processed: 0,
            transactions_processed: 0,
            domain_events_published: 0,
            last_logged_blocks: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a committed block
    pub fn record_block(&mut self, height: u64, transactions: usize, domain_events: usize) {
        self.last_committed_height = Some(self.last_committed_height.map_or(height, |h| h.max(height)));
        self.blocks_processed += 1;
        self.transactions_processed += transactions as u64;
        self.domain_events_published += domain_events as u64;
    }

    /// Log progress every `LOG_EVERY_BLOCKS` blocks or when forced
    pub fn log_progress(&mut self, force: bool) {
        let since_last = self.blocks_processed - self.last_logged_blocks;
        if since_last == 0 || !(force || since_last >= LOG_EVERY_BLOCKS) {
            return;
        }
        info!("Sync progress: {}", self.get_stats().summary());
        self.last_logged_blocks = self.blocks_processed;
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.start_height,
            last_committed_height: self.last_committed_height,
            blocks_processed: self.blocks_processed,
            transactions_processed: self.transactions_processed,
            domain_events_published: self.domain_events_published,
            elapsed: self.started_at.elapsed(),
        }
    }
}

/// Statistics about one sync run
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub start_height: Option<u64>,
    pub last_committed_height: Option<u64>,
    pub blocks_processed: u64,
    pub transactions_processed: u64,
    pub domain_events_published: u64,
    pub elapsed: Duration,
}

impl SyncStats {
    pub fn blocks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.blocks_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        let describe = |height: Option<u64>| height.map_or_else(|| "-".to_string(), |h| h.to_string());
        format!(
            "{} blocks, {} transactions, {} domain events from {} to {} ({:.1} blocks/s)",
            self.blocks_processed,
            self.transactions_processed,
            self.domain_events_published,
            describe(self.start_height),
            describe(self.last_committed_height),
            self.blocks_per_second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_blocks_and_transactions() {
        let mut tracker = SyncProgressTracker::new(Some(10));
        tracker.record_block(11, 3, 1);
        tracker.record_block(12, 0, 0);

        let stats = tracker.get_stats();
        assert_eq!(stats.blocks_processed, 2);
        assert_eq!(stats.transactions_processed, 3);
        assert_eq!(stats.last_committed_height, Some(12));
        assert!(stats.summary().starts_with("2 blocks, 3 transactions, 1 domain events from 10 to 12"));
    }

    #[test]
    fn logging_resets_the_interval() {
        let mut tracker = SyncProgressTracker::new(None);
        for h in 1..=LOG_EVERY_BLOCKS {
            tracker.record_block(h, 0, 0);
        }
        tracker.log_progress(false);
        assert_eq!(tracker.last_logged_blocks, LOG_EVERY_BLOCKS);

        tracker.log_progress(true);
        assert_eq!(tracker.last_logged_blocks, LOG_EVERY_BLOCKS);
    }
}
