use dashmap::DashMap;

use crate::domain::{MarketKey, QueueEntry};

/// Process-wide trade queue store, keyed by market.
///
/// In-memory only: whatever is still queued at shutdown is lost. The
/// consolidation TTL bounds how much that can ever be.
///
/// All mutation for one market happens under that market's entry lock, so
/// an append can never be lost between a consolidation pass's read and its
/// clear, and no two passes interleave mid-computation for the same market.
#[derive(Default)]
pub struct TradeQueues {
    queues: DashMap<MarketKey, Vec<QueueEntry>>,
}

impl TradeQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the market's queue
    pub fn push(&self, market: MarketKey, entry: QueueEntry) {
        self.queues.entry(market).or_default().push(entry);
    }

    /// Snapshot of every market that currently has a queue, including
    /// markets whose queue was emptied by an earlier pass
    pub fn markets(&self) -> Vec<MarketKey> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of entries queued for a market
    pub fn len(&self, market: &MarketKey) -> usize {
        self.queues.get(market).map_or(0, |queue| queue.len())
    }

    /// Run `f` over the market's queue while holding its entry lock.
    /// Returns `None` when the market has never seen an entry.
    pub(crate) fn with_queue<R>(
        &self,
        market: &MarketKey,
        f: impl FnOnce(&mut Vec<QueueEntry>) -> R,
    ) -> Option<R> {
        self.queues.get_mut(market).map(|mut queue| f(queue.value_mut()))
    }
}
