use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ConsolidatedOrder, MarketKey, QueueEntry, TradeDirection};

use super::queues::TradeQueues;

/// Merge a market's fresh queue entries into one net order.
///
/// Entries older than `ttl` are dropped for good. Returns `None` when the
/// market has nothing fresh to trade. On `Some`,
/// the market's queue has been emptied and the returned order owns this
/// pass's entries; producers appending afterwards start a fresh
/// accumulation.
///
/// The whole pass runs under the market's entry lock and suspends nowhere,
/// so a concurrent append is never lost between the read and the clear.
pub fn consolidate(
    queues: &TradeQueues,
    market: &MarketKey,
    ttl: Duration,
) -> Option<ConsolidatedOrder> {
    let now = Utc::now();

    queues
        .with_queue(market, |queue| {
            if queue.is_empty() {
                return None;
            }
            debug!("[{}] queue size: {}", market, queue.len());

            let before = queue.len();
            queue.retain(|entry| now - entry.timestamp() < ttl);
            let expired = before - queue.len();
            if expired > 0 {
                debug!("[{}] expired {} queued trades", market, expired);
            }
            if queue.is_empty() {
                return None;
            }

            let mut crypto_atoms = Decimal::ZERO;
            let mut cash_in_txs: Vec<Uuid> = Vec::new();
            let mut cash_out_txs: Vec<Uuid> = Vec::new();
            let mut timestamp = DateTime::<Utc>::MIN_UTC;

            for entry in queue.iter() {
                // Link ids dedup by first occurrence per direction; the
                // amount sums over every entry, duplicates included.
                match entry {
                    QueueEntry::Intent(intent) => {
                        crypto_atoms += intent.crypto_atoms;
                        let ids = match intent.direction {
                            TradeDirection::CashIn => &mut cash_in_txs,
                            TradeDirection::CashOut => &mut cash_out_txs,
                        };
                        if !ids.contains(&intent.internal_tx_id) {
                            ids.push(intent.internal_tx_id);
                        }
                        timestamp = timestamp.max(intent.timestamp);
                    }
                    QueueEntry::Requeued(order) => {
                        crypto_atoms += order.crypto_atoms;
                        for id in &order.cash_in_txs {
                            if !cash_in_txs.contains(id) {
                                cash_in_txs.push(*id);
                            }
                        }
                        for id in &order.cash_out_txs {
                            if !cash_out_txs.contains(id) {
                                cash_out_txs.push(*id);
                            }
                        }
                        timestamp = timestamp.max(order.timestamp);
                    }
                }
            }
            queue.clear();

            let order = ConsolidatedOrder {
                market: market.clone(),
                crypto_atoms,
                cash_in_txs,
                cash_out_txs,
                timestamp,
            };
            debug!("[{}] consolidated net {}", market, order.crypto_atoms);
            Some(order)
        })
        .flatten()
}
