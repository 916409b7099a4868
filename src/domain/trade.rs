use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MarketKey;

/// Direction of the originating cash transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TradeDirection {
    /// Customer paid cash in; the operator owes crypto and hedges with a buy
    CashIn,
    /// Customer cashed crypto out; the operator holds crypto and hedges with a sell
    CashOut,
}

/// Side of a consolidated exchange order, resolved once per order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderSide {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("invalid order side '{other}'")),
        }
    }
}

/// A settled cash-machine transaction, as handed to the intent producer.
/// How its crypto amount was computed is the rate plumbing's business.
#[derive(Debug, Clone)]
pub struct CashTransaction {
    pub id: Uuid,
    pub fiat_code: String,
    pub crypto_code: String,
    pub fiat: Decimal,
    pub crypto_atoms: Decimal,
}

/// One unit of queued work: a signed crypto amount tied to its originating
/// transaction. Positive = net buy, negative = net sell. Immutable once
/// created; owned by the queue until a consolidation pass consumes it.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub direction: TradeDirection,
    pub internal_tx_id: Uuid,
    pub fiat_code: String,
    pub crypto_code: String,
    pub crypto_atoms: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Net result of merging one market's fresh queue entries
#[derive(Debug, Clone)]
pub struct ConsolidatedOrder {
    pub market: MarketKey,
    /// Algebraic sum over every merged entry, duplicates included
    pub crypto_atoms: Decimal,
    /// Distinct cash-in transaction ids, first occurrence wins
    pub cash_in_txs: Vec<Uuid>,
    /// Distinct cash-out transaction ids, first occurrence wins
    pub cash_out_txs: Vec<Uuid>,
    /// Maximum timestamp among merged entries
    pub timestamp: DateTime<Utc>,
}

impl ConsolidatedOrder {
    /// Buys and sells have already been netted; the sign decides the side.
    pub fn side(&self) -> OrderSide {
        if self.crypto_atoms >= Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }

    /// Unsigned order quantity
    pub fn quantity(&self) -> Decimal {
        self.crypto_atoms.abs()
    }
}

/// Entry in a market queue: a raw intent, or a previously consolidated
/// order put back after a failed exchange call. Requeued orders re-enter
/// consolidation like ordinary intents and may be merged with newly
/// arrived ones.
#[derive(Debug, Clone)]
pub enum QueueEntry {
    Intent(TradeIntent),
    Requeued(ConsolidatedOrder),
}

impl QueueEntry {
    /// Creation time used for TTL pruning. A requeued order keeps its
    /// consolidation timestamp, so it ages out like the intents it merged.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            QueueEntry::Intent(intent) => intent.timestamp,
            QueueEntry::Requeued(order) => order.timestamp,
        }
    }
}

/// Persisted trade row
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub id: i64,
    pub crypto_code: String,
    /// Absolute order quantity
    pub crypto_atoms: Decimal,
    pub fiat_code: String,
    pub side: OrderSide,
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
