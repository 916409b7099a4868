pub mod postgres;

use async_trait::async_trait;

use crate::domain::{ConsolidatedOrder, TradeRecord};
use crate::error::Result;

pub use postgres::PostgresStore;

/// Durable home for trade records and their transaction links
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist a trade row plus one link row per distinct contributing
    /// transaction id, atomically. Either everything lands or nothing does.
    async fn record(&self, order: &ConsolidatedOrder) -> Result<TradeRecord>;

    /// Set the error column on an existing trade. Overwrites any prior
    /// value; the message is truncated to the column's bound.
    async fn update_error(&self, trade_id: i64, message: &str) -> Result<()>;
}
