use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::MarketKey;
use crate::error::Result;

use super::ExchangeClient;

/// Dry-run exchange: every integration is active, and orders are logged
/// instead of placed. Lets the engine run end to end with no venue
/// credentials configured.
pub struct PaperExchange {
    quote_currency: String,
}

impl PaperExchange {
    pub fn new(quote_currency: impl Into<String>) -> Self {
        Self {
            quote_currency: quote_currency.into(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn is_active(&self, _crypto_code: &str) -> bool {
        true
    }

    fn market_currency(&self, _crypto_code: &str) -> Result<String> {
        Ok(self.quote_currency.clone())
    }

    async fn buy(&self, trade_id: i64, crypto_atoms: Decimal, market: &MarketKey) -> Result<()> {
        info!("[{}] paper buy of {} (trade {})", market, crypto_atoms, trade_id);
        Ok(())
    }

    async fn sell(&self, trade_id: i64, crypto_atoms: Decimal, market: &MarketKey) -> Result<()> {
        info!("[{}] paper sell of {} (trade {})", market, crypto_atoms, trade_id);
        Ok(())
    }
}
