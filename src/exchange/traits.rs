use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{CashTransaction, MarketKey};
use crate::error::Result;

/// A configured exchange integration. One implementation serves every
/// crypto currency the operator trades; `is_active` reports whether the
/// integration for a given code is enabled.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Whether trading is enabled for this crypto currency
    fn is_active(&self, crypto_code: &str) -> bool;

    /// Quote currency of the exchange account trading this crypto currency.
    /// Market keys are formed from this, not from the machine's locale.
    fn market_currency(&self, crypto_code: &str) -> Result<String>;

    /// Place a market buy of `crypto_atoms` units, tagged with the trade id
    async fn buy(&self, trade_id: i64, crypto_atoms: Decimal, market: &MarketKey) -> Result<()>;

    /// Place a market sell of `crypto_atoms` units, tagged with the trade id
    async fn sell(&self, trade_id: i64, crypto_atoms: Decimal, market: &MarketKey) -> Result<()>;
}

/// Commission-aware fiat-to-crypto conversion for the cash-in path: how
/// much crypto to hedge for a settled cash-in transaction.
#[cfg_attr(test, mockall::automock)]
pub trait FiatConverter: Send + Sync {
    fn fiat_to_crypto(&self, tx: &CashTransaction) -> Result<Decimal>;
}

/// Hedges the crypto amount already captured on the transaction. The
/// operator's rate plumbing computed that amount at capture time; for
/// hedging purposes it is the exposure.
pub struct CapturedAmountConverter;

impl FiatConverter for CapturedAmountConverter {
    fn fiat_to_crypto(&self, tx: &CashTransaction) -> Result<Decimal> {
        Ok(tx.crypto_atoms)
    }
}
