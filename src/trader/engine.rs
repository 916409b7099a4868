use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error};

use crate::adapters::TradeStore;
use crate::domain::{
    CashTransaction, ConsolidatedOrder, MarketKey, OrderSide, QueueEntry, TradeDirection,
    TradeIntent,
};
use crate::error::Result;
use crate::exchange::{ExchangeClient, FiatConverter};

use super::consolidator::consolidate;
use super::queues::TradeQueues;

/// The consolidation and execution engine.
///
/// Producers call [`Trader::submit`] once per settled cash transaction;
/// a periodic scheduler calls [`Trader::flush_all`]. Everything between
/// the two is this struct's business: queueing, consolidation, the
/// record-then-execute ordering, and requeueing failed orders.
pub struct Trader {
    queues: Arc<TradeQueues>,
    store: Arc<dyn TradeStore>,
    exchange: Arc<dyn ExchangeClient>,
    converter: Arc<dyn FiatConverter>,
    ttl: Duration,
}

impl Trader {
    pub fn new(
        queues: Arc<TradeQueues>,
        store: Arc<dyn TradeStore>,
        exchange: Arc<dyn ExchangeClient>,
        converter: Arc<dyn FiatConverter>,
        ttl: Duration,
    ) -> Self {
        Self {
            queues,
            store,
            exchange,
            converter,
            ttl,
        }
    }

    /// Queue a trade intent for a settled cash transaction.
    ///
    /// A silent no-op when the exchange integration for the transaction's
    /// crypto currency is inactive: nothing is queued and no error is
    /// raised. Cash-in transactions hedge the converter's fiat-to-crypto
    /// amount; cash-out transactions hedge their captured amount, negated.
    pub fn submit(&self, tx: &CashTransaction, direction: TradeDirection) -> Result<()> {
        if !self.exchange.is_active(&tx.crypto_code) {
            debug!("[{}] integration inactive, not queueing trade", tx.crypto_code);
            return Ok(());
        }

        let fiat_code = self.exchange.market_currency(&tx.crypto_code)?;
        let crypto_atoms = match direction {
            TradeDirection::CashIn => self.converter.fiat_to_crypto(tx)?,
            TradeDirection::CashOut => -tx.crypto_atoms,
        };

        let market = MarketKey::new(fiat_code.clone(), tx.crypto_code.clone());
        debug!("[{}] queueing trade: {}", market, crypto_atoms);
        self.queues.push(
            market,
            QueueEntry::Intent(TradeIntent {
                direction,
                internal_tx_id: tx.id,
                fiat_code,
                crypto_code: tx.crypto_code.clone(),
                crypto_atoms,
                timestamp: Utc::now(),
            }),
        );
        Ok(())
    }

    /// Flush every market currently present in the queue store.
    ///
    /// Markets are flushed independently; one market's failure is logged
    /// and does not block the others. This call itself never fails.
    pub async fn flush_all(&self) {
        for market in self.queues.markets() {
            if let Err(err) = self.flush_market(&market).await {
                error!("[{}] flush failed: {}", market, err);
            }
        }
    }

    /// Consolidate and execute one market's pending trades.
    ///
    /// Returns an error only when persisting the trade record fails; that
    /// order is lost, since without a trade id there is nothing to
    /// audit-link a retry to. Exchange failures are handled internally by
    /// annotating the record and requeueing the order.
    pub async fn flush_market(&self, market: &MarketKey) -> Result<()> {
        if !self.exchange.is_active(&market.crypto_code) {
            return Ok(());
        }

        let Some(order) = consolidate(&self.queues, market, self.ttl) else {
            return Ok(());
        };
        if order.crypto_atoms.is_zero() {
            debug!("[{}] buys and sells cancelled out, nothing to hedge", market);
            return Ok(());
        }

        self.execute(market, order).await
    }

    async fn execute(&self, market: &MarketKey, order: ConsolidatedOrder) -> Result<()> {
        let side = order.side();
        let quantity = order.quantity();

        // The trade row and its links go in before the exchange call: an
        // order is never placed without a durable record of the intent to
        // place it.
        let record = self.store.record(&order).await?;

        let placed = match side {
            OrderSide::Buy => self.exchange.buy(record.id, quantity, market).await,
            OrderSide::Sell => self.exchange.sell(record.id, quantity, market).await,
        };

        if let Err(err) = placed {
            if let Err(db_err) = self.store.update_error(record.id, &err.to_string()).await {
                error!("[{}] failed to annotate trade {}: {}", market, record.id, db_err);
            }
            // The whole consolidated order goes back, not the raw intents;
            // the next cycle retries it, merged with whatever arrived since.
            self.queues.push(market.clone(), QueueEntry::Requeued(order));
            if err.is_order_too_small() {
                debug!("[{}] trade {}: {}", market, record.id, err);
            } else {
                error!("[{}] trade {} failed: {}", market, record.id, err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeRecord;
    use crate::error::{ExchangeError, TellerError};
    use crate::exchange::{CapturedAmountConverter, MockFiatConverter};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StoredTrade {
        record: TradeRecord,
        cash_in: Vec<Uuid>,
        cash_out: Vec<Uuid>,
    }

    /// In-memory stand-in for the Postgres store
    #[derive(Default)]
    struct MemStore {
        next_id: AtomicI64,
        trades: Mutex<Vec<StoredTrade>>,
        /// Crypto code whose records fail to persist
        fail_for: Option<String>,
    }

    impl MemStore {
        fn failing_for(crypto_code: &str) -> Self {
            Self {
                fail_for: Some(crypto_code.to_string()),
                ..Self::default()
            }
        }

        fn trade(&self, idx: usize) -> (TradeRecord, usize, usize) {
            let trades = self.trades.lock().unwrap();
            let stored = &trades[idx];
            (stored.record.clone(), stored.cash_in.len(), stored.cash_out.len())
        }

        fn count(&self) -> usize {
            self.trades.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TradeStore for MemStore {
        async fn record(&self, order: &ConsolidatedOrder) -> Result<TradeRecord> {
            if self.fail_for.as_deref() == Some(order.market.crypto_code.as_str()) {
                return Err(TellerError::Validation("store down".to_string()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let record = TradeRecord {
                id,
                crypto_code: order.market.crypto_code.clone(),
                crypto_atoms: order.quantity(),
                fiat_code: order.market.fiat_code.clone(),
                side: order.side(),
                error: None,
                created: Utc::now(),
                updated: Utc::now(),
            };
            self.trades.lock().unwrap().push(StoredTrade {
                record: record.clone(),
                cash_in: order.cash_in_txs.clone(),
                cash_out: order.cash_out_txs.clone(),
            });
            Ok(record)
        }

        async fn update_error(&self, trade_id: i64, message: &str) -> Result<()> {
            let mut trades = self.trades.lock().unwrap();
            if let Some(stored) = trades.iter_mut().find(|t| t.record.id == trade_id) {
                stored.record.error = Some(message.to_string());
            }
            Ok(())
        }
    }

    /// Exchange that fails its first `failures` orders, then accepts
    struct ScriptedExchange {
        active: AtomicBool,
        failures_left: AtomicUsize,
        failure: ExchangeError,
        calls: Mutex<Vec<(OrderSide, i64, Decimal)>>,
    }

    impl ScriptedExchange {
        fn accepting() -> Self {
            Self::failing(0, ExchangeError::Rejected("unused".to_string()))
        }

        fn failing(failures: usize, failure: ExchangeError) -> Self {
            Self {
                active: AtomicBool::new(true),
                failures_left: AtomicUsize::new(failures),
                failure,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn place(&self, side: OrderSide, trade_id: i64, crypto_atoms: Decimal) -> Result<()> {
            self.calls.lock().unwrap().push((side, trade_id, crypto_atoms));
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok()
            {
                return Err(self.failure.clone().into());
            }
            Ok(())
        }

        fn calls(&self) -> Vec<(OrderSide, i64, Decimal)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        fn is_active(&self, _crypto_code: &str) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn market_currency(&self, _crypto_code: &str) -> Result<String> {
            Ok("USD".to_string())
        }

        async fn buy(&self, trade_id: i64, crypto_atoms: Decimal, _market: &MarketKey) -> Result<()> {
            self.place(OrderSide::Buy, trade_id, crypto_atoms)
        }

        async fn sell(&self, trade_id: i64, crypto_atoms: Decimal, _market: &MarketKey) -> Result<()> {
            self.place(OrderSide::Sell, trade_id, crypto_atoms)
        }
    }

    fn trader(
        store: Arc<MemStore>,
        exchange: Arc<ScriptedExchange>,
    ) -> (Trader, Arc<TradeQueues>) {
        let queues = Arc::new(TradeQueues::new());
        let trader = Trader::new(
            queues.clone(),
            store,
            exchange,
            Arc::new(CapturedAmountConverter),
            Duration::minutes(2),
        );
        (trader, queues)
    }

    fn cash_tx(crypto_code: &str, crypto_atoms: Decimal) -> CashTransaction {
        CashTransaction {
            id: Uuid::new_v4(),
            fiat_code: "USD".to_string(),
            crypto_code: crypto_code.to_string(),
            fiat: dec!(100),
            crypto_atoms,
        }
    }

    #[tokio::test]
    async fn nets_buys_against_sells_into_one_linked_trade() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        let (trader, _) = trader(store.clone(), exchange.clone());

        trader.submit(&cash_tx("BTC", dec!(100)), TradeDirection::CashIn).unwrap();
        trader.submit(&cash_tx("BTC", dec!(40)), TradeDirection::CashOut).unwrap();
        trader.flush_market(&MarketKey::new("USD", "BTC")).await.unwrap();

        assert_eq!(store.count(), 1);
        let (record, cash_in_links, cash_out_links) = store.trade(0);
        assert_eq!(record.side, OrderSide::Buy);
        assert_eq!(record.crypto_atoms, dec!(60));
        assert!(record.error.is_none());
        assert_eq!(cash_in_links, 1);
        assert_eq!(cash_out_links, 1);

        assert_eq!(exchange.calls(), vec![(OrderSide::Buy, record.id, dec!(60))]);
    }

    #[tokio::test]
    async fn net_sells_execute_as_sell_orders() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        let (trader, _) = trader(store.clone(), exchange.clone());

        trader.submit(&cash_tx("BTC", dec!(40)), TradeDirection::CashOut).unwrap();
        trader.submit(&cash_tx("BTC", dec!(10)), TradeDirection::CashIn).unwrap();
        trader.flush_market(&MarketKey::new("USD", "BTC")).await.unwrap();

        let (record, _, _) = store.trade(0);
        assert_eq!(record.side, OrderSide::Sell);
        assert_eq!(record.crypto_atoms, dec!(30));
        assert_eq!(exchange.calls(), vec![(OrderSide::Sell, record.id, dec!(30))]);
    }

    #[tokio::test]
    async fn zero_net_order_creates_no_record() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        let (trader, queues) = trader(store.clone(), exchange.clone());

        trader.submit(&cash_tx("BTC", dec!(50)), TradeDirection::CashIn).unwrap();
        trader.submit(&cash_tx("BTC", dec!(50)), TradeDirection::CashOut).unwrap();
        trader.flush_market(&MarketKey::new("USD", "BTC")).await.unwrap();

        assert_eq!(store.count(), 0);
        assert!(exchange.calls().is_empty());
        assert_eq!(queues.len(&MarketKey::new("USD", "BTC")), 0);
    }

    #[tokio::test]
    async fn failed_order_is_annotated_and_retried_with_equal_amount() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::failing(
            1,
            ExchangeError::Unavailable("maintenance window".to_string()),
        ));
        let (trader, queues) = trader(store.clone(), exchange.clone());
        let market = MarketKey::new("USD", "BTC");

        trader.submit(&cash_tx("BTC", dec!(100)), TradeDirection::CashIn).unwrap();
        trader.submit(&cash_tx("BTC", dec!(40)), TradeDirection::CashOut).unwrap();

        trader.flush_market(&market).await.unwrap();
        let (failed, _, _) = store.trade(0);
        assert!(failed.error.as_deref().unwrap().contains("maintenance window"));
        assert_eq!(queues.len(&market), 1);

        // No new intents; the retry must see exactly the failed net amount.
        trader.flush_market(&market).await.unwrap();
        assert_eq!(store.count(), 2);
        let (retried, cash_in_links, cash_out_links) = store.trade(1);
        assert_eq!(retried.side, OrderSide::Buy);
        assert_eq!(retried.crypto_atoms, dec!(60));
        assert!(retried.error.is_none());
        assert_eq!(cash_in_links, 1);
        assert_eq!(cash_out_links, 1);
        assert_eq!(queues.len(&market), 0);

        let calls = exchange.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, dec!(60));
        assert_eq!(calls[1].2, dec!(60));
    }

    #[tokio::test]
    async fn order_too_small_is_retried_like_any_other_failure() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::failing(
            1,
            ExchangeError::OrderTooSmall("below 0.001".to_string()),
        ));
        let (trader, queues) = trader(store.clone(), exchange.clone());
        let market = MarketKey::new("USD", "BTC");

        trader.submit(&cash_tx("BTC", dec!(0.0005)), TradeDirection::CashIn).unwrap();
        trader.flush_market(&market).await.unwrap();

        let (failed, _, _) = store.trade(0);
        assert!(failed.error.as_deref().unwrap().contains("below 0.001"));
        assert_eq!(queues.len(&market), 1);

        trader.flush_market(&market).await.unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(queues.len(&market), 0);
    }

    #[tokio::test]
    async fn inactive_integration_makes_submit_a_no_op() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        exchange.active.store(false, Ordering::SeqCst);
        let (trader, queues) = trader(store.clone(), exchange.clone());

        trader.submit(&cash_tx("BTC", dec!(100)), TradeDirection::CashIn).unwrap();

        assert!(queues.markets().is_empty());
        trader.flush_all().await;
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn deactivated_market_keeps_its_queue_until_reactivation() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        let (trader, queues) = trader(store.clone(), exchange.clone());
        let market = MarketKey::new("USD", "BTC");

        trader.submit(&cash_tx("BTC", dec!(100)), TradeDirection::CashIn).unwrap();
        exchange.active.store(false, Ordering::SeqCst);

        trader.flush_market(&market).await.unwrap();
        assert_eq!(store.count(), 0);
        assert_eq!(queues.len(&market), 1);

        exchange.active.store(true, Ordering::SeqCst);
        trader.flush_market(&market).await.unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(queues.len(&market), 0);
    }

    #[tokio::test]
    async fn one_markets_store_failure_does_not_block_the_others() {
        let store = Arc::new(MemStore::failing_for("BTC"));
        let exchange = Arc::new(ScriptedExchange::accepting());
        let (trader, queues) = trader(store.clone(), exchange.clone());

        trader.submit(&cash_tx("BTC", dec!(1)), TradeDirection::CashIn).unwrap();
        trader.submit(&cash_tx("ETH", dec!(20)), TradeDirection::CashIn).unwrap();
        trader.flush_all().await;

        // The ETH trade went through; the BTC order is lost, not requeued,
        // since it never got a trade id to audit-link a retry to.
        assert_eq!(store.count(), 1);
        let (record, _, _) = store.trade(0);
        assert_eq!(record.crypto_code, "ETH");
        assert_eq!(queues.len(&MarketKey::new("USD", "BTC")), 0);
    }

    #[tokio::test]
    async fn buy_amount_comes_from_the_converter() {
        let store = Arc::new(MemStore::default());
        let exchange = Arc::new(ScriptedExchange::accepting());
        let queues = Arc::new(TradeQueues::new());

        let mut converter = MockFiatConverter::new();
        converter
            .expect_fiat_to_crypto()
            .returning(|_| Ok(dec!(0.0042)));

        let trader = Trader::new(
            queues,
            store.clone(),
            exchange,
            Arc::new(converter),
            Duration::minutes(2),
        );

        // The captured amount differs from the converter's answer; the
        // converter wins on the cash-in path.
        trader.submit(&cash_tx("BTC", dec!(9.9)), TradeDirection::CashIn).unwrap();
        trader.flush_market(&MarketKey::new("USD", "BTC")).await.unwrap();

        let (record, _, _) = store.trade(0);
        assert_eq!(record.crypto_atoms, dec!(0.0042));
    }
}
