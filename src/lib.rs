pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod services;
pub mod trader;

pub use adapters::{PostgresStore, TradeStore};
pub use config::AppConfig;
pub use domain::{
    CashTransaction, ConsolidatedOrder, MarketKey, OrderSide, QueueEntry, TradeDirection,
    TradeIntent, TradeRecord,
};
pub use error::{ExchangeError, Result, TellerError};
pub use exchange::{CapturedAmountConverter, ExchangeClient, FiatConverter, PaperExchange};
pub use services::{FlusherConfig, TradeFlusher};
pub use trader::{consolidate, TradeQueues, Trader};
