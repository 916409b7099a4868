pub mod consolidator;
pub mod engine;
pub mod queues;

pub use consolidator::consolidate;
pub use engine::Trader;
pub use queues::TradeQueues;
