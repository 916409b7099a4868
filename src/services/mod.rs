pub mod flusher;

pub use flusher::{FlusherConfig, TradeFlusher};
