mod paper;
mod traits;

pub use paper::PaperExchange;
pub use traits::{CapturedAmountConverter, ExchangeClient, FiatConverter};

#[cfg(test)]
pub use traits::MockFiatConverter;
