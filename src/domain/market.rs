use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::TellerError;

/// A (fiat, crypto) currency pair identifying one independent queue and
/// consolidation unit. Two intents with the same pair always share a queue;
/// no cross-pair merging ever occurs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub fiat_code: String,
    pub crypto_code: String,
}

impl MarketKey {
    pub fn new(fiat_code: impl Into<String>, crypto_code: impl Into<String>) -> Self {
        Self {
            fiat_code: fiat_code.into(),
            crypto_code: crypto_code.into(),
        }
    }
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.fiat_code, self.crypto_code)
    }
}

impl FromStr for MarketKey {
    type Err = TellerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once('-') {
            Some((fiat, crypto)) if !fiat.is_empty() && !crypto.is_empty() => {
                Ok(Self::new(fiat, crypto))
            }
            _ => Err(TellerError::Validation(format!(
                "invalid market '{raw}'; expected FIAT-CRYPTO"
            ))),
        }
    }
}
