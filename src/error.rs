use thiserror::Error;

/// Main error type for the trade engine
#[derive(Error, Debug)]
pub enum TellerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Exchange errors
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    // Intent production errors
    #[error("Conversion error: {0}")]
    Conversion(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TellerError {
    /// The exchange refused the order for being below its minimum size.
    /// Retried like any other failure, but logged at a lower severity.
    pub fn is_order_too_small(&self) -> bool {
        matches!(self, TellerError::Exchange(ExchangeError::OrderTooSmall(_)))
    }
}

/// Result type alias for TellerError
pub type Result<T> = std::result::Result<T, TellerError>;

/// Failures reported by an exchange integration
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Order too small: {0}")]
    OrderTooSmall(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Exchange unavailable: {0}")]
    Unavailable(String),

    #[error("No exchange account configured for {0}")]
    NotConfigured(String),
}
