use thiserror::Error;

/// Main error type for the learning loop
#[derive(Error, Debug)]
pub enum TradeloopError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Data availability errors (skip the symbol, never abort the sweep)
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Feature backfill timed out for {symbol} ({interval}) after {waited_secs}s")]
    FeatureTimeout {
        symbol: String,
        interval: String,
        waited_secs: u64,
    },

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Invariant violations
    #[error("Non-finite observation at step {step}, feature index {index}")]
    NonFiniteObservation { step: usize, index: usize },

    #[error("Phase regression: from {from} to {to}")]
    PhaseRegression { from: String, to: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TradeloopError {
    /// Invariant violations halt the current sweep; everything else is
    /// recovered by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TradeloopError::NonFiniteObservation { .. }
                | TradeloopError::PhaseRegression { .. }
                | TradeloopError::InvalidState(_)
        )
    }

    /// Missing bars/features or a backfill that did not finish in time.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            TradeloopError::DataUnavailable(_) | TradeloopError::FeatureTimeout { .. }
        )
    }
}

/// Result type alias for TradeloopError
pub type Result<T> = std::result::Result<T, TradeloopError>;
