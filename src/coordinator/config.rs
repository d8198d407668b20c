//! Learning Loop Configuration

use serde::{Deserialize, Serialize};

use crate::domain::Interval;
use crate::error::{Result, TradeloopError};

/// Symbols swept every simulated day
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    /// Interval tag for features and transitions
    pub interval: Interval,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            symbols: ["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "TSLA", "JPM"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval: Interval::Day1,
        }
    }
}

impl UniverseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(TradeloopError::InvalidConfig(
                "universe must contain at least one symbol".to_string(),
            ));
        }
        if let Some(blank) = self.symbols.iter().find(|s| s.trim().is_empty()) {
            return Err(TradeloopError::InvalidConfig(format!(
                "universe contains a blank symbol: {:?}",
                blank
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_universe_rejected() {
        let config = UniverseConfig {
            symbols: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
        UniverseConfig::default().validate().unwrap();
    }
}
