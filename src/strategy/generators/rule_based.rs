//! Oscillator-threshold heuristic generator

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Candidate, GenerationContext, TradeGenerator};
use crate::domain::{Direction, ExplorationType, Trade, TradeMetadata};
use crate::error::{Result, TradeloopError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBasedConfig {
    /// Momentum proxy feature
    pub feature: String,
    /// Long entry only below this value
    pub low_water: f64,
    pub size: f64,
    pub holding_days: u32,
}

impl Default for RuleBasedConfig {
    fn default() -> Self {
        Self {
            feature: "rsi_14".to_string(),
            low_water: 30.0,
            size: 0.1,
            holding_days: 2,
        }
    }
}

impl RuleBasedConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.size > 0.0 && self.size <= 1.0) {
            return Err(TradeloopError::InvalidConfig(format!(
                "rule-based size {} outside (0, 1]",
                self.size
            )));
        }
        if self.feature.is_empty() {
            return Err(TradeloopError::InvalidConfig(
                "rule-based feature name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Long entries on oversold readings, nothing otherwise
pub struct RuleBasedGenerator {
    config: RuleBasedConfig,
}

impl RuleBasedGenerator {
    pub fn new(config: RuleBasedConfig) -> Self {
        Self { config }
    }
}

impl TradeGenerator for RuleBasedGenerator {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn exploration_type(&self) -> ExplorationType {
        ExplorationType::RuleBased
    }

    fn propose(&mut self, candidate: &Candidate, ctx: &GenerationContext) -> Option<Trade> {
        let value = candidate.features.get(&self.config.feature)?;
        if value >= self.config.low_water {
            trace!(symbol = %candidate.symbol, value, "above low-water mark, no entry");
            return None;
        }

        let metadata = TradeMetadata::new(self.exploration_type())
            .with_config("generator", self.name())
            .with_config("feature", self.config.feature.clone())
            .with_config("low_water", self.config.low_water);

        Some(
            Trade::market(
                candidate.symbol.clone(),
                ctx.timestamp,
                candidate.reference_price,
                Direction::Long,
                self.config.size,
                self.config.holding_days,
                metadata,
            )
            .with_interval(ctx.interval)
            .with_features(candidate.features.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureVector, Interval, VolatilityRegime};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn ctx() -> GenerationContext {
        GenerationContext {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
            regime: VolatilityRegime::Low,
            interval: Interval::Day1,
        }
    }

    fn candidate(symbol: &str, rsi: Option<f64>) -> Candidate {
        let mut features = FeatureVector::new();
        if let Some(rsi) = rsi {
            features.insert("rsi_14", rsi);
        }
        Candidate::new(symbol, dec!(25), features)
    }

    #[test]
    fn test_only_oversold_symbols_trade() {
        let mut generator = RuleBasedGenerator::new(RuleBasedConfig::default());
        let candidates = vec![
            candidate("LOW", Some(22.0)),
            candidate("HIGH", Some(70.0)),
            candidate("EDGE", Some(30.0)),
            candidate("NONE", None),
        ];
        let trades = generator.generate(&candidates, &ctx());

        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.symbol, "LOW");
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.size, 0.1);
        assert_eq!(trade.holding_days, 2);
        assert_eq!(trade.metadata.exploration_type, ExplorationType::RuleBased);
        assert_eq!(trade.metadata.strategy_config["feature"], "rsi_14");
    }
}
