use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExplorationType, FeatureVector, Interval};
use crate::rl::core::{DiscreteAction, RewardBreakdown};

/// Free-form strategy configuration carried with trades and transitions
pub type StrategyConfig = serde_json::Map<String, serde_json::Value>;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn from_sign(sign: f64) -> Self {
        if sign < 0.0 {
            Direction::Short
        } else {
            Direction::Long
        }
    }

    /// Action that opens a position in this direction
    pub fn opening_action(&self) -> DiscreteAction {
        match self {
            Direction::Long => DiscreteAction::Buy,
            Direction::Short => DiscreteAction::Sell,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

/// How the position is exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStrategy {
    /// Close at the derived exit timestamp
    TimeBased,
}

/// Proposal context attached by the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeMetadata {
    pub exploration_type: ExplorationType,
    /// Model confidence (0.0 - 1.0), when a policy produced the trade
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Exploration incentive (0.0 - 1.0)
    #[serde(default)]
    pub novelty_score: Option<f64>,
    #[serde(default)]
    pub strategy_config: StrategyConfig,
}

impl TradeMetadata {
    pub fn new(exploration_type: ExplorationType) -> Self {
        Self {
            exploration_type,
            confidence: None,
            novelty_score: None,
            strategy_config: StrategyConfig::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_novelty(mut self, novelty: f64) -> Self {
        self.novelty_score = Some(novelty);
        self
    }

    pub fn with_config(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.strategy_config.insert(key.to_string(), value.into());
        self
    }
}

/// A proposed trade.
///
/// Produced by a generator and consumed once by the execution simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub order_type: OrderType,
    pub reference_price: Decimal,
    /// Fraction of capital (magnitude)
    pub size: f64,
    pub direction: Direction,
    pub holding_days: u32,
    pub exit_strategy: ExitStrategy,
    pub exit_at: DateTime<Utc>,
    pub interval: Interval,
    /// Feature snapshot the proposal was made from
    pub features: FeatureVector,
    pub metadata: TradeMetadata,
}

impl Trade {
    /// Market order with a time-based exit `holding_days` after creation
    pub fn market(
        symbol: impl Into<String>,
        created_at: DateTime<Utc>,
        reference_price: Decimal,
        direction: Direction,
        size: f64,
        holding_days: u32,
        metadata: TradeMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            created_at,
            order_type: OrderType::Market,
            reference_price,
            size: size.abs(),
            direction,
            holding_days,
            exit_strategy: ExitStrategy::TimeBased,
            exit_at: created_at + Duration::days(holding_days as i64),
            interval: Interval::Day1,
            features: FeatureVector::new(),
            metadata,
        }
    }

    pub fn with_limit(mut self, price: Decimal) -> Self {
        self.order_type = OrderType::Limit { price };
        self
    }

    pub fn with_features(mut self, features: FeatureVector) -> Self {
        self.features = features;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_market(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }
}

/// Realized result of one executed trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub trade_id: Uuid,
    pub symbol: String,
    pub interval: Interval,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub direction: Direction,
    pub size: f64,
    /// Direction-adjusted return on allocated capital
    pub pnl: f64,
    pub reward: f64,
    pub breakdown: RewardBreakdown,
    /// Worst adverse excursion while holding (fraction)
    pub max_drawdown: f64,
    /// Most favourable price seen while holding
    pub best_price: Decimal,
    /// Total slippage paid on entry and exit (price units)
    pub slippage: Decimal,
    pub metadata: TradeMetadata,
    pub features: FeatureVector,
    #[serde(default)]
    pub next_features: Option<FeatureVector>,
}

impl Outcome {
    /// Action recorded for this outcome
    pub fn action(&self) -> DiscreteAction {
        self.direction.opening_action()
    }

    pub fn days_held(&self) -> i64 {
        (self.exit_time - self.entry_time).num_days()
    }

    pub fn entry_price_f64(&self) -> f64 {
        self.entry_price.to_f64().unwrap_or(0.0)
    }

    pub fn with_next_features(mut self, features: Option<FeatureVector>) -> Self {
        self.next_features = features;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_trade_derives_exit() {
        let created = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let trade = Trade::market(
            "MSFT",
            created,
            dec!(410.5),
            Direction::Short,
            -0.2,
            2,
            TradeMetadata::new(ExplorationType::RuleBased),
        );

        assert_eq!(trade.exit_at, Utc.with_ymd_and_hms(2024, 3, 6, 14, 30, 0).unwrap());
        assert_eq!(trade.size, 0.2);
        assert!(trade.is_market());
        assert_eq!(trade.direction.sign(), -1.0);
        assert_eq!(trade.direction.opening_action(), DiscreteAction::Sell);
    }

    #[test]
    fn test_order_type_serde() {
        let limit = OrderType::Limit { price: dec!(99.5) };
        let json = serde_json::to_string(&limit).unwrap();
        assert!(json.contains("\"type\":\"limit\""));
        let back: OrderType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limit);
    }
}
