//! Execution Simulator for Backtesting
//!
//! Fills a proposed `Trade` against minute bars and turns the round trip
//! into an `Outcome`. Models:
//! - Random fill delay for market orders
//! - Bid-ask spread (half-spread on each side)
//! - Market impact proportional to position size
//! - Probabilistic limit fills when the bar trades through the limit
//!
//! Missing bars mean "no fill", never an error.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::BarProvider;
use crate::domain::{Bar, Direction, OrderType, Outcome, Trade};
use crate::error::{Result, TradeloopError};
use crate::rl::core::{ExecutionInput, RewardAttributor};

/// Execution simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSimConfig {
    /// Full bid-ask spread in basis points of price
    pub spread_bps: Decimal,
    /// Price impact per unit of |size| (fraction of price)
    pub impact_coefficient: Decimal,
    /// Market orders fill after a uniform delay in [0, this]
    pub max_fill_delay_secs: u64,
    /// Minutes after creation during which the entry may fill
    pub entry_window_mins: i64,
    /// Chance a touched limit order actually fills
    pub limit_fill_probability: f64,
}

impl Default for ExecutionSimConfig {
    fn default() -> Self {
        Self {
            spread_bps: dec!(10),
            impact_coefficient: dec!(0.001),
            max_fill_delay_secs: 60,
            entry_window_mins: 30,
            limit_fill_probability: 0.7,
        }
    }
}

impl ExecutionSimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.spread_bps < Decimal::ZERO || self.impact_coefficient < Decimal::ZERO {
            return Err(TradeloopError::InvalidConfig(
                "spread and impact must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.limit_fill_probability) {
            return Err(TradeloopError::InvalidConfig(format!(
                "limit fill probability {} outside [0, 1]",
                self.limit_fill_probability
            )));
        }
        if self.entry_window_mins <= 0 {
            return Err(TradeloopError::InvalidConfig(
                "entry window must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Half-spread as a fraction of price
    pub fn half_spread(&self) -> Decimal {
        self.spread_bps / dec!(10000) / dec!(2)
    }
}

/// Entry fill
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub price: Decimal,
    pub time: DateTime<Utc>,
    /// Price before spread and impact
    pub reference: Decimal,
}

/// Bar-driven execution simulator
pub struct ExecutionSimulator {
    config: ExecutionSimConfig,
    bars: Arc<dyn BarProvider>,
    attributor: RewardAttributor,
    rng: StdRng,
}

impl ExecutionSimulator {
    pub fn new(
        config: ExecutionSimConfig,
        bars: Arc<dyn BarProvider>,
        attributor: RewardAttributor,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            bars,
            attributor,
            rng,
        }
    }

    pub fn config(&self) -> &ExecutionSimConfig {
        &self.config
    }

    /// Adverse price adjustment for `|size|`
    fn cost_fraction(&self, size: f64) -> Decimal {
        let size = Decimal::from_f64(size.abs()).unwrap_or_default();
        self.config.half_spread() + self.config.impact_coefficient * size
    }

    /// Simulate the entry; `None` when nothing fills inside the window
    pub fn simulate_entry(&mut self, trade: &Trade, bars: &[Bar]) -> Option<Fill> {
        let sign = Decimal::from_f64(trade.direction.sign()).unwrap_or(Decimal::ONE);
        match trade.order_type {
            OrderType::Market => {
                let delay = self.rng.gen_range(0..=self.config.max_fill_delay_secs);
                let earliest = trade.created_at + Duration::seconds(delay as i64);
                let bar = bars.iter().find(|b| b.timestamp >= earliest)?;
                let cost = self.cost_fraction(trade.size);
                Some(Fill {
                    price: bar.open * (Decimal::ONE + sign * cost),
                    time: bar.timestamp,
                    reference: bar.open,
                })
            }
            OrderType::Limit { price } => {
                let bar = bars.iter().find(|b| b.touches(price))?;
                if self.rng.gen::<f64>() >= self.config.limit_fill_probability {
                    debug!(symbol = %trade.symbol, %price, "limit touched but not filled");
                    return None;
                }
                let fill = match trade.direction {
                    Direction::Long => price.min(bar.open),
                    Direction::Short => price.max(bar.open),
                };
                Some(Fill {
                    price: fill,
                    time: bar.timestamp,
                    reference: fill,
                })
            }
        }
    }

    /// Fill `trade` and hold it to its exit timestamp.
    ///
    /// Returns `Ok(None)` when bars are missing for the entry or exit.
    pub async fn execute(&mut self, trade: &Trade) -> Result<Option<Outcome>> {
        let window_end = trade.created_at + Duration::minutes(self.config.entry_window_mins);
        let entry_bars = self
            .bars
            .minute_bars(&trade.symbol, trade.created_at, window_end)
            .await?;
        if entry_bars.is_empty() {
            debug!(symbol = %trade.symbol, "no entry bars, trade not filled");
            return Ok(None);
        }

        let Some(entry) = self.simulate_entry(trade, &entry_bars) else {
            return Ok(None);
        };

        let holding = self
            .bars
            .minute_bars(&trade.symbol, entry.time, trade.exit_at)
            .await?;
        let Some(exit_bar) = holding.last() else {
            debug!(symbol = %trade.symbol, "no holding bars, trade not filled");
            return Ok(None);
        };

        let sign = Decimal::from_f64(trade.direction.sign()).unwrap_or(Decimal::ONE);
        let exit_reference = exit_bar.close;
        let exit_price = exit_reference * (Decimal::ONE - sign * self.cost_fraction(trade.size));

        let (max_drawdown, best_price) = path_stats(trade.direction, entry.price, &holding);

        let entry_f = entry.price.to_f64().unwrap_or(0.0);
        let exit_f = exit_price.to_f64().unwrap_or(0.0);
        let pnl = if entry_f > 0.0 {
            trade.direction.sign() * (exit_f - entry_f) / entry_f * trade.size.abs()
        } else {
            0.0
        };

        let breakdown = self.attributor.execution(&ExecutionInput {
            pnl,
            max_drawdown: Some(max_drawdown),
            size: trade.size,
            novelty_score: trade.metadata.novelty_score,
        });

        let slippage = (entry.price - entry.reference).abs() + (exit_price - exit_reference).abs();

        debug!(
            symbol = %trade.symbol,
            direction = %trade.direction,
            entry = %entry.price,
            exit = %exit_price,
            pnl,
            reward = breakdown.total,
            "trade executed"
        );

        Ok(Some(Outcome {
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            interval: trade.interval,
            entry_price: entry.price,
            exit_price,
            entry_time: entry.time,
            exit_time: exit_bar.timestamp,
            direction: trade.direction,
            size: trade.size,
            pnl,
            reward: breakdown.total,
            breakdown,
            max_drawdown,
            best_price,
            slippage,
            metadata: trade.metadata.clone(),
            features: trade.features.clone(),
            next_features: None,
        }))
    }
}

/// Worst adverse excursion (fraction of entry) and most favourable price
pub fn path_stats(direction: Direction, entry: Decimal, bars: &[Bar]) -> (f64, Decimal) {
    let entry_f = entry.to_f64().unwrap_or(0.0);
    let mut best = entry;
    let mut worst_excursion = 0.0f64;
    for bar in bars {
        let (favourable, adverse) = match direction {
            Direction::Long => (bar.high, bar.low),
            Direction::Short => (bar.low, bar.high),
        };
        best = match direction {
            Direction::Long => best.max(favourable),
            Direction::Short => best.min(favourable),
        };
        if entry_f > 0.0 {
            let adverse = adverse.to_f64().unwrap_or(entry_f);
            let excursion = direction.sign() * (entry_f - adverse) / entry_f;
            worst_excursion = worst_excursion.max(excursion);
        }
    }
    (worst_excursion, best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SyntheticBarProvider;
    use crate::domain::{ExplorationType, TradeMetadata};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use rand::SeedableRng;

    /// Flat bars at a fixed price every minute
    struct FlatBars(Decimal);

    #[async_trait]
    impl BarProvider for FlatBars {
        async fn daily_bars(&self, _: &str, _: NaiveDate, _: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }

        async fn minute_bars(
            &self,
            _: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Bar>> {
            let mut bars = Vec::new();
            let mut t = start;
            while t <= end && bars.len() < 5_000 {
                bars.push(Bar {
                    timestamp: t,
                    open: self.0,
                    high: self.0 + dec!(1),
                    low: self.0 - dec!(1),
                    close: self.0,
                    volume: dec!(100),
                });
                t += Duration::minutes(1);
            }
            Ok(bars)
        }
    }

    struct NoBars;

    #[async_trait]
    impl BarProvider for NoBars {
        async fn daily_bars(&self, _: &str, _: NaiveDate, _: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }

        async fn minute_bars(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    fn simulator(bars: Arc<dyn BarProvider>, config: ExecutionSimConfig) -> ExecutionSimulator {
        ExecutionSimulator::new(
            config,
            bars,
            RewardAttributor::default(),
            StdRng::seed_from_u64(5),
        )
    }

    fn trade(direction: Direction) -> Trade {
        Trade::market(
            "AAPL",
            Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
            dec!(100),
            direction,
            0.5,
            1,
            TradeMetadata::new(ExplorationType::Random).with_novelty(0.5),
        )
    }

    #[tokio::test]
    async fn test_market_round_trip_pays_spread_and_impact() {
        let mut sim = simulator(Arc::new(FlatBars(dec!(100))), ExecutionSimConfig::default());
        let outcome = sim.execute(&trade(Direction::Long)).await.unwrap().unwrap();

        // half spread 5bp + impact 0.001 * 0.5
        assert_eq!(outcome.entry_price, dec!(100.1));
        assert_eq!(outcome.exit_price, dec!(99.9));
        assert_eq!(outcome.slippage, dec!(0.2));
        assert!(outcome.pnl < 0.0);

        let expected = RewardAttributor::default().execution(&ExecutionInput {
            pnl: outcome.pnl,
            max_drawdown: Some(outcome.max_drawdown),
            size: 0.5,
            novelty_score: Some(0.5),
        });
        assert_eq!(outcome.reward, expected.total);
        assert_eq!(outcome.best_price, dec!(101));
    }

    #[tokio::test]
    async fn test_short_costs_are_direction_aware() {
        let mut sim = simulator(Arc::new(FlatBars(dec!(100))), ExecutionSimConfig::default());
        let outcome = sim.execute(&trade(Direction::Short)).await.unwrap().unwrap();
        assert_eq!(outcome.entry_price, dec!(99.9));
        assert_eq!(outcome.exit_price, dec!(100.1));
        assert_eq!(outcome.best_price, dec!(99));
    }

    #[tokio::test]
    async fn test_fill_delay_within_bounds() {
        let mut sim = simulator(Arc::new(FlatBars(dec!(50))), ExecutionSimConfig::default());
        let t = trade(Direction::Long);
        for _ in 0..20 {
            let outcome = sim.execute(&t).await.unwrap().unwrap();
            assert!(outcome.entry_time >= t.created_at);
            assert!(outcome.entry_time <= t.created_at + Duration::seconds(120));
        }
    }

    #[tokio::test]
    async fn test_missing_bars_is_no_fill() {
        let mut sim = simulator(Arc::new(NoBars), ExecutionSimConfig::default());
        assert!(sim.execute(&trade(Direction::Long)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_limit_orders() {
        let never = ExecutionSimConfig {
            limit_fill_probability: 0.0,
            ..Default::default()
        };
        let mut sim = simulator(Arc::new(FlatBars(dec!(100))), never);
        let limit = trade(Direction::Long).with_limit(dec!(99.5));
        assert!(sim.execute(&limit).await.unwrap().is_none());

        let always = ExecutionSimConfig {
            limit_fill_probability: 1.0,
            ..Default::default()
        };
        let mut sim = simulator(Arc::new(FlatBars(dec!(100))), always);
        let outcome = sim.execute(&limit).await.unwrap().unwrap();
        assert_eq!(outcome.entry_price, dec!(99.5));

        // Limit far below the range never touches
        let untouched = trade(Direction::Long).with_limit(dec!(90));
        assert!(sim.execute(&untouched).await.unwrap().is_none());
    }

    #[test]
    fn test_path_stats() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let bar = |low, high| Bar {
            timestamp: t,
            open: dec!(100),
            high,
            low,
            close: dec!(100),
            volume: dec!(1),
        };
        let bars = vec![bar(dec!(97), dec!(104)), bar(dec!(95), dec!(102))];
        let (dd, best) = path_stats(Direction::Long, dec!(100), &bars);
        assert!((dd - 0.05).abs() < 1e-12);
        assert_eq!(best, dec!(104));

        let (dd, best) = path_stats(Direction::Short, dec!(100), &bars);
        assert!((dd - 0.04).abs() < 1e-12);
        assert_eq!(best, dec!(95));
    }

    #[tokio::test]
    async fn test_synthetic_bars_produce_outcome() {
        let bars = Arc::new(SyntheticBarProvider::new(11));
        let mut sim = simulator(bars, ExecutionSimConfig::default());
        let outcome = sim.execute(&trade(Direction::Long)).await.unwrap().unwrap();
        assert!(outcome.exit_time > outcome.entry_time);
        assert!(outcome.max_drawdown >= 0.0);
        assert!(outcome.reward.is_finite());
    }
}
