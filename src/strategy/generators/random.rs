//! Random exploration generator

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Candidate, GenerationContext, TradeGenerator};
use crate::domain::{Direction, ExplorationType, Trade, TradeMetadata};
use crate::error::{Result, TradeloopError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    /// Smallest position (fraction of capital)
    pub min_size: f64,
    /// Largest position (fraction of capital)
    pub max_size: f64,
    pub holding_days: u32,
    pub min_novelty: f64,
    pub max_novelty: f64,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            min_size: 0.05,
            max_size: 0.25,
            holding_days: 1,
            min_novelty: 0.3,
            max_novelty: 1.0,
        }
    }
}

impl RandomConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_size > 0.0 && self.min_size <= self.max_size) {
            return Err(TradeloopError::InvalidConfig(format!(
                "random size range [{}, {}] is empty",
                self.min_size, self.max_size
            )));
        }
        if !(0.0..=1.0).contains(&self.min_novelty)
            || !(0.0..=1.0).contains(&self.max_novelty)
            || self.min_novelty > self.max_novelty
        {
            return Err(TradeloopError::InvalidConfig(format!(
                "novelty range [{}, {}] must lie in [0, 1]",
                self.min_novelty, self.max_novelty
            )));
        }
        Ok(())
    }
}

/// Proposes a market order for every candidate with random size and side
pub struct RandomGenerator {
    config: RandomConfig,
    rng: StdRng,
}

impl RandomGenerator {
    pub fn new(config: RandomConfig, rng: StdRng) -> Self {
        Self { config, rng }
    }
}

impl TradeGenerator for RandomGenerator {
    fn name(&self) -> &str {
        "random"
    }

    fn exploration_type(&self) -> ExplorationType {
        ExplorationType::Random
    }

    fn propose(&mut self, candidate: &Candidate, ctx: &GenerationContext) -> Option<Trade> {
        let size = self.rng.gen_range(self.config.min_size..=self.config.max_size);
        let direction = if self.rng.gen_bool(0.5) {
            Direction::Long
        } else {
            Direction::Short
        };
        let novelty = self
            .rng
            .gen_range(self.config.min_novelty..=self.config.max_novelty);

        let metadata = TradeMetadata::new(self.exploration_type())
            .with_novelty(novelty)
            .with_config("generator", self.name());

        Some(
            Trade::market(
                candidate.symbol.clone(),
                ctx.timestamp,
                candidate.reference_price,
                direction,
                size,
                self.config.holding_days,
                metadata,
            )
            .with_interval(ctx.interval)
            .with_features(candidate.features.clone()),
        )
    }
}
