//! Trade generators
//!
//! One strategy per phase of the learning loop, all behind `TradeGenerator`:
//! - `random` - pure exploration
//! - `rule_based` - oscillator threshold heuristic
//! - `model` - delegates to a chain of trading policies

pub mod model;
pub mod random;
pub mod rule_based;

pub use model::{
    LinearPolicy, ModelConfig, ModelGenerator, MomentumPolicy, PolicyChain, PolicyDecision,
    TradingPolicy,
};
pub use random::{RandomConfig, RandomGenerator};
pub use rule_based::{RuleBasedConfig, RuleBasedGenerator};

use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{ExplorationType, FeatureVector, Interval, Trade, VolatilityRegime};
use crate::error::Result;

/// A symbol eligible for a proposal on the current day
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub reference_price: Decimal,
    pub features: FeatureVector,
}

impl Candidate {
    pub fn new(
        symbol: impl Into<String>,
        reference_price: Decimal,
        features: FeatureVector,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            reference_price,
            features,
        }
    }
}

/// Day-level context shared by every proposal
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub date: NaiveDate,
    /// Order creation time
    pub timestamp: DateTime<Utc>,
    pub regime: VolatilityRegime,
    pub interval: Interval,
}

/// Proposes trades for candidate symbols
pub trait TradeGenerator: Send {
    fn name(&self) -> &str;

    /// Tag stamped on every proposal's metadata
    fn exploration_type(&self) -> ExplorationType;

    /// Proposal for one candidate, if any
    fn propose(&mut self, candidate: &Candidate, ctx: &GenerationContext) -> Option<Trade>;

    fn generate(&mut self, candidates: &[Candidate], ctx: &GenerationContext) -> Vec<Trade> {
        candidates
            .iter()
            .filter_map(|c| self.propose(c, ctx))
            .collect()
    }
}

/// Generator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub random: RandomConfig,
    #[serde(default)]
    pub rule_based: RuleBasedConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        self.random.validate()?;
        self.rule_based.validate()?;
        self.model.validate()
    }
}

/// Fixed seed for reproducible runs, entropy otherwise
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// One generator per phase
pub struct GeneratorSet {
    pub random: Box<dyn TradeGenerator>,
    pub rule_based: Box<dyn TradeGenerator>,
    pub model: Box<dyn TradeGenerator>,
}

impl GeneratorSet {
    pub fn new(
        random: impl TradeGenerator + 'static,
        rule_based: impl TradeGenerator + 'static,
        model: impl TradeGenerator + 'static,
    ) -> Self {
        Self {
            random: Box::new(random),
            rule_based: Box::new(rule_based),
            model: Box::new(model),
        }
    }

    /// Build the reference generators. Loads the linear policy file if one
    /// is configured.
    pub fn from_config(config: &GeneratorConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            RandomGenerator::new(config.random.clone(), rng),
            RuleBasedGenerator::new(config.rule_based.clone()),
            ModelGenerator::new(config.model.build_chain()?),
        ))
    }
}
