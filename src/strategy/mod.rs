//! Trade generation and simulated execution
//!
//! - `generators/` - random, rule-based and model-based trade generators
//! - `execution_sim` - fills trades against minute bars and attributes rewards
//! - `regime` - volatility regime classification
//! - `calculations` - indicator math shared with the feature service

pub mod calculations;
pub mod execution_sim;
pub mod generators;
pub mod regime;

pub use execution_sim::{path_stats, ExecutionSimConfig, ExecutionSimulator, Fill};
pub use generators::{
    seeded_rng, Candidate, GenerationContext, GeneratorConfig, GeneratorSet, LinearPolicy,
    ModelConfig, ModelGenerator, MomentumPolicy, PolicyChain, PolicyDecision, RandomConfig,
    RandomGenerator, RuleBasedConfig, RuleBasedGenerator, TradeGenerator, TradingPolicy,
};
pub use regime::{FixedRegime, RealizedVolClassifier, RegimeClassifier, RegimeConfig};
