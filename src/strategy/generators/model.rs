//! Model-based generator
//!
//! Delegates the entry decision to an ordered chain of `TradingPolicy`
//! implementations. The first policy that returns a decision wins; a policy
//! returns `None` when it cannot judge the candidate (missing features,
//! no model loaded), letting the next one try.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Candidate, GenerationContext, TradeGenerator};
use crate::domain::{Direction, ExplorationType, Trade, TradeMetadata};
use crate::error::{Result, TradeloopError};

/// What a policy wants to do with a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub enter: bool,
    pub direction: Direction,
    /// Fraction of capital
    pub size: f64,
    pub holding_days: u32,
    /// 0.0 - 1.0
    pub confidence: f64,
}

/// A trained or heuristic policy
pub trait TradingPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn decide(&self, candidate: &Candidate, ctx: &GenerationContext) -> Option<PolicyDecision>;
}

/// Ordered fallback chain of policies
#[derive(Default)]
pub struct PolicyChain {
    policies: Vec<Box<dyn TradingPolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl TradingPolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn push(&mut self, policy: Box<dyn TradingPolicy>) {
        self.policies.push(policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// First decision in chain order, with the deciding policy's name
    pub fn decide(
        &self,
        candidate: &Candidate,
        ctx: &GenerationContext,
    ) -> Option<(&str, PolicyDecision)> {
        self.policies
            .iter()
            .find_map(|p| p.decide(candidate, ctx).map(|d| (p.name(), d)))
    }
}

/// Linear score over named features.
///
/// `score = bias + sum(weight * feature)`; enters when `|score|` exceeds
/// the threshold, long for positive scores. Returns `None` if any weighted
/// feature is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPolicy {
    #[serde(default = "default_linear_name")]
    pub name: String,
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,
    #[serde(default = "default_policy_size")]
    pub size: f64,
    #[serde(default = "default_policy_holding")]
    pub holding_days: u32,
}

fn default_linear_name() -> String {
    "linear".to_string()
}

fn default_entry_threshold() -> f64 {
    0.5
}

fn default_policy_size() -> f64 {
    0.1
}

fn default_policy_holding() -> u32 {
    2
}

impl LinearPolicy {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self {
            name: default_linear_name(),
            weights,
            bias: 0.0,
            entry_threshold: default_entry_threshold(),
            size: default_policy_size(),
            holding_days: default_policy_holding(),
        }
    }

    /// Load weights saved as JSON
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let policy: Self = serde_json::from_str(&raw)?;
        if policy.weights.is_empty() {
            return Err(TradeloopError::InvalidConfig(format!(
                "policy {} has no weights",
                path.as_ref().display()
            )));
        }
        info!(
            name = %policy.name,
            features = policy.weights.len(),
            "linear policy loaded"
        );
        Ok(policy)
    }

    pub fn score(&self, candidate: &Candidate) -> Option<f64> {
        let mut score = self.bias;
        for (feature, weight) in &self.weights {
            score += weight * candidate.features.get(feature)?;
        }
        score.is_finite().then_some(score)
    }
}

impl TradingPolicy for LinearPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&self, candidate: &Candidate, _ctx: &GenerationContext) -> Option<PolicyDecision> {
        let score = self.score(candidate)?;
        Some(PolicyDecision {
            enter: score.abs() > self.entry_threshold,
            direction: Direction::from_sign(score),
            size: self.size,
            holding_days: self.holding_days,
            confidence: score.abs().tanh(),
        })
    }
}

/// Time-series momentum fallback on a trailing-return feature
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumPolicy {
    pub feature: String,
    /// Minimum |return| to enter
    pub threshold: f64,
    pub size: f64,
    pub holding_days: u32,
}

impl Default for MomentumPolicy {
    fn default() -> Self {
        Self {
            feature: "ret_5d".to_string(),
            threshold: 0.02,
            size: 0.1,
            holding_days: 3,
        }
    }
}

impl TradingPolicy for MomentumPolicy {
    fn name(&self) -> &str {
        "momentum"
    }

    fn decide(&self, candidate: &Candidate, _ctx: &GenerationContext) -> Option<PolicyDecision> {
        let ret = candidate.features.get(&self.feature)?;
        if !ret.is_finite() {
            return None;
        }
        let strength = if self.threshold > 0.0 {
            ret.abs() / self.threshold
        } else {
            1.0
        };
        Some(PolicyDecision {
            enter: ret.abs() > self.threshold,
            direction: Direction::from_sign(ret),
            size: self.size,
            holding_days: self.holding_days,
            confidence: (strength / (1.0 + strength)).clamp(0.0, 1.0),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON weights for a `LinearPolicy`, tried first when present
    pub policy_path: Option<String>,
    /// Momentum fallback after the linear policy
    pub momentum_fallback: bool,
    pub momentum: MomentumPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            policy_path: None,
            momentum_fallback: true,
            momentum: MomentumPolicy::default(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.policy_path.is_none() && !self.momentum_fallback {
            return Err(TradeloopError::InvalidConfig(
                "model generator needs a policy path or the momentum fallback".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the chain: linear policy (if configured), then momentum
    pub fn build_chain(&self) -> Result<PolicyChain> {
        let mut chain = PolicyChain::new();
        if let Some(path) = &self.policy_path {
            chain.push(Box::new(LinearPolicy::from_json_file(path)?));
        }
        if self.momentum_fallback {
            chain.push(Box::new(self.momentum.clone()));
        }
        Ok(chain)
    }
}

/// Proposes trades only when a policy says enter
pub struct ModelGenerator {
    chain: PolicyChain,
}

impl ModelGenerator {
    pub fn new(chain: PolicyChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &PolicyChain {
        &self.chain
    }
}

impl TradeGenerator for ModelGenerator {
    fn name(&self) -> &str {
        "model"
    }

    fn exploration_type(&self) -> ExplorationType {
        ExplorationType::Model
    }

    fn propose(&mut self, candidate: &Candidate, ctx: &GenerationContext) -> Option<Trade> {
        let (policy, decision) = self.chain.decide(candidate, ctx)?;
        if !decision.enter {
            return None;
        }
        debug!(
            symbol = %candidate.symbol,
            policy,
            direction = %decision.direction,
            confidence = decision.confidence,
            "policy entry"
        );

        let metadata = TradeMetadata::new(self.exploration_type())
            .with_confidence(decision.confidence)
            .with_novelty(1.0 - decision.confidence)
            .with_config("generator", "model")
            .with_config("policy", policy);

        Some(
            Trade::market(
                candidate.symbol.clone(),
                ctx.timestamp,
                candidate.reference_price,
                decision.direction,
                decision.size,
                decision.holding_days,
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
            regime: VolatilityRegime::High,
            interval: Interval::Day1,
        }
    }

    fn candidate(pairs: &[(&str, f64)]) -> Candidate {
        Candidate::new(
            "NVDA",
            dec!(900),
            FeatureVector::from_pairs(pairs.iter().copied()),
        )
    }

    fn linear() -> LinearPolicy {
        let mut weights = BTreeMap::new();
        weights.insert("ret_1d".to_string(), 10.0);
        LinearPolicy::new(weights)
    }

    #[test]
    fn test_first_policy_with_opinion_wins() {
        let chain = PolicyChain::new()
            .with(linear())
            .with(MomentumPolicy::default());

        // Linear has its feature: it decides
        let (name, decision) = chain
            .decide(&candidate(&[("ret_1d", -0.08), ("ret_5d", 0.05)]), &ctx())
            .unwrap();
        assert_eq!(name, "linear");
        assert_eq!(decision.direction, Direction::Short);
        assert!(decision.enter);

        // Linear lacks its feature: momentum decides
        let (name, decision) = chain.decide(&candidate(&[("ret_5d", 0.05)]), &ctx()).unwrap();
        assert_eq!(name, "momentum");
        assert_eq!(decision.direction, Direction::Long);

        assert!(chain.decide(&candidate(&[]), &ctx()).is_none());
    }

    #[test]
    fn test_model_generator_only_trades_on_enter() {
        let mut generator = ModelGenerator::new(PolicyChain::new().with(MomentumPolicy::default()));
        let trades = generator.generate(
            &[
                candidate(&[("ret_5d", 0.001)]),
                candidate(&[("ret_5d", 0.04)]),
            ],
            &ctx(),
        );
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.metadata.exploration_type, ExplorationType::Model);
        assert_eq!(trade.metadata.strategy_config["policy"], "momentum");
        assert_eq!(trade.holding_days, 3);
        assert!(trade.metadata.confidence.unwrap() > 0.5);
    }

    #[test]
    fn test_linear_policy_json() {
        let json = serde_json::json!({
            "name": "ridge_v2",
            "weights": {"rsi_14": -0.02, "ret_5d": 4.0},
            "bias": 1.0
        });
        let policy: LinearPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy.name, "ridge_v2");
        assert_eq!(policy.entry_threshold, 0.5);

        let score = policy
            .score(&candidate(&[("rsi_14", 50.0), ("ret_5d", 0.1)]))
            .unwrap();
        assert!((score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_model_config_requires_a_policy() {
        let config = ModelConfig {
            policy_path: None,
            momentum_fallback: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(ModelConfig::default().build_chain().unwrap().len(), 1);
    }
}
