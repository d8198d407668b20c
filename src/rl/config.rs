//! RL Configuration
//!
//! Configuration structs for the learning-loop components. Every tuned
//! constant lives here as a default rather than in the code that uses it.

use serde::{Deserialize, Serialize};

use crate::domain::Phase;
use crate::error::{Result, TradeloopError};

/// Main RL configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RLConfig {
    /// Phase controller configuration
    #[serde(default)]
    pub phase: PhaseConfig,
    /// Replay buffer configuration
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Reward attribution configuration
    #[serde(default)]
    pub reward: RewardConfig,
}

impl RLConfig {
    pub fn validate(&self) -> Result<()> {
        self.phase.validate()?;
        self.replay.validate()?;
        self.reward.validate()
    }
}

/// Phase controller thresholds and exploration schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Phase at construction
    pub initial_phase: Phase,
    /// Starting exploration rate
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_floor: f64,
    /// Amount subtracted per update
    pub epsilon_decay: f64,
    /// Synthetic -> Guided once real trades exceed this count
    pub real_trade_threshold: usize,
    /// Number of phase-1 rewards examined for convergence
    pub convergence_window: usize,
    /// |mean reward| must exceed this to count as converged
    pub convergence_threshold: f64,
    /// Seed for the per-symbol epsilon draw
    pub seed: Option<u64>,
    /// JSON checkpoint written after every update
    pub checkpoint_path: Option<String>,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            initial_phase: Phase::Synthetic,
            epsilon_start: 0.9,
            epsilon_floor: 0.1,
            epsilon_decay: 0.01,
            real_trade_threshold: 200,
            convergence_window: 50,
            convergence_threshold: 0.1,
            seed: None,
            checkpoint_path: None,
        }
    }
}

impl PhaseConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.epsilon_floor) || !(0.0..=1.0).contains(&self.epsilon_start)
        {
            return Err(TradeloopError::InvalidConfig(format!(
                "epsilon bounds must lie in [0, 1] (start {}, floor {})",
                self.epsilon_start, self.epsilon_floor
            )));
        }
        if self.epsilon_floor > self.epsilon_start {
            return Err(TradeloopError::InvalidConfig(format!(
                "epsilon floor {} above start {}",
                self.epsilon_floor, self.epsilon_start
            )));
        }
        if self.epsilon_decay < 0.0 {
            return Err(TradeloopError::InvalidConfig(
                "epsilon decay must be non-negative".to_string(),
            ));
        }
        if self.convergence_window == 0 {
            return Err(TradeloopError::InvalidConfig(
                "convergence window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Replay buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Maximum transitions retained in memory
    pub capacity: usize,
    /// Source tags that count as real trades
    pub real_sources: Vec<String>,
    /// Rows loaded from the store on start-up
    pub hydrate_limit: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            real_sources: vec![
                "guided".to_string(),
                "autonomous".to_string(),
                "real".to_string(),
            ],
            hydrate_limit: 100_000,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TradeloopError::InvalidConfig(
                "replay capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reward attribution configuration.
///
/// The two modes observe the same "close a trade" event from different
/// vantage points and are configured separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub execution: ExecutionRewardConfig,
    #[serde(default)]
    pub live: LiveRewardConfig,
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        let e = &self.execution;
        if !(0.0..=1.0).contains(&e.default_novelty) {
            return Err(TradeloopError::InvalidConfig(format!(
                "default novelty {} outside [0, 1]",
                e.default_novelty
            )));
        }
        if self.live.holding_cost_per_day < 0.0 {
            return Err(TradeloopError::InvalidConfig(
                "holding cost per day must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coefficients for backtest (execution-time) attribution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionRewardConfig {
    /// Weight applied to the trade's max drawdown
    pub risk_penalty_weight: f64,
    /// Flat cost per trade
    pub base_cost: f64,
    /// Additional cost per unit of |size|
    pub size_cost: f64,
    /// Weight applied to the novelty score
    pub novelty_weight: f64,
    /// Novelty used when the trade carries none
    pub default_novelty: f64,
}

impl Default for ExecutionRewardConfig {
    fn default() -> Self {
        Self {
            risk_penalty_weight: 0.02,
            base_cost: 0.003,
            size_cost: 0.001,
            novelty_weight: 0.01,
            default_novelty: 0.5,
        }
    }
}

/// Coefficients for live/paper feedback attribution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveRewardConfig {
    pub holding_cost_per_day: f64,
}

impl Default for LiveRewardConfig {
    fn default() -> Self {
        Self {
            holding_cost_per_day: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RLConfig::default().validate().unwrap();
    }

    #[test]
    fn test_epsilon_floor_above_start_rejected() {
        let config = PhaseConfig {
            epsilon_start: 0.2,
            epsilon_floor: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_like_json_fills_defaults() {
        let config: PhaseConfig =
            serde_json::from_str(r#"{"real_trade_threshold": 10, "initial_phase": "guided"}"#)
                .unwrap();
        assert_eq!(config.real_trade_threshold, 10);
        assert_eq!(config.initial_phase, Phase::Guided);
        assert_eq!(config.convergence_window, 50);
        assert_eq!(config.epsilon_start, 0.9);
    }
}
