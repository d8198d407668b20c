//! Simulated Trading Environment for RL Training
//!
//! Gym-like environments for training and evaluating policies on price
//! series without risking capital.

mod market;
mod trading;

pub use market::{sample_normal, MarketConfig, MarketSeries, SimulatedMarket};
pub use trading::{RewardMode, StepInfo, TradingEnvConfig, TradingEnvironment};

use crate::error::Result;
use crate::rl::core::{DiscreteAction, Observation};

/// Result of taking a step in an environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Observation after the action
    pub observation: Observation,
    /// Reward signal
    pub reward: f64,
    /// Episode finished
    pub done: bool,
    /// Position force-closed by the holding limit
    pub truncated: bool,
    pub info: StepInfo,
}

/// Reset/step contract shared by every environment.
///
/// Observations always have exactly `observation_dim()` components.
pub trait Environment {
    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Start a new episode and return the first observation
    fn reset(&mut self) -> Result<Observation>;

    /// Apply an action and advance one bar
    fn step(&mut self, action: DiscreteAction) -> Result<StepResult>;
}
