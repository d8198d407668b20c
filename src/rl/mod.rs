//! Reinforcement Learning Module
//!
//! The learning side of the loop: the trading environment, reward
//! attribution, the replay buffer and the phase controller.
//!
//! # Layout
//!
//! - `core` - actions, observations and reward attribution
//! - `environment` - single-position trading simulator
//! - `memory` - durable replay buffer and derived metrics
//! - `training` - phase controller and checkpoints

pub mod config;
pub mod core;
pub mod environment;
pub mod memory;
pub mod training;

// Config exports
pub use config::{
    ExecutionRewardConfig, LiveRewardConfig, PhaseConfig, RLConfig, ReplayConfig, RewardConfig,
};

// Core exports
pub use core::{
    ensure_finite, AttributionMode, DiscreteAction, ExecutionInput, LiveFeedbackInput, Observation,
    RewardAttributor, RewardBreakdown, NUM_DISCRETE_ACTIONS, POSITION_FEATURES,
};

// Memory exports
pub use memory::{
    BufferMetrics, ConvergenceRule, ReplayBuffer, RewardStats, Transition, TransitionBatch,
    TransitionTags,
};

// Environment exports
pub use environment::{
    Environment, MarketConfig, MarketSeries, RewardMode, SimulatedMarket, StepInfo, StepResult,
    TradingEnvConfig, TradingEnvironment,
};

// Training exports
pub use training::{PhaseCheckpointer, PhaseController, PhaseState};
