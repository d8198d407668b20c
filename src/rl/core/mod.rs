//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{DiscreteAction, NUM_DISCRETE_ACTIONS};
pub use reward::{
    AttributionMode, ExecutionInput, LiveFeedbackInput, RewardAttributor, RewardBreakdown,
};
pub use state::{ensure_finite, Observation, POSITION_FEATURES};
