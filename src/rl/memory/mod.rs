//! Experience Memory
//!
//! Replay buffer for storing transitions and deriving phase statistics.

pub mod replay_buffer;

pub use replay_buffer::{
    BufferMetrics, ConvergenceRule, ReplayBuffer, RewardStats, Transition, TransitionBatch,
    TransitionTags,
};
