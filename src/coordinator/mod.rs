//! Learning Loop Coordinator
//!
//! Drives the daily sweep that ties features, trade generation, simulated
//! execution, the replay buffer and the phase controller together.

pub mod config;
pub mod learning_loop;

pub use config::UniverseConfig;
pub use learning_loop::{DayReport, LearningLoop};
