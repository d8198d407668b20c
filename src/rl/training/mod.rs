//! Training Infrastructure
//!
//! Phase control and its checkpointing.

pub mod checkpointing;
pub mod phase;

pub use checkpointing::PhaseCheckpointer;
pub use phase::{PhaseController, PhaseState};
