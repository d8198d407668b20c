//! Persistence Layer
//!
//! Append-only transition storage behind the `TransitionStore` trait. The
//! PostgreSQL implementation lives in `adapters::postgres`.

pub mod transition_store;

pub use transition_store::{
    parse_strategy_config, MemoryTransitionStore, TransitionRow, TransitionStore,
};
