pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod rl;
pub mod services;
pub mod strategy;

pub use config::AppConfig;
pub use coordinator::{DayReport, LearningLoop};
pub use error::{Result, TradeloopError};
pub use persistence::{MemoryTransitionStore, TransitionStore};
pub use rl::{
    Environment, PhaseController, PhaseState, RLConfig, ReplayBuffer, RewardAttributor,
    TradingEnvironment, Transition,
};
pub use services::{EventBus, FeedbackCollector, TradingEvent};
