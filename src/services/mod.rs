pub mod event_bus;
pub mod feature_service;
pub mod feedback;

pub use event_bus::{EventBus, TradingEvent};
pub use feature_service::{
    fetch_or_backfill, CachedFeatureProvider, FeatureConfig, FeatureProvider, Readiness,
};
pub use feedback::{FeedbackCollector, REAL_SOURCE};
