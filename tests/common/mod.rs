#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tradeloop::domain::{
    ExplorationType, FeatureVector, Interval, Phase, StrategyConfig, VolatilityRegime,
};
use tradeloop::persistence::MemoryTransitionStore;
use tradeloop::rl::{
    ConvergenceRule, DiscreteAction, PhaseConfig, PhaseController, ReplayBuffer, ReplayConfig,
    RewardBreakdown, Transition, TransitionTags,
};
use tradeloop::strategy::{seeded_rng, GeneratorConfig, GeneratorSet};
use uuid::Uuid;

pub fn buffer(phase: &PhaseConfig) -> Arc<ReplayBuffer> {
    buffer_with(phase, ReplayConfig::default())
}

pub fn buffer_with(phase: &PhaseConfig, replay: ReplayConfig) -> Arc<ReplayBuffer> {
    Arc::new(ReplayBuffer::new(
        &replay,
        ConvergenceRule::from(phase),
        Arc::new(MemoryTransitionStore::new()),
    ))
}

pub fn controller(phase: PhaseConfig) -> PhaseController {
    controller_with(phase, ReplayConfig::default())
}

pub fn controller_with(phase: PhaseConfig, replay: ReplayConfig) -> PhaseController {
    let buffer = buffer_with(&phase, replay);
    let generators =
        GeneratorSet::from_config(&GeneratorConfig::default(), seeded_rng(Some(1))).unwrap();
    PhaseController::new(phase, buffer, generators, seeded_rng(Some(2)))
}

pub fn transition(phase: Phase, source: &str, reward: f64) -> Transition {
    Transition {
        id: Uuid::new_v4(),
        symbol: "AAPL".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        interval: Interval::Day1,
        state: vec![100.0, 0.01],
        action: DiscreteAction::Buy,
        reward,
        breakdown: RewardBreakdown::default(),
        next_state: vec![101.0, 0.01],
        done: true,
        strategy_config: StrategyConfig::new(),
        tags: TransitionTags::new(
            phase,
            source,
            ExplorationType::RuleBased,
            VolatilityRegime::Medium,
        ),
        features: FeatureVector::new(),
        recorded_at: Utc::now(),
    }
}

pub async fn record_n(buffer: &ReplayBuffer, n: usize, phase: Phase, source: &str, reward: f64) {
    for _ in 0..n {
        buffer.record(transition(phase, source, reward)).await.unwrap();
    }
}
