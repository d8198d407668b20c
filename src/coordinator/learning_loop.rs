//! Learning Loop
//!
//! The per-day sweep: classify the regime, look up features for every
//! universe symbol (backfilling on a miss), let the phase controller propose
//! trades, execute them, record outcomes, then update the phase exactly once.
//!
//! Data problems skip a symbol. Invariant violations abort the sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::config::UniverseConfig;
use crate::adapters::{is_trading_day, next_trading_day, session_open};
use crate::domain::{Phase, VolatilityRegime};
use crate::error::{Result, TradeloopError};
use crate::rl::memory::{BufferMetrics, ReplayBuffer, TransitionTags};
use crate::rl::training::PhaseController;
use crate::services::feature_service::{fetch_or_backfill, FeatureProvider};
use crate::strategy::execution_sim::ExecutionSimulator;
use crate::strategy::generators::{Candidate, GenerationContext};
use crate::strategy::regime::RegimeClassifier;

/// Summary of one simulated day
#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub regime: VolatilityRegime,
    pub phase_before: Phase,
    pub phase_after: Phase,
    /// Epsilon after the update
    pub epsilon: f64,
    pub candidates: usize,
    /// Symbols without usable features today
    pub skipped: Vec<String>,
    pub trades: usize,
    pub fills: usize,
    pub recorded: usize,
    pub failed_appends: usize,
    /// Mean reward of the day's recorded outcomes
    pub mean_reward: f64,
}

pub struct LearningLoop {
    universe: UniverseConfig,
    controller: Arc<Mutex<PhaseController>>,
    buffer: Arc<ReplayBuffer>,
    features: Arc<dyn FeatureProvider>,
    feature_timeout: Duration,
    regime: Arc<dyn RegimeClassifier>,
    simulator: ExecutionSimulator,
}

impl LearningLoop {
    pub fn new(
        universe: UniverseConfig,
        controller: PhaseController,
        features: Arc<dyn FeatureProvider>,
        feature_timeout: Duration,
        regime: Arc<dyn RegimeClassifier>,
        simulator: ExecutionSimulator,
    ) -> Self {
        let buffer = Arc::clone(controller.buffer());
        Self {
            universe,
            controller: Arc::new(Mutex::new(controller)),
            buffer,
            features,
            feature_timeout,
            regime,
            simulator,
        }
    }

    /// Shared handle for operator actions between days
    pub fn controller(&self) -> Arc<Mutex<PhaseController>> {
        Arc::clone(&self.controller)
    }

    pub fn buffer(&self) -> &Arc<ReplayBuffer> {
        &self.buffer
    }

    pub async fn metrics(&self) -> BufferMetrics {
        self.buffer.metrics(&self.universe.symbols).await
    }

    /// Run every trading day in `[start, end]`
    pub async fn run(&mut self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayReport>> {
        let mut reports = Vec::new();
        let mut date = start;
        if !is_trading_day(date) {
            date = next_trading_day(date);
        }
        while date <= end {
            reports.push(self.run_day(date).await?);
            date = next_trading_day(date);
        }

        let metrics = self.metrics().await;
        info!(
            days = reports.len(),
            transitions = metrics.transitions,
            real_trades = metrics.real_trades,
            converged = metrics.converged,
            coverage = metrics.coverage,
            "simulation finished"
        );
        Ok(reports)
    }

    #[instrument(skip(self))]
    pub async fn run_day(&mut self, date: NaiveDate) -> Result<DayReport> {
        let regime = match self.regime.classify(date).await {
            Ok(regime) => regime,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "regime classification failed, assuming medium");
                VolatilityRegime::Medium
            }
        };

        let (candidates, skipped) = self.candidates(date).await?;

        let mut controller = self.controller.lock().await;
        let phase_before = controller.phase();
        let source = controller.source_label();
        let ctx = GenerationContext {
            date,
            timestamp: session_open(date),
            regime,
            interval: self.universe.interval,
        };
        let trades = controller.generate(&candidates, &ctx);

        let mut fills = 0;
        let mut rewards = Vec::new();
        let mut failed_appends = 0;
        for trade in &trades {
            let outcome = match self.simulator.execute(trade).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    debug!(symbol = %trade.symbol, "no fill");
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(symbol = %trade.symbol, error = %e, "execution failed");
                    continue;
                }
            };
            fills += 1;

            let next_date = next_trading_day(outcome.exit_time.date_naive());
            let next_features = self
                .features
                .fetch_features(&outcome.symbol, outcome.interval, next_date)
                .await
                .unwrap_or_default();
            let outcome = outcome.with_next_features(next_features);

            let tags = TransitionTags::new(
                phase_before,
                source,
                trade.metadata.exploration_type,
                regime,
            );
            match self.buffer.add(&outcome, tags).await {
                Ok(transition) => rewards.push(transition.reward),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    failed_appends += 1;
                    error!(symbol = %trade.symbol, error = %e, "failed to record transition");
                }
            }
        }

        let phase_after = controller.update_phase().await?;
        let epsilon = controller.epsilon();
        drop(controller);

        let mean_reward = if rewards.is_empty() {
            0.0
        } else {
            rewards.iter().sum::<f64>() / rewards.len() as f64
        };
        let report = DayReport {
            date,
            regime,
            phase_before,
            phase_after,
            epsilon,
            candidates: candidates.len(),
            skipped,
            trades: trades.len(),
            fills,
            recorded: rewards.len(),
            failed_appends,
            mean_reward,
        };
        info!(
            %regime,
            phase = %phase_after,
            epsilon,
            candidates = report.candidates,
            skipped = report.skipped.len(),
            trades = report.trades,
            recorded = report.recorded,
            mean_reward,
            "day complete"
        );
        Ok(report)
    }

    /// Features for every symbol, looked up concurrently. Returns the
    /// candidates and the symbols skipped.
    async fn candidates(&self, date: NaiveDate) -> Result<(Vec<Candidate>, Vec<String>)> {
        let interval = self.universe.interval;
        let timeout = self.feature_timeout;
        let provider = self.features.as_ref();
        let lookups = self.universe.symbols.iter().map(|symbol| async move {
            let result = fetch_or_backfill(provider, symbol, interval, date, timeout).await;
            (symbol, result)
        });

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        for (symbol, result) in join_all(lookups).await {
            match result {
                Ok(features) => {
                    let price = features.get("close").and_then(Decimal::from_f64);
                    match price {
                        Some(price) if price > Decimal::ZERO => {
                            candidates.push(Candidate::new(symbol.clone(), price, features));
                        }
                        _ => {
                            warn!(%symbol, "features carry no reference price, skipping");
                            skipped.push(symbol.clone());
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    match &e {
                        TradeloopError::FeatureTimeout { .. } => {
                            warn!(%symbol, error = %e, "feature backfill timed out, skipping")
                        }
                        _ => debug!(%symbol, error = %e, "no features, skipping"),
                    }
                    skipped.push(symbol.clone());
                }
            }
        }
        Ok((candidates, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SyntheticBarProvider;
    use crate::domain::ExplorationType;
    use crate::persistence::MemoryTransitionStore;
    use crate::rl::config::{PhaseConfig, ReplayConfig};
    use crate::rl::core::RewardAttributor;
    use crate::rl::memory::ConvergenceRule;
    use crate::services::feature_service::{CachedFeatureProvider, FeatureConfig};
    use crate::strategy::execution_sim::ExecutionSimConfig;
    use crate::strategy::generators::{seeded_rng, GeneratorConfig, GeneratorSet};
    use crate::strategy::regime::FixedRegime;

    fn learning_loop(symbols: &[&str]) -> LearningLoop {
        let bars = Arc::new(SyntheticBarProvider::new(11).with_missing("GONE"));
        let phase = PhaseConfig::default();
        let buffer = Arc::new(ReplayBuffer::new(
            &ReplayConfig::default(),
            ConvergenceRule::from(&phase),
            Arc::new(MemoryTransitionStore::new()),
        ));
        let generators =
            GeneratorSet::from_config(&GeneratorConfig::default(), seeded_rng(Some(1))).unwrap();
        let controller = PhaseController::new(phase, buffer, generators, seeded_rng(Some(2)));
        let features = CachedFeatureProvider::new(
            FeatureConfig {
                poll_interval_secs: 0.01,
                backfill_days: 60,
                ..Default::default()
            },
            bars.clone(),
        );
        let simulator = ExecutionSimulator::new(
            ExecutionSimConfig::default(),
            bars,
            RewardAttributor::default(),
            seeded_rng(Some(3)),
        );
        LearningLoop::new(
            UniverseConfig {
                symbols: symbols.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            controller,
            Arc::new(features),
            Duration::from_secs(10),
            Arc::new(FixedRegime(VolatilityRegime::High)),
            simulator,
        )
    }

    #[tokio::test]
    async fn test_day_skips_missing_symbols_and_updates_phase() {
        let mut sweep = learning_loop(&["AAPL", "GONE", "MSFT"]);
        let date = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        let report = sweep.run_day(date).await.unwrap();

        assert_eq!(report.skipped, vec!["GONE".to_string()]);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.trades, 2);
        assert_eq!(report.recorded, report.fills);
        assert_eq!(report.phase_after, Phase::Synthetic);
        assert!((report.epsilon - 0.89).abs() < 1e-9);
        assert_eq!(sweep.controller().lock().await.ticks(), 1);

        let recorded = sweep.buffer().snapshot().await;
        assert_eq!(recorded.len(), report.recorded);
        for t in &recorded {
            assert_eq!(t.tags.source, "synthetic");
            assert_eq!(t.tags.vol_regime, VolatilityRegime::High);
            assert_eq!(t.tags.exploration_type, ExplorationType::Random);
        }
    }

    #[tokio::test]
    async fn test_run_covers_trading_days_only() {
        let mut sweep = learning_loop(&["AAPL"]);
        // Saturday through the following Friday
        let start = NaiveDate::from_ymd_opt(2024, 5, 11).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let reports = sweep.run(start, end).await.unwrap();

        assert_eq!(reports.len(), 5);
        assert!(reports.windows(2).all(|w| w[0].epsilon > w[1].epsilon));
        assert_eq!(sweep.metrics().await.coverage, 100.0);
    }
}
