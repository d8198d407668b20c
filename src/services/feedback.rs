//! Live feedback collector
//!
//! Subscribes to the event bus and records one transition per
//! `TRADE_CLOSE`, attributed with the live-feedback formula and tagged
//! `source = "real"` with whatever phase the controller is in at the time.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event_bus::{EventBus, TradingEvent};
use super::feature_service::FeatureProvider;
use crate::domain::{
    Direction, ExplorationType, FeatureVector, Interval, StrategyConfig, VolatilityRegime,
};
use crate::error::Result;
use crate::rl::core::{LiveFeedbackInput, RewardAttributor};
use crate::rl::memory::{ReplayBuffer, Transition, TransitionTags};
use crate::rl::training::PhaseState;
use crate::strategy::regime::RegimeClassifier;

/// Source tag for broker-reported trades
pub const REAL_SOURCE: &str = "real";

/// Position opened by a `TRADE_OPEN`, waiting for its close
#[derive(Debug, Clone)]
struct OpenPosition {
    qty: f64,
    price: f64,
    interval: Interval,
    strategy_config: StrategyConfig,
    opened_at: DateTime<Utc>,
    /// Largest unrealized PnL reported by `M2M_PNL`
    best_unrealized: Option<f64>,
}

impl OpenPosition {
    fn direction(&self) -> Direction {
        Direction::from_sign(self.qty)
    }

    /// Most favourable price implied by the best mark
    fn best_price(&self) -> Option<f64> {
        let best = self.best_unrealized?;
        if self.qty == 0.0 || best <= 0.0 {
            return None;
        }
        Some(self.price + self.direction().sign() * best / self.qty.abs())
    }
}

pub struct FeedbackCollector {
    buffer: Arc<ReplayBuffer>,
    attributor: RewardAttributor,
    phase_rx: watch::Receiver<PhaseState>,
    features: Option<Arc<dyn FeatureProvider>>,
    regime: Option<Arc<dyn RegimeClassifier>>,
    open: HashMap<String, OpenPosition>,
    recorded: u64,
}

impl FeedbackCollector {
    pub fn new(
        buffer: Arc<ReplayBuffer>,
        attributor: RewardAttributor,
        phase_rx: watch::Receiver<PhaseState>,
    ) -> Self {
        Self {
            buffer,
            attributor,
            phase_rx,
            features: None,
            regime: None,
            open: HashMap::new(),
            recorded: 0,
        }
    }

    /// Fill state vectors from cached features
    pub fn with_features(mut self, features: Arc<dyn FeatureProvider>) -> Self {
        self.features = Some(features);
        self
    }

    /// Tag transitions with the regime of the close date
    pub fn with_regime(mut self, regime: Arc<dyn RegimeClassifier>) -> Self {
        self.regime = Some(regime);
        self
    }

    /// Transitions recorded so far
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn open_positions(&self) -> usize {
        self.open.len()
    }

    /// Apply one event. Returns the transition a close produced.
    pub async fn handle(&mut self, event: &TradingEvent) -> Result<Option<Transition>> {
        match event {
            TradingEvent::TradeOpen {
                symbol,
                qty,
                price,
                interval,
                strategy_config,
                timestamp,
            } => {
                debug!(symbol = %symbol, qty, price, "position opened");
                self.open.insert(
                    symbol.clone(),
                    OpenPosition {
                        qty: *qty,
                        price: *price,
                        interval: *interval,
                        strategy_config: strategy_config.clone(),
                        opened_at: *timestamp,
                        best_unrealized: None,
                    },
                );
                Ok(None)
            }
            TradingEvent::MarkToMarket {
                symbol,
                unrealized_pnl,
                ..
            } => {
                if let Some(position) = self.open.get_mut(symbol) {
                    if unrealized_pnl.is_finite() {
                        let best = position.best_unrealized.unwrap_or(f64::MIN);
                        position.best_unrealized = Some(best.max(*unrealized_pnl));
                    }
                }
                Ok(None)
            }
            TradingEvent::TradeClose { .. } => {
                let Some(transition) = self.close_transition(event).await else {
                    return Ok(None);
                };
                self.buffer.record(transition.clone()).await?;
                self.recorded += 1;
                Ok(Some(transition))
            }
        }
    }

    async fn close_transition(&mut self, event: &TradingEvent) -> Option<Transition> {
        let TradingEvent::TradeClose {
            symbol,
            exit_price,
            reward,
            timestamp,
            strategy_config,
            missed_pnl,
            holding_cost,
            slippage_penalty,
            capital_efficiency,
        } = event
        else {
            return None;
        };

        let position = self.open.remove(symbol);
        if position.is_none() {
            warn!(symbol = %symbol, "close without a matching open");
        }

        let (entry_price, qty, direction, opened_at, interval) = match &position {
            Some(p) => (p.price, p.qty, p.direction(), p.opened_at, p.interval),
            None => (*exit_price, 0.0, Direction::Long, *timestamp, Interval::Day1),
        };
        let days_held = (*timestamp - opened_at).num_seconds().max(0) as f64 / 86_400.0;

        let breakdown = self.attributor.live_feedback(&LiveFeedbackInput {
            base_pnl: *reward,
            entry_price,
            exit_price: *exit_price,
            best_price: position.as_ref().and_then(OpenPosition::best_price),
            quantity: qty.abs(),
            direction,
            days_held,
            slippage_penalty: *slippage_penalty,
        });

        // Open config first, close config overrides; broker figures kept for audit
        let mut config = position
            .as_ref()
            .map(|p| p.strategy_config.clone())
            .unwrap_or_default();
        config.extend(strategy_config.clone());
        config.insert(
            "reported".to_string(),
            serde_json::json!({
                "missed_pnl": missed_pnl,
                "holding_cost": holding_cost,
                "capital_efficiency": capital_efficiency,
            }),
        );

        let exploration_type = config
            .get("exploration_type")
            .and_then(|v| v.as_str())
            .and_then(|s| ExplorationType::from_str(s).ok())
            .unwrap_or(ExplorationType::Model);
        let vol_regime = match &self.regime {
            Some(classifier) => classifier
                .classify(timestamp.date_naive())
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "regime lookup failed, tagging medium");
                    VolatilityRegime::Medium
                }),
            None => VolatilityRegime::Medium,
        };
        let phase = self.phase_rx.borrow().phase;

        let features = self
            .lookup_features(symbol, interval, opened_at)
            .await
            .unwrap_or_default();
        let state = features.to_state();
        let next_state = match self.lookup_features(symbol, interval, *timestamp).await {
            Some(next) => next.to_state(),
            None => state.clone(),
        };

        info!(
            symbol = %symbol,
            %phase,
            reward = breakdown.total,
            days_held,
            "live trade closed"
        );

        Some(Transition {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            date: timestamp.date_naive(),
            interval,
            state,
            action: direction.opening_action(),
            reward: breakdown.total,
            breakdown,
            next_state,
            done: true,
            strategy_config: config,
            tags: TransitionTags::new(phase, REAL_SOURCE, exploration_type, vol_regime),
            features,
            recorded_at: Utc::now(),
        })
    }

    /// Cache-only lookup; a close never waits on a backfill
    async fn lookup_features(
        &self,
        symbol: &str,
        interval: Interval,
        at: DateTime<Utc>,
    ) -> Option<FeatureVector> {
        let provider = self.features.as_ref()?;
        match provider.fetch_features(symbol, interval, at.date_naive()).await {
            Ok(features) => features,
            Err(e) => {
                debug!(symbol, error = %e, "feature lookup failed");
                None
            }
        }
    }

    /// Consume events until the bus closes or shutdown fires. Returns the
    /// number of transitions recorded.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<TradingEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> u64 {
        info!("feedback collector started");
        loop {
            // Pending events drain before shutdown is honoured
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Some(event) => {
                        if let Err(e) = self.handle(&event).await {
                            error!(
                                kind = event.kind(),
                                symbol = event.symbol(),
                                error = %e,
                                "failed to record live feedback"
                            );
                        }
                    }
                    None => {
                        info!(recorded = self.recorded, "event bus closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!(recorded = self.recorded, "feedback collector shutting down");
                    break;
                }
            }
        }
        self.recorded
    }

    /// Subscribe to `bus` and run on a background task
    pub fn spawn(self, bus: &EventBus, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<u64> {
        let events = bus.subscribe();
        tokio::spawn(self.run(events, shutdown_rx))
    }
}
