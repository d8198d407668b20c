//! Replay Buffer
//!
//! Durable experience store for the learning loop. Every transition is
//! appended to a `TransitionStore` first, then folded into running totals
//! and a bounded in-memory window. Metrics read the totals; sampling reads
//! the window.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    ExplorationType, FeatureVector, Interval, Outcome, Phase, StrategyConfig, VolatilityRegime,
};
use crate::error::Result;
use crate::persistence::{TransitionRow, TransitionStore};
use crate::rl::config::{PhaseConfig, ReplayConfig};
use crate::rl::core::{DiscreteAction, Observation, RewardBreakdown};

/// Provenance tags stored with every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTags {
    pub phase: Phase,
    /// "synthetic", "guided", "autonomous" or "real"
    pub source: String,
    pub exploration_type: ExplorationType,
    pub vol_regime: VolatilityRegime,
}

impl TransitionTags {
    pub fn new(
        phase: Phase,
        source: impl Into<String>,
        exploration_type: ExplorationType,
        vol_regime: VolatilityRegime,
    ) -> Self {
        Self {
            phase,
            source: source.into(),
            exploration_type,
            vol_regime,
        }
    }
}

/// A single recorded experience
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub id: Uuid,
    pub symbol: String,
    pub date: NaiveDate,
    pub interval: Interval,
    /// State features before the action
    pub state: Observation,
    pub action: DiscreteAction,
    /// Final scalar reward
    pub reward: f64,
    pub breakdown: RewardBreakdown,
    /// State features after the action
    pub next_state: Observation,
    pub done: bool,
    pub strategy_config: StrategyConfig,
    pub tags: TransitionTags,
    pub features: FeatureVector,
    pub recorded_at: DateTime<Utc>,
}

impl Transition {
    /// Build from an executed outcome. Each trade is a one-step episode,
    /// so the transition is terminal.
    pub fn from_outcome(outcome: &Outcome, tags: TransitionTags) -> Self {
        let state = outcome.features.to_state();
        let next_state = outcome
            .next_features
            .as_ref()
            .map(FeatureVector::to_state)
            .unwrap_or_else(|| state.clone());

        Self {
            id: Uuid::new_v4(),
            symbol: outcome.symbol.clone(),
            date: outcome.entry_time.date_naive(),
            interval: outcome.interval,
            state,
            action: outcome.action(),
            reward: outcome.reward,
            breakdown: outcome.breakdown,
            next_state,
            done: true,
            strategy_config: outcome.metadata.strategy_config.clone(),
            tags,
            features: outcome.features.clone(),
            recorded_at: Utc::now(),
        }
    }
}

/// Convergence test applied to phase-1 rewards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceRule {
    /// Number of most recent Guided-phase rewards examined
    pub window: usize,
    /// |mean| must exceed this
    pub threshold: f64,
}

impl From<&PhaseConfig> for ConvergenceRule {
    fn from(config: &PhaseConfig) -> Self {
        Self {
            window: config.convergence_window,
            threshold: config.convergence_threshold,
        }
    }
}

impl Default for ConvergenceRule {
    fn default() -> Self {
        Self::from(&PhaseConfig::default())
    }
}

/// Summary of a reward series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardStats {
    pub count: usize,
    pub mean: f64,
    pub total: f64,
}

/// Streaming mean and variance (Welford)
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    total: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn summary(&self) -> RewardStats {
        RewardStats {
            count: self.count,
            mean: self.mean,
            total: self.total,
        }
    }

    /// mean / sample std; 0.0 below two samples or for zero variance
    fn sharpe(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let std = (self.m2 / (self.count - 1) as f64).sqrt();
        if std == 0.0 || !std.is_finite() {
            return 0.0;
        }
        self.mean / std
    }
}

/// Snapshot of buffer-derived statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferMetrics {
    pub transitions: usize,
    pub real_trades: usize,
    pub converged: bool,
    pub rewards_by_phase: BTreeMap<Phase, RewardStats>,
    pub rewards_by_regime: BTreeMap<VolatilityRegime, RewardStats>,
    pub sharpe_by_regime: BTreeMap<VolatilityRegime, f64>,
    /// Percentage of the universe seen (0-100)
    pub coverage: f64,
}

/// Column-wise view of a batch for offline training
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    pub states: Vec<Observation>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<Observation>,
    pub dones: Vec<bool>,
}

impl TransitionBatch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Totals over every stored transition. Only the window evicts; these
/// always agree with a recount of the store.
#[derive(Debug, Default)]
struct Totals {
    transitions: usize,
    real_trades: usize,
    by_phase: BTreeMap<Phase, RunningStats>,
    by_regime: BTreeMap<VolatilityRegime, RunningStats>,
    /// Latest Guided-phase rewards, newest last, at most the convergence window
    recent_guided: VecDeque<f64>,
    symbols: HashSet<String>,
}

impl Totals {
    fn converged(&self, rule: ConvergenceRule) -> bool {
        let n = self.recent_guided.len();
        if rule.window == 0 || n < rule.window {
            return false;
        }
        let mean = self.recent_guided.iter().sum::<f64>() / n as f64;
        mean.abs() > rule.threshold
    }

    fn coverage(&self, universe: &[String]) -> f64 {
        if universe.is_empty() {
            return 0.0;
        }
        let covered = universe.iter().filter(|s| self.symbols.contains(*s)).count();
        covered as f64 / universe.len() as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct BufferState {
    window: VecDeque<Transition>,
    totals: Totals,
}

/// Replay buffer shared across the loop and the feedback collector
pub struct ReplayBuffer {
    state: RwLock<BufferState>,
    store: Arc<dyn TransitionStore>,
    capacity: usize,
    real_sources: HashSet<String>,
    hydrate_limit: usize,
    convergence: ConvergenceRule,
}

impl ReplayBuffer {
    pub fn new(
        config: &ReplayConfig,
        convergence: ConvergenceRule,
        store: Arc<dyn TransitionStore>,
    ) -> Self {
        Self {
            state: RwLock::new(BufferState::default()),
            store,
            capacity: config.capacity.max(1),
            real_sources: config.real_sources.iter().cloned().collect(),
            hydrate_limit: config.hydrate_limit,
            convergence,
        }
    }

    /// Record an executed outcome with its tags
    pub async fn add(&self, outcome: &Outcome, tags: TransitionTags) -> Result<Transition> {
        let transition = Transition::from_outcome(outcome, tags);
        self.record(transition.clone()).await?;
        Ok(transition)
    }

    /// Persist a pre-built transition, then expose it to metrics.
    ///
    /// The write lock spans the store append so the window and the totals
    /// see transitions in store order.
    pub async fn record(&self, transition: Transition) -> Result<()> {
        let row = TransitionRow::from_transition(&transition)?;
        let mut state = self.state.write().await;
        self.store.append(&row).await?;

        debug!(
            symbol = %transition.symbol,
            action = ?transition.action,
            reward = transition.reward,
            source = %transition.tags.source,
            "transition recorded"
        );
        self.observe(&mut state.totals, &transition);
        self.push(&mut state.window, transition);
        Ok(())
    }

    fn observe(&self, totals: &mut Totals, transition: &Transition) {
        let tags = &transition.tags;
        totals.transitions += 1;
        if self.real_sources.contains(&tags.source) {
            totals.real_trades += 1;
        }
        totals.by_phase.entry(tags.phase).or_default().push(transition.reward);
        totals.by_regime.entry(tags.vol_regime).or_default().push(transition.reward);
        if tags.phase == Phase::Guided && self.convergence.window > 0 {
            if totals.recent_guided.len() == self.convergence.window {
                totals.recent_guided.pop_front();
            }
            totals.recent_guided.push_back(transition.reward);
        }
        if !totals.symbols.contains(&transition.symbol) {
            totals.symbols.insert(transition.symbol.clone());
        }
    }

    fn push(&self, window: &mut VecDeque<Transition>, transition: Transition) {
        if window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(transition);
    }

    /// Rebuild totals and window from the store, replacing anything held.
    /// Returns the number of stored rows.
    pub async fn hydrate(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let rows = self.store.load_all().await?;
        let count = rows.len();
        let window_from = count.saturating_sub(self.hydrate_limit);

        *state = BufferState::default();
        for (i, row) in rows.into_iter().enumerate() {
            let transition = row.into_transition();
            self.observe(&mut state.totals, &transition);
            if i >= window_from {
                self.push(&mut state.window, transition);
            }
        }
        info!(count, window = state.window.len(), "replay buffer hydrated from store");
        Ok(count)
    }

    /// Transitions held in the in-memory window
    pub async fn len(&self) -> usize {
        self.state.read().await.window.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.window.is_empty()
    }

    /// Transitions recorded in the store since the last hydrate
    pub async fn total_recorded(&self) -> usize {
        self.state.read().await.totals.transitions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn convergence_rule(&self) -> ConvergenceRule {
        self.convergence
    }

    /// Transitions whose source is on the real allow-list
    pub async fn count_real_trades(&self) -> usize {
        self.state.read().await.totals.real_trades
    }

    /// True when the last `window` Guided-phase rewards have
    /// `|mean| > threshold`. Fewer than `window` samples never converge.
    pub async fn policy_converged(&self) -> bool {
        self.state.read().await.totals.converged(self.convergence)
    }

    /// Sharpe ratio of rewards recorded under `regime`
    pub async fn sharpe(&self, regime: VolatilityRegime) -> f64 {
        self.state
            .read()
            .await
            .totals
            .by_regime
            .get(&regime)
            .map(RunningStats::sharpe)
            .unwrap_or(0.0)
    }

    /// Percentage (0-100) of `universe` with at least one transition
    pub async fn trade_coverage(&self, universe: &[String]) -> f64 {
        self.state.read().await.totals.coverage(universe)
    }

    pub async fn rewards_by_phase(&self) -> BTreeMap<Phase, RewardStats> {
        let state = self.state.read().await;
        summarize(&state.totals.by_phase)
    }

    pub async fn rewards_by_regime(&self) -> BTreeMap<VolatilityRegime, RewardStats> {
        let state = self.state.read().await;
        summarize(&state.totals.by_regime)
    }

    /// All derived statistics from one consistent snapshot
    pub async fn metrics(&self, universe: &[String]) -> BufferMetrics {
        let state = self.state.read().await;
        let totals = &state.totals;

        BufferMetrics {
            transitions: totals.transitions,
            real_trades: totals.real_trades,
            converged: totals.converged(self.convergence),
            rewards_by_phase: summarize(&totals.by_phase),
            rewards_by_regime: summarize(&totals.by_regime),
            sharpe_by_regime: totals
                .by_regime
                .iter()
                .map(|(regime, stats)| (*regime, stats.sharpe()))
                .collect(),
            coverage: totals.coverage(universe),
        }
    }

    /// Uniform sample without replacement from the window
    pub async fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Vec<Transition> {
        let state = self.state.read().await;
        let window = &state.window;
        let mut indices: Vec<usize> = (0..window.len()).collect();
        indices.shuffle(rng);
        indices
            .into_iter()
            .take(batch_size.min(window.len()))
            .map(|i| window[i].clone())
            .collect()
    }

    /// Windowed transitions for one symbol
    pub async fn transitions_for(&self, symbol: &str) -> Vec<Transition> {
        self.state
            .read()
            .await
            .window
            .iter()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Copy of the retained window, oldest first
    pub async fn snapshot(&self) -> Vec<Transition> {
        self.state.read().await.window.iter().cloned().collect()
    }

    /// Split a batch into training columns
    pub fn to_batch(batch: &[Transition]) -> TransitionBatch {
        TransitionBatch {
            states: batch.iter().map(|t| t.state.clone()).collect(),
            actions: batch.iter().map(|t| t.action.to_index()).collect(),
            rewards: batch.iter().map(|t| t.reward).collect(),
            next_states: batch.iter().map(|t| t.next_state.clone()).collect(),
            dones: batch.iter().map(|t| t.done).collect(),
        }
    }
}

fn summarize<K: Ord + Copy>(stats: &BTreeMap<K, RunningStats>) -> BTreeMap<K, RewardStats> {
    stats.iter().map(|(key, s)| (*key, s.summary())).collect()
}
