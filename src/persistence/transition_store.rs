//! Transition Store
//!
//! Append-only persistence for replay transitions. Rows are never updated;
//! the replay buffer rebuilds its totals and window from `load_all` on
//! start-up.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    ExplorationType, FeatureVector, Interval, Phase, StrategyConfig, VolatilityRegime,
};
use crate::error::Result;
use crate::rl::core::{AttributionMode, DiscreteAction, RewardBreakdown};
use crate::rl::memory::{Transition, TransitionTags};

/// Key of the tag object inside the stored `strategy_config`
pub const TAGS_KEY: &str = "_tags";

/// One persisted transition.
///
/// Map-valued columns hold serialized JSON text so any relational store can
/// accept them without a JSON column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRow {
    pub id: Uuid,
    pub stock: String,
    pub date: NaiveDate,
    pub interval: String,
    pub action: i16,
    pub reward: f64,
    /// JSON object of named features
    pub features: String,
    /// JSON object of strategy parameters plus tags
    pub strategy_config: String,
    pub done: bool,
    pub missed_pnl: f64,
    pub holding_cost: f64,
    pub slippage_penalty: f64,
    pub capital_efficiency: f64,
    /// JSON array: state vector
    pub state: String,
    /// JSON array: next state vector
    pub next_features: String,
    /// JSON object: full reward breakdown
    pub breakdown: String,
    pub recorded_at: DateTime<Utc>,
}

impl TransitionRow {
    pub fn from_transition(transition: &Transition) -> Result<Self> {
        let tags = &transition.tags;
        let mut config = transition.strategy_config.clone();
        config.insert(
            TAGS_KEY.to_string(),
            serde_json::json!({
                "phase": tags.phase.index(),
                "source": tags.source,
                "exploration_type": tags.exploration_type.as_str(),
                "vol_regime": tags.vol_regime.as_str(),
            }),
        );

        let b = &transition.breakdown;
        Ok(Self {
            id: transition.id,
            stock: transition.symbol.clone(),
            date: transition.date,
            interval: transition.interval.as_str().to_string(),
            action: transition.action.to_index() as i16,
            reward: transition.reward,
            features: serde_json::to_string(&transition.features)?,
            strategy_config: serde_json::to_string(&config)?,
            done: transition.done,
            missed_pnl: b.missed_profit,
            holding_cost: b.holding_cost,
            slippage_penalty: b.slippage_penalty,
            capital_efficiency: b.capital_efficiency,
            state: serde_json::to_string(&transition.state)?,
            next_features: serde_json::to_string(&transition.next_state)?,
            breakdown: serde_json::to_string(b)?,
            recorded_at: transition.recorded_at,
        })
    }

    /// Rebuild the transition. Malformed JSON columns degrade to empty
    /// values with a warning; they never fail the load.
    pub fn into_transition(self) -> Transition {
        let mut config = parse_strategy_config(&self.strategy_config);
        let tags = extract_tags(&mut config);

        let features: FeatureVector = parse_or_default(&self.features, "features", &self.stock);
        let state: Vec<f64> = parse_or_default(&self.state, "state", &self.stock);
        let next_state: Vec<f64> =
            parse_or_default(&self.next_features, "next_features", &self.stock);
        let breakdown = serde_json::from_str::<RewardBreakdown>(&self.breakdown)
            .unwrap_or_else(|_| RewardBreakdown {
                missed_profit: self.missed_pnl,
                holding_cost: self.holding_cost,
                slippage_penalty: self.slippage_penalty,
                capital_efficiency: self.capital_efficiency,
                ..RewardBreakdown::from_total(AttributionMode::default(), self.reward)
            });
        let interval = Interval::from_str(&self.interval).unwrap_or_else(|_| {
            warn!(stock = %self.stock, interval = %self.interval, "unknown interval, assuming 1d");
            Interval::Day1
        });

        Transition {
            id: self.id,
            symbol: self.stock,
            date: self.date,
            interval,
            state,
            action: DiscreteAction::from_index(self.action.max(0) as usize).unwrap_or_default(),
            reward: self.reward,
            breakdown,
            next_state,
            done: self.done,
            strategy_config: config,
            tags,
            features,
            recorded_at: self.recorded_at,
        }
    }
}

/// Parse a strategy configuration payload; anything other than a JSON
/// object becomes an empty map.
pub fn parse_strategy_config(raw: &str) -> StrategyConfig {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            warn!(payload = %other, "strategy config is not an object, using empty config");
            StrategyConfig::new()
        }
        Err(e) => {
            warn!(error = %e, "malformed strategy config, using empty config");
            StrategyConfig::new()
        }
    }
}

fn parse_or_default<T: serde::de::DeserializeOwned + Default>(
    raw: &str,
    column: &str,
    stock: &str,
) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(%stock, column, error = %e, "malformed column, using empty value");
        T::default()
    })
}

/// Pull the tag object out of a stored config; missing tags take defaults
fn extract_tags(config: &mut StrategyConfig) -> TransitionTags {
    let mut tags = match config.remove(TAGS_KEY) {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    let phase = tags
        .remove("phase")
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_u64().and_then(|i| Phase::from_index(i as u8)),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or_default();
    let source = match tags.remove("source") {
        Some(serde_json::Value::String(s)) => s,
        _ => phase.source_label().to_string(),
    };
    let exploration_type = tags
        .remove("exploration_type")
        .and_then(|v| v.as_str().and_then(|s| ExplorationType::from_str(s).ok()))
        .unwrap_or(ExplorationType::Random);
    let vol_regime = tags
        .remove("vol_regime")
        .and_then(|v| v.as_str().and_then(|s| VolatilityRegime::from_str(s).ok()))
        .unwrap_or(VolatilityRegime::Medium);

    TransitionTags {
        phase,
        source,
        exploration_type,
        vol_regime,
    }
}

/// Durable, append-only transition storage
#[async_trait]
pub trait TransitionStore: Send + Sync {
    /// Persist one row; at-least-once semantics
    async fn append(&self, row: &TransitionRow) -> Result<()>;

    /// Every row in append order
    async fn load_all(&self) -> Result<Vec<TransitionRow>>;
}

/// In-process store for tests and database-less runs
#[derive(Default)]
pub struct MemoryTransitionStore {
    rows: RwLock<Vec<TransitionRow>>,
}

impl MemoryTransitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn rows(&self) -> Vec<TransitionRow> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl TransitionStore for MemoryTransitionStore {
    async fn append(&self, row: &TransitionRow) -> Result<()> {
        self.rows.write().await.push(row.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TransitionRow>> {
        Ok(self.rows.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transition() -> Transition {
        let mut config = StrategyConfig::new();
        config.insert("policy".to_string(), "linear".into());
        Transition {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            interval: Interval::Day1,
            state: vec![0.1, -0.2, 55.0],
            action: DiscreteAction::Sell,
            reward: -0.0125,
            breakdown: RewardBreakdown {
                mode: AttributionMode::Execution,
                base_pnl: -0.01,
                cost_penalty: 0.0035,
                info_bonus: 0.001,
                total: -0.0125,
                ..Default::default()
            },
            next_state: vec![0.2, -0.1, 50.0],
            done: true,
            strategy_config: config,
            tags: TransitionTags {
                phase: Phase::Guided,
                source: "guided".to_string(),
                exploration_type: ExplorationType::RuleBased,
                vol_regime: VolatilityRegime::High,
            },
            features: FeatureVector::from_pairs([("rsi_14", 55.0), ("ret_1d", 0.1)]),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_round_trip() {
        let transition = sample_transition();
        let row = TransitionRow::from_transition(&transition).unwrap();
        assert_eq!(row.stock, "AAPL");
        assert_eq!(row.action, 2);
        assert!(row.strategy_config.contains("\"source\":\"guided\""));

        let back = row.into_transition();
        assert_eq!(back.reward, transition.reward);
        assert_eq!(back.done, transition.done);
        assert_eq!(back.action, transition.action);
        assert_eq!(back.state, transition.state);
        assert_eq!(back.next_state, transition.next_state);
        assert_eq!(back.tags, transition.tags);
        assert_eq!(back.breakdown, transition.breakdown);
        assert_eq!(back.features, transition.features);
        // Tag keys do not leak back into the strategy config
        assert_eq!(back.strategy_config, transition.strategy_config);
    }

    #[test]
    fn test_malformed_strategy_config_is_empty() {
        assert!(parse_strategy_config("{not json").is_empty());
        assert!(parse_strategy_config("[1, 2]").is_empty());
        assert_eq!(parse_strategy_config(r#"{"a": 1}"#).len(), 1);

        let mut row = TransitionRow::from_transition(&sample_transition()).unwrap();
        row.strategy_config = "garbage".to_string();
        row.features = "".to_string();
        let back = row.into_transition();
        assert!(back.strategy_config.is_empty());
        assert!(back.features.is_empty());
        assert_eq!(back.tags.phase, Phase::Synthetic);
        assert_eq!(back.tags.source, "synthetic");
    }

    #[test]
    fn test_user_keys_survive_next_to_tags() {
        let mut transition = sample_transition();
        for key in ["phase", "source", "exploration_type", "vol_regime"] {
            transition
                .strategy_config
                .insert(key.to_string(), format!("user-{key}").into());
        }

        let back = TransitionRow::from_transition(&transition)
            .unwrap()
            .into_transition();
        assert_eq!(back.strategy_config, transition.strategy_config);
        assert_eq!(back.strategy_config["source"], "user-source");
        assert_eq!(back.tags, transition.tags);
    }

    #[tokio::test]
    async fn test_memory_store_load_all_in_append_order() {
        let store = MemoryTransitionStore::new();
        for i in 0..5 {
            let mut t = sample_transition();
            t.reward = i as f64;
            store
                .append(&TransitionRow::from_transition(&t).unwrap())
                .await
                .unwrap();
        }
        let rewards: Vec<f64> = store
            .load_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.reward)
            .collect();
        assert_eq!(rewards, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
