//! Feature lookup with asynchronous backfill
//!
//! A miss enqueues a backfill job and the caller waits, polling, up to a
//! timeout. A caller that times out just stops waiting: the spawned job
//! keeps running and fills the cache for the next cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::BarProvider;
use crate::domain::{Bar, FeatureVector, Interval};
use crate::error::{Result, TradeloopError};
use crate::strategy::calculations::{indicator_features, MIN_HISTORY};

/// Outcome of waiting on a backfill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Timeout,
}

/// Point-in-time features for a symbol
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Cached features as of `date`, `None` on a miss
    async fn fetch_features(
        &self,
        symbol: &str,
        interval: Interval,
        date: NaiveDate,
    ) -> Result<Option<FeatureVector>>;

    /// Start a backfill job unless one is already running
    async fn enqueue_backfill(&self, symbol: &str, interval: Interval) -> Result<()>;

    /// Poll until the backfill finishes or `timeout` elapses
    async fn wait_until_ready(
        &self,
        symbol: &str,
        interval: Interval,
        timeout: Duration,
    ) -> Result<Readiness>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Give up waiting on a backfill after this long
    pub backfill_timeout_secs: f64,
    /// Readiness poll period
    pub poll_interval_secs: f64,
    /// Daily bars fetched per backfill job
    pub backfill_days: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            backfill_timeout_secs: 300.0,
            poll_interval_secs: 5.0,
            backfill_days: 250,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backfill_timeout_secs <= 0.0 || self.poll_interval_secs <= 0.0 {
            return Err(TradeloopError::InvalidConfig(
                "feature timeout and poll interval must be positive".to_string(),
            ));
        }
        if self.backfill_days <= MIN_HISTORY {
            return Err(TradeloopError::InvalidConfig(format!(
                "backfill_days must exceed the {} bars indicators need",
                MIN_HISTORY
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.backfill_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }
}

/// Fetch; on a miss, backfill and wait. A wait that runs out surfaces as
/// `FeatureTimeout`; a finished backfill without the date is
/// `DataUnavailable`.
pub async fn fetch_or_backfill(
    provider: &dyn FeatureProvider,
    symbol: &str,
    interval: Interval,
    date: NaiveDate,
    timeout: Duration,
) -> Result<FeatureVector> {
    if let Some(features) = provider.fetch_features(symbol, interval, date).await? {
        return Ok(features);
    }

    debug!(symbol, %interval, %date, "feature miss, backfilling");
    provider.enqueue_backfill(symbol, interval).await?;

    match provider.wait_until_ready(symbol, interval, timeout).await? {
        Readiness::Ready => provider
            .fetch_features(symbol, interval, date)
            .await?
            .ok_or_else(|| {
                TradeloopError::DataUnavailable(format!("no features for {symbol} on {date}"))
            }),
        Readiness::Timeout => Err(TradeloopError::FeatureTimeout {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            waited_secs: timeout.as_secs(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum JobState {
    Running,
    Done,
    Failed(String),
}

type FeatureKey = (String, Interval);

/// DashMap-backed cache filled by tokio-spawned backfill jobs.
///
/// Features for date `D` are computed from closes strictly before `D`, so
/// a trade created during `D` never sees that day's close.
#[derive(Clone)]
pub struct CachedFeatureProvider {
    bars: Arc<dyn BarProvider>,
    config: FeatureConfig,
    cache: Arc<DashMap<FeatureKey, BTreeMap<NaiveDate, FeatureVector>>>,
    jobs: Arc<DashMap<FeatureKey, JobState>>,
    /// Most recent date that missed, per key; the next backfill ends there
    wanted: Arc<DashMap<FeatureKey, NaiveDate>>,
}

impl CachedFeatureProvider {
    pub fn new(config: FeatureConfig, bars: Arc<dyn BarProvider>) -> Self {
        Self {
            bars,
            config,
            cache: Arc::new(DashMap::new()),
            jobs: Arc::new(DashMap::new()),
            wanted: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Dates cached for a symbol
    pub fn cached_days(&self, symbol: &str, interval: Interval) -> usize {
        self.cache
            .get(&(symbol.to_string(), interval))
            .map(|days| days.len())
            .unwrap_or(0)
    }

    /// Load features synchronously, e.g. to warm the cache before a run
    pub async fn backfill_now(
        &self,
        symbol: &str,
        interval: Interval,
        end: NaiveDate,
    ) -> Result<usize> {
        let key = (symbol.to_string(), interval);
        Self::run_backfill(
            Arc::clone(&self.bars),
            Arc::clone(&self.cache),
            key,
            end,
            self.config.backfill_days,
        )
        .await
    }

    async fn run_backfill(
        bars: Arc<dyn BarProvider>,
        cache: Arc<DashMap<FeatureKey, BTreeMap<NaiveDate, FeatureVector>>>,
        key: FeatureKey,
        end: NaiveDate,
        lookback: usize,
    ) -> Result<usize> {
        let history = bars.daily_bars(&key.0, end, lookback).await?;
        let computed = features_by_date(&history);
        if computed.is_empty() {
            return Err(TradeloopError::DataUnavailable(format!(
                "{} bars for {} are too few for indicators",
                history.len(),
                key.0
            )));
        }
        let count = computed.len();
        cache.entry(key).or_default().extend(computed);
        Ok(count)
    }
}

/// Indicator snapshot per date from the closes before it
fn features_by_date(bars: &[Bar]) -> BTreeMap<NaiveDate, FeatureVector> {
    let closes: Vec<f64> = bars.iter().map(Bar::close_f64).collect();
    (MIN_HISTORY..bars.len())
        .filter_map(|i| {
            indicator_features(&closes[..i]).map(|f| (bars[i].timestamp.date_naive(), f))
        })
        .collect()
}

#[async_trait]
impl FeatureProvider for CachedFeatureProvider {
    async fn fetch_features(
        &self,
        symbol: &str,
        interval: Interval,
        date: NaiveDate,
    ) -> Result<Option<FeatureVector>> {
        let key = (symbol.to_string(), interval);
        let hit = self
            .cache
            .get(&key)
            .and_then(|days| days.get(&date).cloned());
        if hit.is_none() {
            self.wanted.insert(key, date);
        }
        Ok(hit)
    }

    async fn enqueue_backfill(&self, symbol: &str, interval: Interval) -> Result<()> {
        let key = (symbol.to_string(), interval);
        if matches!(self.jobs.get(&key).as_deref(), Some(JobState::Running)) {
            debug!(symbol, %interval, "backfill already running");
            return Ok(());
        }
        self.jobs.insert(key.clone(), JobState::Running);

        let end = self
            .wanted
            .get(&key)
            .map(|d| *d)
            .unwrap_or_else(|| Utc::now().date_naive());
        let bars = Arc::clone(&self.bars);
        let cache = Arc::clone(&self.cache);
        let jobs = Arc::clone(&self.jobs);
        let lookback = self.config.backfill_days;

        tokio::spawn(async move {
            let result = Self::run_backfill(bars, cache, key.clone(), end, lookback).await;
            let state = match result {
                Ok(days) => {
                    info!(symbol = %key.0, interval = %key.1, %end, days, "backfill complete");
                    JobState::Done
                }
                Err(e) => {
                    warn!(symbol = %key.0, interval = %key.1, error = %e, "backfill failed");
                    JobState::Failed(e.to_string())
                }
            };
            jobs.insert(key, state);
        });
        Ok(())
    }

    async fn wait_until_ready(
        &self,
        symbol: &str,
        interval: Interval,
        timeout: Duration,
    ) -> Result<Readiness> {
        let key = (symbol.to_string(), interval);
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.jobs.get(&key).map(|s| s.value().clone());
            match state {
                Some(JobState::Done) => return Ok(Readiness::Ready),
                Some(JobState::Failed(reason)) => {
                    return Err(TradeloopError::DataUnavailable(reason));
                }
                None => {
                    return Err(TradeloopError::DataUnavailable(format!(
                        "no backfill queued for {symbol} ({interval})"
                    )));
                }
                Some(JobState::Running) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Readiness::Timeout);
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }
}
