//! Volatility regime classification
//!
//! Classifies each simulated day as Low / Medium / High volatility from the
//! annualised realized volatility of a benchmark symbol.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::BarProvider;
use crate::domain::{Bar, VolatilityRegime};
use crate::error::{Result, TradeloopError};
use crate::strategy::calculations::realized_volatility;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Market context for a given day
#[async_trait]
pub trait RegimeClassifier: Send + Sync {
    async fn classify(&self, date: NaiveDate) -> Result<VolatilityRegime>;
}

/// Regime thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Symbol whose volatility defines the regime
    pub benchmark: String,
    /// Daily returns in the volatility window
    pub window: usize,
    /// Annualised vol below this is Low
    pub low_threshold: f64,
    /// Annualised vol above this is High
    pub high_threshold: f64,
    /// Regime used when the benchmark has no data
    pub fallback: VolatilityRegime,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            benchmark: "SPY".to_string(),
            window: 20,
            low_threshold: 0.15,
            high_threshold: 0.30,
            fallback: VolatilityRegime::Medium,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            return Err(TradeloopError::InvalidConfig(
                "regime window must be at least 2".to_string(),
            ));
        }
        if self.low_threshold > self.high_threshold {
            return Err(TradeloopError::InvalidConfig(format!(
                "regime low threshold {} above high threshold {}",
                self.low_threshold, self.high_threshold
            )));
        }
        Ok(())
    }

    /// Bucket an annualised volatility
    pub fn bucket(&self, annualised_vol: f64) -> VolatilityRegime {
        if annualised_vol < self.low_threshold {
            VolatilityRegime::Low
        } else if annualised_vol > self.high_threshold {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Medium
        }
    }
}

/// Realized-volatility classifier over a benchmark's daily closes
pub struct RealizedVolClassifier {
    config: RegimeConfig,
    bars: Arc<dyn BarProvider>,
}

impl RealizedVolClassifier {
    pub fn new(config: RegimeConfig, bars: Arc<dyn BarProvider>) -> Self {
        Self { config, bars }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }
}

#[async_trait]
impl RegimeClassifier for RealizedVolClassifier {
    async fn classify(&self, date: NaiveDate) -> Result<VolatilityRegime> {
        let bars = self
            .bars
            .daily_bars(&self.config.benchmark, date, self.config.window + 1)
            .await?;
        let closes: Vec<f64> = bars.iter().map(Bar::close_f64).collect();

        let regime = match realized_volatility(&closes, self.config.window) {
            Some(vol) => {
                let annualised = vol * TRADING_DAYS_PER_YEAR.sqrt();
                let regime = self.config.bucket(annualised);
                debug!(%date, annualised, %regime, "regime classified");
                regime
            }
            None => {
                debug!(
                    %date,
                    bars = closes.len(),
                    "benchmark history too short, using fallback regime"
                );
                self.config.fallback
            }
        };
        Ok(regime)
    }
}

/// Always returns the same regime
pub struct FixedRegime(pub VolatilityRegime);

#[async_trait]
impl RegimeClassifier for FixedRegime {
    async fn classify(&self, _date: NaiveDate) -> Result<VolatilityRegime> {
        Ok(self.0)
    }
}
