//! Market Series and Simulated Prices
//!
//! The environment replays a `MarketSeries`: one price and one feature row
//! per bar. `SimulatedMarket` generates series for training without data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;
use crate::error::{Result, TradeloopError};
use crate::strategy::calculations::{realized_volatility, rsi, trailing_return};

/// Sample from a standard normal (Box-Muller transform)
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(0.0001..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Prices plus an equal-width feature row for every bar
#[derive(Debug, Clone)]
pub struct MarketSeries {
    prices: Vec<f64>,
    features: Vec<Vec<f64>>,
    feature_dim: usize,
}

impl MarketSeries {
    /// Validate shapes: one row per price, every row the same width,
    /// strictly positive prices.
    pub fn new(prices: Vec<f64>, features: Vec<Vec<f64>>) -> Result<Self> {
        if prices.len() < 2 {
            return Err(TradeloopError::InvalidMarketData(format!(
                "need at least 2 bars, got {}",
                prices.len()
            )));
        }
        if features.len() != prices.len() {
            return Err(TradeloopError::InvalidMarketData(format!(
                "{} feature rows for {} prices",
                features.len(),
                prices.len()
            )));
        }
        let feature_dim = features.first().map(Vec::len).unwrap_or(0);
        if let Some(row) = features.iter().position(|r| r.len() != feature_dim) {
            return Err(TradeloopError::InvalidMarketData(format!(
                "feature row {} has width {}, expected {}",
                row,
                features[row].len(),
                feature_dim
            )));
        }
        if let Some(i) = prices.iter().position(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(TradeloopError::InvalidMarketData(format!(
                "price at bar {} is not positive: {}",
                i, prices[i]
            )));
        }
        Ok(Self {
            prices,
            features,
            feature_dim,
        })
    }

    /// Series without market features
    pub fn from_prices(prices: Vec<f64>) -> Result<Self> {
        let features = vec![Vec::new(); prices.len()];
        Self::new(prices, features)
    }

    /// Series with trailing indicator features computed from the prices.
    /// Bars without enough history get zeros.
    pub fn with_indicators(prices: Vec<f64>) -> Result<Self> {
        let features = (0..prices.len())
            .map(|i| {
                let history = &prices[..=i];
                vec![
                    trailing_return(history, 1).unwrap_or(0.0),
                    trailing_return(history, 5).unwrap_or(0.0),
                    rsi(history, 14).map(|v| v / 100.0).unwrap_or(0.5),
                    realized_volatility(history, 10).unwrap_or(0.0),
                ]
            })
            .collect();
        Self::new(prices, features)
    }

    pub fn from_bars(bars: &[Bar]) -> Result<Self> {
        Self::with_indicators(bars.iter().map(Bar::close_f64).collect())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn price(&self, index: usize) -> Option<f64> {
        self.prices.get(index).copied()
    }

    pub fn features(&self, index: usize) -> Option<&[f64]> {
        self.features.get(index).map(Vec::as_slice)
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }
}

/// Market simulation configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Initial price
    pub initial_price: f64,
    /// Std dev of per-bar returns
    pub volatility: f64,
    /// Mean reversion strength (0 = random walk, 1 = strong reversion)
    pub mean_reversion: f64,
    /// Long-term mean price
    pub mean_price: f64,
    /// Drift per bar, in units of volatility (-1 to 1)
    pub trend: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_price: 100.0,
            volatility: 0.01,
            mean_reversion: 0.05,
            mean_price: 100.0,
            trend: 0.0,
        }
    }
}

/// Seeded price generator
pub struct SimulatedMarket {
    config: MarketConfig,
    rng: StdRng,
}

impl SimulatedMarket {
    pub fn new(config: MarketConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next price from the current one
    pub fn next_price(&mut self, price: f64) -> f64 {
        let random_return = sample_normal(&mut self.rng) * self.config.volatility;
        let reversion = if self.config.mean_price > 0.0 {
            self.config.mean_reversion * (self.config.mean_price - price) / self.config.mean_price
        } else {
            0.0
        };
        let drift = self.config.trend.clamp(-1.0, 1.0) * self.config.volatility;
        (price * (1.0 + random_return + reversion * self.config.volatility + drift)).max(0.01)
    }

    /// Generate `len` prices starting at the configured initial price
    pub fn generate_prices(&mut self, len: usize) -> Vec<f64> {
        let mut prices = Vec::with_capacity(len);
        let mut price = self.config.initial_price;
        for _ in 0..len {
            prices.push(price);
            price = self.next_price(price);
        }
        prices
    }

    /// Generate a series with indicator features
    pub fn generate_series(&mut self, len: usize) -> Result<MarketSeries> {
        MarketSeries::with_indicators(self.generate_prices(len))
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_shape_validation() {
        assert!(MarketSeries::new(vec![100.0], vec![vec![]]).is_err());
        assert!(MarketSeries::new(vec![100.0, 101.0], vec![vec![1.0]]).is_err());
        assert!(MarketSeries::new(vec![100.0, 101.0], vec![vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(MarketSeries::new(vec![100.0, 0.0], vec![vec![], vec![]]).is_err());

        let series = MarketSeries::new(vec![100.0, 101.0], vec![vec![0.1], vec![0.2]]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.feature_dim(), 1);
    }

    #[test]
    fn test_simulated_market_is_reproducible() {
        let a = SimulatedMarket::new(MarketConfig::default(), 7).generate_prices(50);
        let b = SimulatedMarket::new(MarketConfig::default(), 7).generate_prices(50);
        let c = SimulatedMarket::new(MarketConfig::default(), 8).generate_prices(50);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| *p > 0.0));
    }

    #[test]
    fn test_indicator_series_width() {
        let series = SimulatedMarket::new(MarketConfig::default(), 1)
            .generate_series(40)
            .unwrap();
        assert_eq!(series.feature_dim(), 4);
        assert!(series.features(39).unwrap().iter().all(|v| v.is_finite()));
    }
}
