//! Centralized calculations module
//!
//! Statistics and indicator math shared by the replay metrics, the feature
//! backfill and the regime classifier. All functions are total: degenerate
//! inputs return a neutral value or `None`, never panic.

use crate::domain::FeatureVector;

/// Features produced by [`indicator_features`]
pub const FEATURE_NAMES: [&str; 5] = ["close", "ret_1d", "ret_5d", "rsi_14", "vol_10d"];

/// Minimum closes needed for a full feature row
pub const MIN_HISTORY: usize = 15;

// =============================================================================
// Statistics
// =============================================================================

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 divisor), 0.0 below two samples
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// mean / sample std; 0.0 below two samples or for zero variance
pub fn sharpe_ratio(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let std = sample_std(values);
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    mean(values) / std
}

// =============================================================================
// Price Indicators
// =============================================================================

/// Simple returns between consecutive prices, skipping zero bases
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Return over the last `lookback` steps
pub fn trailing_return(prices: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || prices.len() <= lookback {
        return None;
    }
    let last = *prices.last()?;
    let base = prices[prices.len() - 1 - lookback];
    if base == 0.0 {
        return None;
    }
    Some((last - base) / base)
}

/// Std of the last `window` simple returns
pub fn realized_volatility(prices: &[f64], window: usize) -> Option<f64> {
    if window < 2 || prices.len() <= window {
        return None;
    }
    let returns = simple_returns(&prices[prices.len() - 1 - window..]);
    if returns.len() < 2 {
        return None;
    }
    Some(sample_std(&returns))
}

/// Relative strength index over `period` changes (simple averages)
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() <= period {
        return None;
    }
    let window = &prices[prices.len() - 1 - period..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in window.windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    if gains + losses == 0.0 {
        return Some(50.0);
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Indicator snapshot at the last close, `None` with too little history
pub fn indicator_features(closes: &[f64]) -> Option<FeatureVector> {
    if closes.len() < MIN_HISTORY {
        return None;
    }
    let close = *closes.last()?;
    let features = FeatureVector::from_pairs([
        ("close", close),
        ("ret_1d", trailing_return(closes, 1)?),
        ("ret_5d", trailing_return(closes, 5)?),
        ("rsi_14", rsi(closes, 14)?),
        ("vol_10d", realized_volatility(closes, 10)?),
    ]);
    features.is_finite().then_some(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_std_uses_n_minus_one() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let expected = (5.0f64 / 3.0).sqrt();
        assert!((sample_std(&values) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_degenerate_cases() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[0.4]), 0.0);
        assert_eq!(sharpe_ratio(&[0.2, 0.2, 0.2]), 0.0);
        assert!(sharpe_ratio(&[0.1, 0.3]) > 0.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, 14), Some(0.0));

        let flat = vec![50.0; 20];
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..10], 14), None);
    }

    #[test]
    fn test_trailing_return() {
        let prices = [100.0, 102.0, 105.0];
        assert!((trailing_return(&prices, 2).unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(trailing_return(&prices, 3), None);
        assert_eq!(trailing_return(&[0.0, 1.0], 1), None);
    }

    #[test]
    fn test_indicator_features_need_history() {
        let closes: Vec<f64> = (0..MIN_HISTORY).map(|i| 100.0 + (i % 3) as f64).collect();
        let features = indicator_features(&closes).unwrap();
        for name in FEATURE_NAMES {
            assert!(features.get(name).is_some(), "missing {name}");
        }
        assert!(indicator_features(&closes[..MIN_HISTORY - 1]).is_none());
    }
}
