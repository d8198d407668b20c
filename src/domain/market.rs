use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Bar interval tag stored on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Day1 => "1d",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "minute" => Ok(Interval::Minute1),
            "1d" | "day" | "daily" => Ok(Interval::Day1),
            other => Err(format!("unknown interval: {}", other)),
        }
    }
}

/// OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    /// Whether the bar traded at or through `price`
    pub fn touches(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Named feature snapshot for one symbol at one point in time.
///
/// Keys are kept sorted so the derived state vector has a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Values in key order
    pub fn to_state(&self) -> Vec<f64> {
        self.0.values().copied().collect()
    }

    pub fn is_finite(&self) -> bool {
        self.0.values().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_vector_is_key_ordered() {
        let features =
            FeatureVector::from_pairs([("rsi_14", 42.0), ("close", 101.5), ("vol_10", 0.2)]);
        assert_eq!(features.to_state(), vec![101.5, 42.0, 0.2]);
        assert_eq!(features.names().collect::<Vec<_>>(), vec!["close", "rsi_14", "vol_10"]);
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::Day1);
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::Minute1);
        assert!("4h".parse::<Interval>().is_err());
        assert_eq!(serde_json::to_string(&Interval::Day1).unwrap(), "\"1d\"");
    }

    #[test]
    fn test_non_finite_detected() {
        let mut features = FeatureVector::new();
        features.insert("close", 100.0);
        assert!(features.is_finite());
        features.insert("ret_1d", f64::NAN);
        assert!(!features.is_finite());
    }
}
