//! State Representation
//!
//! Observation vectors handed to learners. Every vector leaving the
//! environment is checked for non-finite components.

use crate::error::{Result, TradeloopError};

/// Position features appended to the market features:
/// position sign, unrealized return, drawdown, holding fraction, cash.
pub const POSITION_FEATURES: usize = 5;

/// Flat observation vector
pub type Observation = Vec<f64>;

/// Fail on the first NaN or infinity.
pub fn ensure_finite(observation: &[f64], step: usize) -> Result<()> {
    match observation.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(TradeloopError::NonFiniteObservation { step, index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_passes() {
        assert!(ensure_finite(&[0.0, 1.5, -2.0], 0).is_ok());
    }

    #[test]
    fn test_nan_reports_index() {
        let err = ensure_finite(&[0.0, f64::NAN, f64::INFINITY], 7).unwrap_err();
        match err {
            TradeloopError::NonFiniteObservation { step, index } => {
                assert_eq!(step, 7);
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
