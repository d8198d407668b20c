//! Action Space
//!
//! Discrete actions understood by the trading environment.

use serde::{Deserialize, Serialize};

/// Number of discrete actions
pub const NUM_DISCRETE_ACTIONS: usize = 3;

/// Discrete action space
///
/// `Buy` opens a long or covers a short; `Sell` closes a long or opens a
/// short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiscreteAction {
    /// Do nothing, maintain current state
    #[default]
    Hold = 0,
    /// Open long / cover short
    Buy = 1,
    /// Close long / open short
    Sell = 2,
}

impl DiscreteAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions
    pub fn all() -> &'static [DiscreteAction] {
        &[Self::Hold, Self::Buy, Self::Sell]
    }
}

impl From<usize> for DiscreteAction {
    fn from(action: usize) -> Self {
        Self::from_index(action).unwrap_or_default()
    }
}
