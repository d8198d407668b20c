use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Exploration phase of the learning loop.
///
/// Ordering follows the numeric value so `>=` comparisons express
/// "at least this mature".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Phase {
    /// Random trades only
    #[default]
    Synthetic = 0,
    /// Epsilon mix of random and rule-based trades
    Guided = 1,
    /// Trained policy only
    Autonomous = 2,
}

impl Phase {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Synthetic),
            1 => Some(Self::Guided),
            2 => Some(Self::Autonomous),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Source tag recorded with outcomes generated in this phase
    pub fn source_label(self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Guided => "guided",
            Self::Autonomous => "autonomous",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source_label())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synthetic" | "0" => Ok(Self::Synthetic),
            "guided" | "1" => Ok(Self::Guided),
            "autonomous" | "2" => Ok(Self::Autonomous),
            other => Err(format!("unknown phase: {}", other)),
        }
    }
}

/// Coarse volatility classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
}

impl VolatilityRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::Low => "low",
            VolatilityRegime::Medium => "medium",
            VolatilityRegime::High => "high",
        }
    }
}

impl std::fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VolatilityRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "mid" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown volatility regime: {}", other)),
        }
    }
}

/// How a trade proposal was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationType {
    Random,
    RuleBased,
    Model,
}

impl ExplorationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplorationType::Random => "random",
            ExplorationType::RuleBased => "rule_based",
            ExplorationType::Model => "model",
        }
    }
}

impl std::fmt::Display for ExplorationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExplorationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "rule_based" => Ok(Self::RuleBased),
            "model" => Ok(Self::Model),
            other => Err(format!("unknown exploration type: {}", other)),
        }
    }
}
