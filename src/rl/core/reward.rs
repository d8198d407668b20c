//! Reward Attribution
//!
//! Turns a closed trade into a scalar reward plus the components it was
//! built from. Two attribution modes exist because trades are observed from
//! two vantage points:
//!
//! - **Execution**: a trade synthesized and filled inside a backtest
//! - **Live feedback**: a real or paper trade observed after it closed
//!
//! Every denominator is guarded; degenerate inputs yield a neutral 0
//! component instead of an error.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

// Re-export config
pub use crate::rl::config::RewardConfig;

/// Which formula produced a breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    #[default]
    Execution,
    LiveFeedback,
}

/// Reward components, stored next to the final scalar for auditability
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub mode: AttributionMode,
    /// Raw profit/loss
    pub base_pnl: f64,
    /// Drawdown-derived penalty
    pub risk_penalty: f64,
    /// Fee + size-dependent slippage estimate
    pub cost_penalty: f64,
    /// Exploration incentive
    pub info_bonus: f64,
    /// Gap between best price while holding and the exit (not in total)
    pub missed_profit: f64,
    pub holding_cost: f64,
    pub slippage_penalty: f64,
    pub capital_efficiency: f64,
    /// Final scalar reward
    pub total: f64,
}

impl RewardBreakdown {
    /// Breakdown carrying only a total, for rewards computed elsewhere
    pub fn from_total(mode: AttributionMode, total: f64) -> Self {
        Self {
            mode,
            base_pnl: total,
            total,
            ..Default::default()
        }
    }
}

/// Inputs for backtest attribution
#[derive(Debug, Clone, Copy)]
pub struct ExecutionInput {
    /// Direction-adjusted return on allocated capital
    pub pnl: f64,
    /// Max drawdown while holding, if known
    pub max_drawdown: Option<f64>,
    /// Position size as a fraction of capital
    pub size: f64,
    /// Novelty in [0, 1]
    pub novelty_score: Option<f64>,
}

/// Inputs for live/paper attribution
#[derive(Debug, Clone, Copy)]
pub struct LiveFeedbackInput {
    /// Realized profit/loss
    pub base_pnl: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Most favourable price seen while holding
    pub best_price: Option<f64>,
    /// Position quantity (magnitude)
    pub quantity: f64,
    pub direction: Direction,
    pub days_held: f64,
    pub slippage_penalty: f64,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Stateless reward attributor
#[derive(Debug, Clone, Default)]
pub struct RewardAttributor {
    config: RewardConfig,
}

impl RewardAttributor {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// `pnl - risk_penalty - cost_penalty + info_bonus`
    pub fn execution(&self, input: &ExecutionInput) -> RewardBreakdown {
        let cfg = &self.config.execution;

        let pnl = finite_or_zero(input.pnl);
        let drawdown = input.max_drawdown.map(finite_or_zero).unwrap_or(0.0).abs();
        let size = finite_or_zero(input.size).abs();
        let novelty = input
            .novelty_score
            .map(finite_or_zero)
            .unwrap_or(cfg.default_novelty)
            .clamp(0.0, 1.0);

        let risk_penalty = cfg.risk_penalty_weight * drawdown;
        let cost_penalty = cfg.base_cost + cfg.size_cost * size;
        let info_bonus = cfg.novelty_weight * novelty;

        RewardBreakdown {
            mode: AttributionMode::Execution,
            base_pnl: pnl,
            risk_penalty,
            cost_penalty,
            info_bonus,
            total: pnl - risk_penalty - cost_penalty + info_bonus,
            ..Default::default()
        }
    }

    /// `base_pnl + capital_efficiency - holding_cost - slippage_penalty`
    ///
    /// Missed profit is tracked but left out of the total.
    pub fn live_feedback(&self, input: &LiveFeedbackInput) -> RewardBreakdown {
        let cfg = &self.config.live;

        let base_pnl = finite_or_zero(input.base_pnl);
        let entry_price = finite_or_zero(input.entry_price);
        let days_held = finite_or_zero(input.days_held).max(0.0);
        let slippage_penalty = finite_or_zero(input.slippage_penalty);

        let holding_cost = cfg.holding_cost_per_day * days_held;
        let capital_efficiency = if entry_price > 0.0 && days_held > 0.0 {
            base_pnl / (entry_price * days_held)
        } else {
            0.0
        };

        let missed_profit = match input.best_price.map(finite_or_zero) {
            Some(best) if best > 0.0 => {
                let exit = finite_or_zero(input.exit_price);
                let gap = match input.direction {
                    Direction::Long => best - exit,
                    Direction::Short => exit - best,
                };
                (gap * finite_or_zero(input.quantity).abs()).max(0.0)
            }
            _ => 0.0,
        };

        RewardBreakdown {
            mode: AttributionMode::LiveFeedback,
            base_pnl,
            missed_profit,
            holding_cost,
            slippage_penalty,
            capital_efficiency,
            total: base_pnl + capital_efficiency - holding_cost - slippage_penalty,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(pnl: f64, dd: Option<f64>, size: f64, novelty: Option<f64>) -> RewardBreakdown {
        RewardAttributor::default().execution(&ExecutionInput {
            pnl,
            max_drawdown: dd,
            size,
            novelty_score: novelty,
        })
    }

    #[test]
    fn test_execution_formula_exact() {
        let cases = [
            (0.05, 0.03, 0.25, 0.8),
            (-0.02, 0.10, -0.5, 0.3),
            (0.0, 0.0, 1.0, 1.0),
        ];
        for (pnl, dd, size, novelty) in cases {
            let signal = execution(pnl, Some(dd), size, Some(novelty));
            let expected =
                pnl - 0.02 * dd - (0.003 + 0.001 * f64::abs(size)) + 0.01 * novelty;
            assert_eq!(signal.total, expected);
            assert_eq!(signal.mode, AttributionMode::Execution);
        }
    }

    #[test]
    fn test_execution_defaults() {
        // No drawdown, default novelty 0.5
        let signal = execution(0.01, None, 0.0, None);
        assert_eq!(signal.risk_penalty, 0.0);
        assert_eq!(signal.info_bonus, 0.01 * 0.5);
        assert_eq!(signal.total, 0.01 - 0.003 + 0.005);
    }

    #[test]
    fn test_execution_guards_non_finite() {
        let signal = execution(f64::NAN, Some(f64::INFINITY), 0.1, Some(f64::NAN));
        assert!(signal.total.is_finite());
        assert_eq!(signal.base_pnl, 0.0);
        assert_eq!(signal.risk_penalty, 0.0);
    }

    #[test]
    fn test_live_feedback_formula() {
        let attributor = RewardAttributor::default();
        let signal = attributor.live_feedback(&LiveFeedbackInput {
            base_pnl: 10.0,
            entry_price: 100.0,
            exit_price: 105.0,
            best_price: Some(108.0),
            quantity: 2.0,
            direction: Direction::Long,
            days_held: 2.0,
            slippage_penalty: 0.5,
        });

        assert_eq!(signal.holding_cost, 0.2);
        assert_eq!(signal.capital_efficiency, 10.0 / 200.0);
        assert_eq!(signal.missed_profit, 6.0);
        let expected = 10.0 + 0.05 - 0.2 - 0.5;
        assert!((signal.total - expected).abs() < 1e-12);
    }

    #[test]
    fn test_live_feedback_zero_days_and_price() {
        let attributor = RewardAttributor::default();
        let signal = attributor.live_feedback(&LiveFeedbackInput {
            base_pnl: 3.0,
            entry_price: 0.0,
            exit_price: 1.0,
            best_price: None,
            quantity: 1.0,
            direction: Direction::Short,
            days_held: 0.0,
            slippage_penalty: 0.0,
        });
        assert_eq!(signal.capital_efficiency, 0.0);
        assert_eq!(signal.holding_cost, 0.0);
        assert_eq!(signal.missed_profit, 0.0);
        assert_eq!(signal.total, 3.0);
    }

    #[test]
    fn test_missed_profit_short_never_negative() {
        let attributor = RewardAttributor::default();
        let signal = attributor.live_feedback(&LiveFeedbackInput {
            base_pnl: 1.0,
            entry_price: 50.0,
            exit_price: 45.0,
            best_price: Some(47.0),
            quantity: 1.0,
            direction: Direction::Short,
            days_held: 1.0,
            slippage_penalty: 0.0,
        });
        assert_eq!(signal.missed_profit, 0.0);
    }
}
