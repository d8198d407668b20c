//! Trading Environment for RL Training
//!
//! Single-position simulator over a `MarketSeries` with a gym-like
//! reset/step interface. Cash is tracked as a fraction of starting capital
//! and every open position is all-in.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::market::MarketSeries;
use super::{Environment, StepResult};
use crate::domain::Direction;
use crate::error::{Result, TradeloopError};
use crate::rl::core::{
    ensure_finite, DiscreteAction, Observation, NUM_DISCRETE_ACTIONS, POSITION_FEATURES,
};
use crate::strategy::calculations::sharpe_ratio;

/// How the per-step reward is emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RewardMode {
    /// `net - drawdown_penalty_weight * running_max_drawdown`
    #[default]
    Shaped,
    /// Mean / std of the last `window` net rewards
    RiskAdjusted { window: usize },
}

/// Trading environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingEnvConfig {
    /// Starting cash (fraction of capital)
    pub initial_cash: f64,
    /// Fee charged on notional at open and at close
    pub fee: f64,
    /// Whether Sell from flat opens a short
    pub allow_short: bool,
    /// Positions are force-closed once held this many steps
    pub max_holding_days: u32,
    /// Episode length cap, `None` to run to the end of the series
    pub max_steps: Option<usize>,
    /// Weight on the running max drawdown in the shaped reward
    pub drawdown_penalty_weight: f64,
    pub reward_mode: RewardMode,
}

impl Default for TradingEnvConfig {
    fn default() -> Self {
        Self {
            initial_cash: 1.0,
            fee: 0.001,
            allow_short: true,
            max_holding_days: 20,
            max_steps: None,
            drawdown_penalty_weight: 0.1,
            reward_mode: RewardMode::Shaped,
        }
    }
}

impl TradingEnvConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(TradeloopError::InvalidConfig(format!(
                "initial cash must be positive, got {}",
                self.initial_cash
            )));
        }
        if !(0.0..1.0).contains(&self.fee) {
            return Err(TradeloopError::InvalidConfig(format!(
                "fee {} outside [0, 1)",
                self.fee
            )));
        }
        if self.max_holding_days == 0 {
            return Err(TradeloopError::InvalidConfig(
                "max holding days must be positive".to_string(),
            ));
        }
        if let RewardMode::RiskAdjusted { window } = self.reward_mode {
            if window < 2 {
                return Err(TradeloopError::InvalidConfig(format!(
                    "risk-adjusted window must be at least 2, got {}",
                    window
                )));
            }
        }
        Ok(())
    }
}

/// Open position
#[derive(Debug, Clone)]
struct Position {
    direction: Direction,
    entry_price: f64,
    /// Cash committed at open, before the fee
    entry_cash: f64,
    /// Most favourable price seen
    peak: f64,
    holding_days: u32,
    drawdown: f64,
    max_drawdown: f64,
}

impl Position {
    fn open(direction: Direction, price: f64, entry_cash: f64) -> Self {
        Self {
            direction,
            entry_price: price,
            entry_cash,
            peak: price,
            holding_days: 0,
            drawdown: 0.0,
            max_drawdown: 0.0,
        }
    }

    fn unrealized_return(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) / self.entry_price
    }

    /// Net return after both fees
    fn net_return(&self, exit_price: f64, fee: f64) -> f64 {
        self.unrealized_return(exit_price) - 2.0 * fee
    }

    fn mark(&mut self, price: f64) {
        self.drawdown = match self.direction {
            Direction::Long => {
                self.peak = self.peak.max(price);
                (self.peak - price) / self.peak
            }
            Direction::Short => {
                self.peak = self.peak.min(price);
                (price - self.peak) / self.peak
            }
        };
        self.max_drawdown = self.max_drawdown.max(self.drawdown);
    }
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Bar index after the step
    pub index: usize,
    pub price: f64,
    pub cash: f64,
    /// +1 long, -1 short, 0 flat
    pub position: i8,
    /// Net return realized this step (0 when nothing closed)
    pub net_reward: f64,
    /// Running max drawdown the reward was penalized with
    pub max_drawdown: f64,
    pub holding_days: u32,
    /// Whether a position closed this step
    pub closed: bool,
    /// Number of closed trades this episode
    pub num_trades: usize,
}

/// Outcome of closing a position
struct Close {
    net: f64,
    max_drawdown: f64,
}

/// Trading environment for RL training
pub struct TradingEnvironment {
    config: TradingEnvConfig,
    series: MarketSeries,
    index: usize,
    step_count: usize,
    cash: f64,
    position: Option<Position>,
    net_history: VecDeque<f64>,
    num_trades: usize,
    winning_trades: usize,
    done: bool,
}

impl TradingEnvironment {
    pub fn new(config: TradingEnvConfig, series: MarketSeries) -> Result<Self> {
        config.validate()?;
        let cash = config.initial_cash;
        Ok(Self {
            config,
            series,
            index: 0,
            step_count: 0,
            cash,
            position: None,
            net_history: VecDeque::new(),
            num_trades: 0,
            winning_trades: 0,
            done: false,
        })
    }

    /// Swap the price series; the next `reset` starts on it
    pub fn load_series(&mut self, series: MarketSeries) {
        self.series = series;
        self.done = true;
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn num_trades(&self) -> usize {
        self.num_trades
    }

    pub fn win_rate(&self) -> f64 {
        if self.num_trades > 0 {
            self.winning_trades as f64 / self.num_trades as f64
        } else {
            0.0
        }
    }

    /// Position direction, if any
    pub fn position(&self) -> Option<Direction> {
        self.position.as_ref().map(|p| p.direction)
    }

    fn price(&self) -> Result<f64> {
        self.series.price(self.index).ok_or_else(|| {
            TradeloopError::InvalidState(format!("bar index {} out of range", self.index))
        })
    }

    fn open(&mut self, direction: Direction, price: f64) {
        let entry_cash = self.cash;
        self.cash = entry_cash * (1.0 - self.config.fee);
        self.position = Some(Position::open(direction, price, entry_cash));
        debug!(index = self.index, %direction, price, "position opened");
    }

    fn close(&mut self, price: f64) -> Option<Close> {
        let position = self.position.take()?;
        let net = position.net_return(price, self.config.fee);
        self.cash = position.entry_cash * (1.0 + net);
        self.num_trades += 1;
        if net > 0.0 {
            self.winning_trades += 1;
        }
        debug!(
            index = self.index,
            direction = %position.direction,
            entry = position.entry_price,
            exit = price,
            net,
            "position closed"
        );
        Some(Close {
            net,
            max_drawdown: position.max_drawdown,
        })
    }

    /// Apply the agent's action at the current bar
    fn apply(&mut self, action: DiscreteAction, price: f64) -> Option<Close> {
        match (action, self.position.as_ref().map(|p| p.direction)) {
            (DiscreteAction::Hold, _) => None,
            (DiscreteAction::Buy, None) => {
                self.open(Direction::Long, price);
                None
            }
            (DiscreteAction::Sell, None) => {
                if self.config.allow_short {
                    self.open(Direction::Short, price);
                }
                None
            }
            (DiscreteAction::Sell, Some(Direction::Long))
            | (DiscreteAction::Buy, Some(Direction::Short)) => self.close(price),
            // Adding to an open position is a no-op
            (DiscreteAction::Buy, Some(Direction::Long))
            | (DiscreteAction::Sell, Some(Direction::Short)) => None,
        }
    }

    fn emit_reward(&mut self, net: f64, max_drawdown: f64) -> f64 {
        match self.config.reward_mode {
            RewardMode::Shaped => net - self.config.drawdown_penalty_weight * max_drawdown,
            RewardMode::RiskAdjusted { window } => {
                self.net_history.push_back(net);
                while self.net_history.len() > window {
                    self.net_history.pop_front();
                }
                let values: Vec<f64> = self.net_history.iter().copied().collect();
                sharpe_ratio(&values)
            }
        }
    }

    fn observe(&self) -> Result<Observation> {
        let price = self.price()?;
        let features = self.series.features(self.index).unwrap_or(&[]);
        let mut obs = Vec::with_capacity(features.len() + POSITION_FEATURES);
        obs.extend_from_slice(features);

        match &self.position {
            Some(p) => {
                obs.push(p.direction.sign());
                obs.push(p.unrealized_return(price));
                obs.push(p.drawdown);
                obs.push(p.holding_days as f64 / self.config.max_holding_days as f64);
            }
            None => obs.extend_from_slice(&[0.0, 0.0, 0.0, 0.0]),
        }
        obs.push(self.cash);

        ensure_finite(&obs, self.step_count)?;
        Ok(obs)
    }

    fn info(&self, net: f64, max_drawdown: f64, closed: bool) -> StepInfo {
        StepInfo {
            index: self.index,
            price: self.series.price(self.index).unwrap_or(0.0),
            cash: self.cash,
            position: self
                .position
                .as_ref()
                .map(|p| p.direction.sign() as i8)
                .unwrap_or(0),
            net_reward: net,
            max_drawdown,
            holding_days: self.position.as_ref().map(|p| p.holding_days).unwrap_or(0),
            closed,
            num_trades: self.num_trades,
        }
    }
}

impl Environment for TradingEnvironment {
    fn observation_dim(&self) -> usize {
        self.series.feature_dim() + POSITION_FEATURES
    }

    fn action_dim(&self) -> usize {
        NUM_DISCRETE_ACTIONS
    }

    fn reset(&mut self) -> Result<Observation> {
        self.index = 0;
        self.step_count = 0;
        self.cash = self.config.initial_cash;
        self.position = None;
        self.net_history.clear();
        self.num_trades = 0;
        self.winning_trades = 0;
        self.done = false;
        self.observe()
    }

    fn step(&mut self, action: DiscreteAction) -> Result<StepResult> {
        if self.done {
            return Err(TradeloopError::InvalidState(
                "step called on a finished episode; call reset first".to_string(),
            ));
        }

        let price = self.price()?;
        let mut closed = self.apply(action, price);

        self.index += 1;
        self.step_count += 1;
        let price = self.price()?;

        let mut truncated = false;
        if let Some(position) = self.position.as_mut() {
            position.holding_days += 1;
            position.mark(price);
            if position.holding_days >= self.config.max_holding_days {
                truncated = true;
                closed = self.close(price);
            }
        }

        let horizon_reached = self.index + 1 >= self.series.len();
        let step_limit = self
            .config
            .max_steps
            .map(|max| self.step_count >= max)
            .unwrap_or(false);
        let done = horizon_reached || step_limit;
        if done {
            if let Some(forced) = self.close(price) {
                closed = Some(forced);
            }
            self.done = true;
        }

        let (net, max_drawdown) = match &closed {
            Some(c) => (c.net, c.max_drawdown),
            None => (
                0.0,
                self.position.as_ref().map(|p| p.max_drawdown).unwrap_or(0.0),
            ),
        };
        let reward = self.emit_reward(net, max_drawdown);
        let observation = self.observe()?;

        Ok(StepResult {
            observation,
            reward,
            done,
            truncated,
            info: self.info(net, max_drawdown, closed.is_some()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(prices: Vec<f64>, config: TradingEnvConfig) -> TradingEnvironment {
        TradingEnvironment::new(config, MarketSeries::from_prices(prices).unwrap()).unwrap()
    }

    #[test]
    fn test_env_dims() {
        let series =
            MarketSeries::new(vec![1.0, 2.0], vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        let env = TradingEnvironment::new(TradingEnvConfig::default(), series).unwrap();
        assert_eq!(env.observation_dim(), 2 + POSITION_FEATURES);
        assert_eq!(env.action_dim(), 3);
    }

    #[test]
    fn test_buy_then_sell_net_reward() {
        let mut env = env(vec![100.0, 105.0, 105.0, 105.0], TradingEnvConfig::default());
        let obs = env.reset().unwrap();
        assert_eq!(obs, vec![0.0, 0.0, 0.0, 0.0, 1.0]);

        let opened = env.step(DiscreteAction::Buy).unwrap();
        assert_eq!(opened.info.position, 1);
        assert!((env.cash() - 0.999).abs() < 1e-12);

        let closed = env.step(DiscreteAction::Sell).unwrap();
        assert!(closed.info.closed);
        assert!((closed.info.net_reward - 0.048).abs() < 1e-9);
        assert!((closed.reward - 0.048).abs() < 1e-9);
        assert!((env.cash() - 1.048).abs() < 1e-9);
        assert_eq!(env.num_trades(), 1);
        assert_eq!(env.win_rate(), 1.0);
    }

    #[test]
    fn test_short_disabled_sell_is_noop() {
        let config = TradingEnvConfig {
            allow_short: false,
            ..Default::default()
        };
        let mut env = env(vec![100.0, 99.0, 98.0], config);
        env.reset().unwrap();
        let result = env.step(DiscreteAction::Sell).unwrap();
        assert_eq!(result.info.position, 0);
        assert_eq!(env.cash(), 1.0);
    }

    #[test]
    fn test_short_profits_on_decline() {
        let mut env = env(vec![100.0, 90.0, 90.0, 90.0], TradingEnvConfig::default());
        env.reset().unwrap();
        env.step(DiscreteAction::Sell).unwrap();
        let closed = env.step(DiscreteAction::Buy).unwrap();
        assert!((closed.info.net_reward - (0.10 - 0.002)).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_penalty_applied() {
        let config = TradingEnvConfig {
            drawdown_penalty_weight: 0.5,
            ..Default::default()
        };
        // Peak 110, trough 99 -> max drawdown 0.1
        let mut env = env(vec![100.0, 110.0, 99.0, 104.5, 104.5, 104.5], config);
        env.reset().unwrap();
        env.step(DiscreteAction::Buy).unwrap();
        env.step(DiscreteAction::Hold).unwrap();
        let holding = env.step(DiscreteAction::Hold).unwrap();
        assert!((holding.info.max_drawdown - 0.1).abs() < 1e-9);
        assert!((holding.reward + 0.05).abs() < 1e-9);

        let closed = env.step(DiscreteAction::Sell).unwrap();
        let expected_net = 0.045 - 0.002;
        assert!((closed.info.net_reward - expected_net).abs() < 1e-9);
        assert!((closed.reward - (expected_net - 0.05)).abs() < 1e-9);

        // Flat again: drawdown resets
        let flat = env.step(DiscreteAction::Hold).unwrap();
        assert_eq!(flat.info.max_drawdown, 0.0);
    }

    #[test]
    fn test_max_holding_truncates() {
        let config = TradingEnvConfig {
            max_holding_days: 2,
            ..Default::default()
        };
        let mut env = env(vec![100.0, 101.0, 102.0, 103.0, 104.0], config);
        env.reset().unwrap();
        let first = env.step(DiscreteAction::Buy).unwrap();
        assert!(!first.truncated);
        let second = env.step(DiscreteAction::Hold).unwrap();
        assert!(second.truncated);
        assert!(!second.done);
        assert!(second.info.closed);
        assert_eq!(second.info.position, 0);
        assert!((second.info.net_reward - (0.02 - 0.002)).abs() < 1e-9);
    }

    #[test]
    fn test_done_at_horizon_force_closes() {
        let mut env = env(vec![100.0, 102.0, 104.0], TradingEnvConfig::default());
        env.reset().unwrap();
        assert!(!env.step(DiscreteAction::Buy).unwrap().done);
        let last = env.step(DiscreteAction::Hold).unwrap();
        assert!(last.done);
        assert!(last.info.closed);
        assert!((last.info.net_reward - 0.038).abs() < 1e-9);
        assert!(env.step(DiscreteAction::Hold).is_err());

        env.reset().unwrap();
        assert_eq!(env.cash(), 1.0);
    }

    #[test]
    fn test_max_steps() {
        let config = TradingEnvConfig {
            max_steps: Some(2),
            ..Default::default()
        };
        let mut env = env(vec![100.0; 10], config);
        env.reset().unwrap();
        assert!(!env.step(DiscreteAction::Hold).unwrap().done);
        assert!(env.step(DiscreteAction::Hold).unwrap().done);
    }

    #[test]
    fn test_risk_adjusted_mode() {
        let config = TradingEnvConfig {
            reward_mode: RewardMode::RiskAdjusted { window: 10 },
            ..Default::default()
        };
        let mut env = env(vec![100.0, 100.0, 100.0, 105.0, 105.0, 105.0], config);
        env.reset().unwrap();
        // One sample: neutral
        assert_eq!(env.step(DiscreteAction::Hold).unwrap().reward, 0.0);
        // Two zero samples: zero std
        assert_eq!(env.step(DiscreteAction::Hold).unwrap().reward, 0.0);
        env.step(DiscreteAction::Buy).unwrap();
        let closed = env.step(DiscreteAction::Sell).unwrap();
        assert!(closed.reward.is_finite());
        assert!(closed.reward > 0.0);
    }

    #[test]
    fn test_non_finite_features_are_fatal() {
        let series =
            MarketSeries::new(vec![100.0, 101.0], vec![vec![f64::NAN], vec![0.0]]).unwrap();
        let mut env = TradingEnvironment::new(TradingEnvConfig::default(), series).unwrap();
        let err = env.reset().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let series = MarketSeries::from_prices(vec![1.0, 2.0]).unwrap();
        let config = TradingEnvConfig {
            reward_mode: RewardMode::RiskAdjusted { window: 1 },
            ..Default::default()
        };
        assert!(TradingEnvironment::new(config, series).is_err());
    }
}
