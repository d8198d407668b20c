//! Phase Controller
//!
//! Moves the loop from random exploration (Synthetic) through an epsilon mix
//! of random and rule-based trades (Guided) to a trained policy
//! (Autonomous). `update_phase` is called once per simulated day, after the
//! day's outcomes are in the replay buffer.
//!
//! The controller is single-writer: `update_phase` takes `&mut self`, and
//! other tasks observe it through the `PhaseState` watch channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::checkpointing::PhaseCheckpointer;
use crate::domain::{Phase, Trade};
use crate::error::{Result, TradeloopError};
use crate::rl::config::PhaseConfig;
use crate::rl::memory::ReplayBuffer;
use crate::strategy::generators::{Candidate, GenerationContext, GeneratorSet};

/// Snapshot of the controller, published after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    pub phase: Phase,
    pub epsilon: f64,
    /// `update_phase` calls since construction or the last reset
    pub ticks: u64,
    pub updated_at: DateTime<Utc>,
}

impl PhaseState {
    pub fn source_label(&self) -> &'static str {
        self.phase.source_label()
    }
}

pub struct PhaseController {
    config: PhaseConfig,
    phase: Phase,
    epsilon: f64,
    ticks: u64,
    buffer: Arc<ReplayBuffer>,
    generators: GeneratorSet,
    /// Per-symbol epsilon draw in Guided
    rng: StdRng,
    state_tx: watch::Sender<PhaseState>,
    checkpointer: Option<PhaseCheckpointer>,
}

impl PhaseController {
    pub fn new(
        config: PhaseConfig,
        buffer: Arc<ReplayBuffer>,
        generators: GeneratorSet,
        rng: StdRng,
    ) -> Self {
        let phase = config.initial_phase;
        let epsilon = config.epsilon_start;
        let (state_tx, _) = watch::channel(PhaseState {
            phase,
            epsilon,
            ticks: 0,
            updated_at: Utc::now(),
        });

        info!(%phase, epsilon, "phase controller initialized");
        Self {
            config,
            phase,
            epsilon,
            ticks: 0,
            buffer,
            generators,
            rng,
            state_tx,
            checkpointer: None,
        }
    }

    /// Write a checkpoint after every update and reset
    pub fn with_checkpointer(mut self, checkpointer: PhaseCheckpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<ReplayBuffer> {
        &self.buffer
    }

    pub fn state(&self) -> PhaseState {
        self.state_tx.borrow().clone()
    }

    /// Receiver that always holds the latest `PhaseState`
    pub fn subscribe(&self) -> watch::Receiver<PhaseState> {
        self.state_tx.subscribe()
    }

    /// Tag recorded as `source` on outcomes generated in the current phase
    pub fn source_label(&self) -> &'static str {
        self.phase.source_label()
    }

    /// Re-evaluate buffer statistics, apply at most one transition, then
    /// decay epsilon. Returns the phase after the update.
    pub async fn update_phase(&mut self) -> Result<Phase> {
        let next = match self.phase {
            Phase::Synthetic => {
                let real = self.buffer.count_real_trades().await;
                debug!(real, threshold = self.config.real_trade_threshold, "real trade count");
                if real > self.config.real_trade_threshold {
                    Phase::Guided
                } else {
                    Phase::Synthetic
                }
            }
            Phase::Guided => {
                if self.buffer.policy_converged().await {
                    Phase::Autonomous
                } else {
                    Phase::Guided
                }
            }
            Phase::Autonomous => Phase::Autonomous,
        };
        self.transition_to(next)?;

        self.epsilon = (self.epsilon - self.config.epsilon_decay).max(self.config.epsilon_floor);
        self.ticks += 1;
        self.publish()?;
        Ok(self.phase)
    }

    fn transition_to(&mut self, next: Phase) -> Result<()> {
        if next < self.phase {
            return Err(TradeloopError::PhaseRegression {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        if next != self.phase {
            info!(from = %self.phase, to = %next, epsilon = self.epsilon, "phase transition");
            self.phase = next;
        }
        Ok(())
    }

    /// Operator reset. May move backwards; epsilon returns to its start.
    pub fn reset_phase(&mut self, phase: Phase) -> Result<()> {
        warn!(from = %self.phase, to = %phase, "operator phase reset");
        self.phase = phase;
        self.epsilon = self.config.epsilon_start;
        self.ticks = 0;
        self.publish()
    }

    /// Resume from a saved state. Epsilon is clamped into the configured
    /// range.
    pub fn restore(&mut self, state: &PhaseState) -> Result<()> {
        self.phase = state.phase;
        self.epsilon = state
            .epsilon
            .clamp(self.config.epsilon_floor, self.config.epsilon_start);
        self.ticks = state.ticks;
        info!(phase = %self.phase, epsilon = self.epsilon, ticks = self.ticks, "phase restored");
        self.publish()
    }

    fn publish(&mut self) -> Result<()> {
        let state = PhaseState {
            phase: self.phase,
            epsilon: self.epsilon,
            ticks: self.ticks,
            updated_at: Utc::now(),
        };
        if let Some(checkpointer) = &self.checkpointer {
            checkpointer.save(&state)?;
        }
        self.state_tx.send_replace(state);
        Ok(())
    }

    /// Proposals for the day from the generator the phase selects
    pub fn generate(&mut self, candidates: &[Candidate], ctx: &GenerationContext) -> Vec<Trade> {
        let trades = match self.phase {
            Phase::Synthetic => self.generators.random.generate(candidates, ctx),
            Phase::Guided => {
                let mut trades = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let explore = self.rng.gen::<f64>() < self.epsilon;
                    let generator = if explore {
                        &mut self.generators.random
                    } else {
                        &mut self.generators.rule_based
                    };
                    if let Some(trade) = generator.propose(candidate, ctx) {
                        trades.push(trade);
                    }
                }
                trades
            }
            Phase::Autonomous => self.generators.model.generate(candidates, ctx),
        };

        debug!(
            phase = %self.phase,
            candidates = candidates.len(),
            trades = trades.len(),
            "trades generated"
        );
        trades
    }
}
