pub(crate) mod env_demo;
pub(crate) mod phase;
pub(crate) mod simulate;

use std::sync::Arc;

use rand::rngs::StdRng;
use tradeloop::config::AppConfig;
use tradeloop::error::Result;
use tradeloop::persistence::{MemoryTransitionStore, TransitionStore};
use tradeloop::rl::{ConvergenceRule, PhaseCheckpointer, PhaseController, ReplayBuffer};
use tradeloop::strategy::{seeded_rng, GeneratorSet};

/// Replay buffer over the given store with the configured convergence rule
pub(crate) fn build_buffer(
    config: &AppConfig,
    store: Arc<dyn TransitionStore>,
) -> Arc<ReplayBuffer> {
    Arc::new(ReplayBuffer::new(
        &config.replay,
        ConvergenceRule::from(&config.phase),
        store,
    ))
}

/// Phase controller resumed from its checkpoint when one exists
pub(crate) fn build_controller(
    config: &AppConfig,
    buffer: Arc<ReplayBuffer>,
    checkpoint: Option<&str>,
) -> Result<PhaseController> {
    let generators = GeneratorSet::from_config(&config.generator, component_rng(config, 1))?;
    let rng: StdRng = match config.phase.seed {
        Some(seed) => seeded_rng(Some(seed)),
        None => component_rng(config, 2),
    };
    let mut controller = PhaseController::new(config.phase.clone(), buffer, generators, rng);

    let path = checkpoint.or(config.phase.checkpoint_path.as_deref());
    if let Some(path) = path {
        let checkpointer = PhaseCheckpointer::new(path);
        if let Some(state) = checkpointer.load()? {
            controller.restore(&state)?;
        }
        controller = controller.with_checkpointer(checkpointer);
    }
    Ok(controller)
}

pub(crate) fn component_rng(config: &AppConfig, offset: u64) -> StdRng {
    seeded_rng(config.simulation.component_seed(offset))
}

pub(crate) fn memory_store() -> Arc<dyn TransitionStore> {
    Arc::new(MemoryTransitionStore::new())
}
