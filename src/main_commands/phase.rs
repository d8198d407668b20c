use tradeloop::cli::PhaseCommands;
use tradeloop::config::AppConfig;
use tradeloop::error::{Result, TradeloopError};
use tradeloop::rl::PhaseCheckpointer;

use super::{build_buffer, build_controller, memory_store};

pub(crate) fn run_phase_command(config: &AppConfig, cmd: &PhaseCommands) -> Result<()> {
    match cmd {
        PhaseCommands::Show { checkpoint } => {
            let checkpointer = PhaseCheckpointer::new(checkpoint_path(config, checkpoint)?);
            match checkpointer.load()? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("No checkpoint at {}", checkpointer.path().display()),
            }
        }
        PhaseCommands::Reset { phase, checkpoint } => {
            let path = checkpoint_path(config, checkpoint)?;
            let buffer = build_buffer(config, memory_store());
            let mut controller = build_controller(config, buffer, Some(path.as_str()))?;
            let previous = controller.phase();
            controller.reset_phase(*phase)?;
            println!(
                "Phase reset: {} -> {} (epsilon {:.2}), saved to {}",
                previous,
                controller.phase(),
                controller.epsilon(),
                path
            );
        }
    }
    Ok(())
}

fn checkpoint_path(config: &AppConfig, explicit: &Option<String>) -> Result<String> {
    explicit
        .clone()
        .or_else(|| config.phase.checkpoint_path.clone())
        .ok_or_else(|| {
            TradeloopError::InvalidConfig(
                "no checkpoint path: pass --checkpoint or set phase.checkpoint_path".to_string(),
            )
        })
}
