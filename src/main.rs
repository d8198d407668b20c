use clap::Parser;
use tradeloop::cli::{Cli, Commands};
use tradeloop::config::AppConfig;
use tradeloop::error::{Result, TradeloopError};

mod main_commands;
mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    match &cli.command {
        Commands::Simulate {
            start,
            end,
            symbols,
            seed,
            hydrate,
            json,
            events,
        } => {
            if let Some(symbols) = symbols {
                config.universe.symbols = symbols.clone();
            }
            if seed.is_some() {
                config.simulation.seed = *seed;
            }
            validate_config(&config)?;
            init_logging(&config.logging);
            let options = main_commands::simulate::SimulateOptions {
                start: *start,
                end: *end,
                hydrate: *hydrate,
                json: *json,
                events: events.clone(),
            };
            main_commands::simulate::run_simulate(config, options).await?;
        }
        Commands::EnvDemo {
            episodes,
            steps,
            volatility,
            seed,
            verbose,
        } => {
            validate_config(&config)?;
            init_logging_simple();
            main_commands::env_demo::run_env_demo(
                &config,
                *episodes,
                *steps,
                *volatility,
                *seed,
                *verbose,
            )?;
        }
        Commands::Phase(cmd) => {
            validate_config(&config)?;
            init_logging_simple();
            main_commands::phase::run_phase_command(&config, cmd)?;
        }
    }

    Ok(())
}

fn validate_config(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        for e in &errors {
            eprintln!("config: {e}");
        }
        TradeloopError::InvalidConfig(errors.join("; "))
    })
}
