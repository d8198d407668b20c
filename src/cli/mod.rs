//! tradeloop CLI
//!
//! Commands:
//! - `tradeloop simulate` - run the learning loop over a date range
//! - `tradeloop env-demo` - roll a random policy through the trading environment
//! - `tradeloop phase` - inspect or reset the phase checkpoint

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::domain::Phase;

/// Adaptive trading learning loop
#[derive(Parser, Debug)]
#[command(name = "tradeloop")]
#[command(author, version, about = "Adaptive learning loop for RL-driven trading")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus per-environment overrides)
    #[arg(short, long, global = true, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the learning loop against synthetic market data
    Simulate {
        /// First simulated day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last simulated day, inclusive
        #[arg(long)]
        end: NaiveDate,
        /// Comma-separated symbols, overriding the configured universe
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
        /// Base seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Load the replay buffer from the store before the first day
        #[arg(long)]
        hydrate: bool,
        /// Print a JSON report per day
        #[arg(long)]
        json: bool,
        /// JSON-lines file of TRADE_OPEN / M2M_PNL / TRADE_CLOSE events to feed
        /// the feedback collector before the first day
        #[arg(long)]
        events: Option<String>,
    },

    /// Roll a uniformly random policy through the trading environment
    EnvDemo {
        /// Episodes to run
        #[arg(short, long, default_value = "5")]
        episodes: usize,
        /// Bars per episode
        #[arg(short, long, default_value = "250")]
        steps: usize,
        /// Daily volatility of the simulated market
        #[arg(long, default_value = "0.02")]
        volatility: f64,
        #[arg(long)]
        seed: Option<u64>,
        /// Print every step
        #[arg(short, long)]
        verbose: bool,
    },

    /// Phase checkpoint operations
    #[command(subcommand)]
    Phase(PhaseCommands),
}

#[derive(Subcommand, Debug)]
pub enum PhaseCommands {
    /// Show the saved phase state
    Show {
        /// Checkpoint file, defaults to phase.checkpoint_path
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// Operator reset: set the phase and restore epsilon to its start value
    Reset {
        /// synthetic, guided or autonomous (or 0, 1, 2)
        #[arg(value_parser = parse_phase)]
        phase: Phase,
        #[arg(long)]
        checkpoint: Option<String>,
    },
}

fn parse_phase(raw: &str) -> std::result::Result<Phase, String> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "tradeloop",
            "simulate",
            "--start",
            "2024-01-02",
            "--end",
            "2024-03-29",
            "--symbols",
            "AAPL,MSFT",
            "--seed",
            "42",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                start,
                symbols,
                seed,
                hydrate,
                events,
                ..
            } => {
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
                assert_eq!(symbols.unwrap(), vec!["AAPL", "MSFT"]);
                assert_eq!(seed, Some(42));
                assert!(!hydrate);
                assert!(events.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_parse_phase_reset() {
        let cli = Cli::try_parse_from(["tradeloop", "phase", "reset", "guided"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Phase(PhaseCommands::Reset {
                phase: Phase::Guided,
                checkpoint: None
            })
        ));
        assert!(Cli::try_parse_from(["tradeloop", "phase", "reset", "expert"]).is_err());
    }
}
