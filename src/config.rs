use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordinator::UniverseConfig;
use crate::error::Result;
use crate::rl::config::{PhaseConfig, RLConfig, ReplayConfig, RewardConfig};
use crate::rl::environment::TradingEnvConfig;
use crate::services::FeatureConfig;
use crate::strategy::{ExecutionSimConfig, GeneratorConfig, RegimeConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub phase: PhaseConfig,
    pub reward: RewardConfig,
    pub replay: ReplayConfig,
    pub generator: GeneratorConfig,
    pub execution: ExecutionSimConfig,
    pub environment: TradingEnvConfig,
    pub features: FeatureConfig,
    pub regime: RegimeConfig,
    pub universe: UniverseConfig,
    pub simulation: SimulationConfig,
    /// In-memory transition store when absent
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Apply embedded migrations on start-up
    #[serde(default = "default_true")]
    pub migrate: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Synthetic market and RNG seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Base seed for generators and the execution simulator; entropy if unset
    pub seed: Option<u64>,
    /// Seed for synthetic bars
    pub bars_seed: u64,
    /// Daily volatility of synthetic bars
    pub bars_volatility: f64,
    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            bars_seed: 7,
            bars_volatility: 0.015,
            event_capacity: 1024,
        }
    }
}

impl SimulationConfig {
    /// Seed for one component, derived from the base seed
    pub fn component_seed(&self, offset: u64) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(offset))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Daily rolling log files go here when set
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADELOOP_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADELOOP_PHASE__EPSILON_FLOOR, etc.)
            .add_source(
                Environment::with_prefix("TRADELOOP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("universe.symbols")
                    .with_list_parse_key("replay.real_sources"),
            );

        builder.build()?.try_deserialize()
    }

    /// Learning-side sections as one struct
    pub fn rl(&self) -> RLConfig {
        RLConfig {
            phase: self.phase.clone(),
            replay: self.replay.clone(),
            reward: self.reward.clone(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let checks: [(&str, Result<()>); 9] = [
            ("phase", self.phase.validate()),
            ("reward", self.reward.validate()),
            ("replay", self.replay.validate()),
            ("generator", self.generator.validate()),
            ("execution", self.execution.validate()),
            ("environment", self.environment.validate()),
            ("features", self.features.validate()),
            ("regime", self.regime.validate()),
            ("universe", self.universe.validate()),
        ];

        let mut errors: Vec<String> = checks
            .into_iter()
            .filter_map(|(section, check)| check.err().map(|e| format!("[{section}] {e}")))
            .collect();

        if let Some(db) = &self.database {
            if db.url.trim().is_empty() {
                errors.push("[database] url must not be empty".to_string());
            }
            if db.max_connections == 0 {
                errors.push("[database] max_connections must be positive".to_string());
            }
        }

        if self.simulation.bars_volatility <= 0.0 {
            errors.push("[simulation] bars_volatility must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
