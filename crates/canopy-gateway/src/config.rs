//! Gateway configuration
//!
//! Layered, later sources win:
//! 1. Built-in defaults
//! 2. `canopy.toml` in the working directory, if present
//! 3. `CANOPY_*` environment variables, `__` between nested keys
//!    (e.g. `CANOPY_PIPELINE__ORACLE__CONSENSUS__TOLERANCE=0.15`)
//! 4. `PORT`, for hosted deployments
//!
//! A `.env` file is loaded into the environment first.

use canopy_common::{CanopyError, Result};
use canopy_ledger::LedgerConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Automatic payout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Consume `ConsensusReached` events
    pub enabled: bool,
    /// Baseline season for policies that do not name one
    pub default_season: String,
    /// Length of the index window ending at the consensus time
    pub window_days: i64,
    /// Identity recorded on orchestrator transactions
    pub caller: String,
    /// JSON array of insurance policies loaded into the in-memory registry
    pub policy_file: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_season: "long-rains".to_string(),
            window_days: 30,
            caller: "payout-orchestrator".to_string(),
            policy_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub ledger: LedgerConfig,
    pub pipeline: PipelineConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_format: LogFormat::Pretty,
            ledger: LedgerConfig::default(),
            pipeline: PipelineConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

fn config_error(e: config::ConfigError) -> CanopyError {
    CanopyError::Config(e.to_string())
}

impl GatewayConfig {
    /// Load from defaults, `canopy.toml` and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default()).map_err(config_error)?)
            .add_source(File::with_name("canopy").required(false))
            .add_source(
                Environment::with_prefix("CANOPY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;
        let mut cfg: Self = settings.try_deserialize().map_err(config_error)?;

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.port = p;
            }
        }
        Ok(cfg)
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml(toml: &str) -> Result<Self> {
        Config::builder()
            .add_source(Config::try_from(&Self::default()).map_err(config_error)?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
