//! # Canopy Index
//!
//! Weather indices measured against regional baselines.
//!
//! ## Index types
//!
//! - **Rainfall**: percent deficit or surplus against the seasonal mean
//! - **Temperature**: absolute degrees above or below the seasonal mean
//! - **Drought**: consecutive dry days against a contractual threshold
//!
//! Each calculation persists a [`canopy_common::WeatherIndex`] carrying a
//! severity (how bad) and a payout trigger (does it pay). The payout
//! percentage table maps severity to a share of coverage.

pub mod baseline;
pub mod engine;
pub mod thresholds;

pub use baseline::{compare, BaselineSpread, BaselineStore};
pub use engine::{IndexEngine, IndexWindow};
pub use thresholds::{
    Assessment, DroughtThresholds, IndexThresholds, RainfallThresholds, SeverityBands,
    TemperatureThresholds,
};

use serde::{Deserialize, Serialize};

/// Index-side configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub thresholds: IndexThresholds,
    pub baseline: BaselineSpread,
}

/// Index engine and baseline store wired together
#[derive(Debug, Clone, Default)]
pub struct IndexService {
    pub engine: IndexEngine,
    pub baselines: BaselineStore,
}

impl IndexService {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            engine: IndexEngine::new(config.thresholds),
            baselines: BaselineStore::new(config.baseline),
        }
    }
}
