//! # Canopy Oracle
//!
//! Turns untrusted multi-source weather telemetry into agreed readings.
//!
//! ## Components
//!
//! - **Registry**: authorized sources, reputation, suspension
//! - **Observations**: bounds-checked raw readings from Active sources
//! - **Consensus**: 2/3-quorum agreement within a relative tolerance
//!
//! ```text
//! sources ──▶ ObservationStore ──▶ ConsensusEngine ──▶ ConsensusRecord
//!                  │                     │                  + ConsensusReached
//!                  └──── OracleRegistry ◀┘ (reputation)
//! ```

pub mod consensus;
pub mod observations;
pub mod registry;

pub use consensus::{
    evaluate, relative_deviation, ConsensusConfig, ConsensusEngine, ConsensusOutcome,
    ConsensusReachedEvent, Evaluation,
};
pub use observations::{NewObservation, ObservationBounds, ObservationStore};
pub use registry::{OracleRegistry, RegistryConfig};

use serde::{Deserialize, Serialize};

/// Oracle-side configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub registry: RegistryConfig,
    pub bounds: ObservationBounds,
    pub consensus: ConsensusConfig,
}

/// The three oracle-side components wired together
#[derive(Debug, Clone)]
pub struct OracleService {
    pub registry: OracleRegistry,
    pub observations: ObservationStore,
    pub consensus: ConsensusEngine,
}

impl OracleService {
    pub fn new(config: OracleConfig) -> Self {
        let registry = OracleRegistry::new(config.registry);
        let observations = ObservationStore::new(registry.clone(), config.bounds);
        let consensus =
            ConsensusEngine::new(config.consensus, registry.clone(), observations.clone());
        Self {
            registry,
            observations,
            consensus,
        }
    }
}

impl Default for OracleService {
    fn default() -> Self {
        Self::new(OracleConfig::default())
    }
}
