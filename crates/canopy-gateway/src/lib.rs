//! # Canopy Gateway
//!
//! Outer surface of the trigger pipeline.
//!
//! ## Components
//!
//! - **Dispatcher**: named pipeline functions with JSON arguments, one
//!   transaction per call, audit copy of every committed write
//! - **REST**: `/api/v1/submit/{function}`, `/api/v1/evaluate/{function}`
//! - **Payout orchestrator**: consumes `ConsensusReached`, computes indices
//!   against regional baselines, triggers and pays claims
//!
//! ```text
//!  HTTP ──▶ rest ──▶ Dispatcher ──▶ Pipeline (oracle, index, claims)
//!                        │                 │
//!                        ▼                 ▼ ConsensusReached
//!                   AuditLogger    PayoutOrchestrator ──▶ PolicyRegistry
//!                                                    └──▶ PayoutLedger
//! ```

pub mod args;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod orchestrator;
pub mod rest;

pub use collaborators::{
    InMemoryPayoutLedger, InMemoryPolicyRegistry, InsurancePolicy, PayoutLedger, PolicyRegistry,
    PolicyStatus,
};
pub use config::{GatewayConfig, LogFormat, OrchestratorConfig};
pub use dispatch::Dispatcher;
pub use orchestrator::{locations_match, PayoutOrchestrator, PayoutReport};

use canopy_claims::ClaimsProcessor;
use canopy_index::{IndexConfig, IndexService};
use canopy_oracle::{OracleConfig, OracleService};
use serde::{Deserialize, Serialize};

/// Thresholds for every pipeline stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub oracle: OracleConfig,
    pub index: IndexConfig,
}

/// Every pipeline component, wired from one configuration
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub oracle: OracleService,
    pub index: IndexService,
    pub claims: ClaimsProcessor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            oracle: OracleService::new(config.oracle),
            index: IndexService::new(config.index),
            claims: ClaimsProcessor::new(),
        }
    }
}
