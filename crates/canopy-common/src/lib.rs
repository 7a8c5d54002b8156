//! # Canopy Common
//!
//! Shared data model, errors and audit interface for the Canopy parametric
//! trigger pipeline.
//!
//! ## Core Types
//!
//! - [`OracleProvider`]: authorized weather source with a 0-100 reputation
//! - [`Observation`]: one source's raw reading for a location and time
//! - [`ConsensusRecord`]: agreed reading produced by a consensus run
//! - [`RegionalBaseline`]: historical reference values for a region and season
//! - [`WeatherIndex`]: typed deviation with severity and payout trigger
//! - [`Claim`]: payout event tied to a policy and a triggering index
//!
//! ## Audit
//!
//! - [`audit::AuditSink`]: fire-and-forget receiver of committed transitions

pub mod audit;
pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{CanopyError, ErrorKind, Result};
pub use types::{
    baseline::{BaselineComparison, MetricStats, RegionalBaseline},
    claim::{Claim, ClaimStatus},
    consensus::{ConsensusRecord, ConsensusValues},
    observation::{Coordinates, Observation, ObservationStatus, Readings},
    oracle::{OracleProvider, ProviderStatus, ProviderType},
    weather_index::{IndexType, Severity, TriggerValidation, WeatherIndex},
    Document,
};

/// Canopy version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Event name emitted when a consensus run reaches agreement
pub const CONSENSUS_REACHED_EVENT: &str = "ConsensusReached";

/// Field name carrying a document's type in world state
pub const DOC_TYPE_FIELD: &str = "docType";
