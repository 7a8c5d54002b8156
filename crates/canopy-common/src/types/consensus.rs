//! ConsensusRecord - the agreed reading for one (location, time) run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Document;

/// Mean values of the metrics that take part in consensus
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsensusValues {
    pub rainfall: f64,
    pub temperature: f64,
    pub humidity: f64,
}

/// Outcome of one consensus run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusRecord {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    /// Sequence number of this run for the (location, timestamp) key, from 1
    pub run: u64,
    pub observation_count: usize,
    pub validated_count: usize,
    pub required_count: usize,
    pub consensus_values: ConsensusValues,
    pub consensus_reached: bool,
    pub created_at: DateTime<Utc>,
    pub tx_id: String,
}

impl Document for ConsensusRecord {
    const DOC_TYPE: &'static str = "consensus";
}
