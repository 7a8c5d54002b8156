//! OracleProvider - an authorized weather data source and its trust state
//!
//! Reputation is the share of a provider's submissions that were not
//! anomalous, on a 0-100 scale. It drives:
//! - Suspension (a provider below the threshold stops being Active)
//! - Eligibility to submit observations (only Active providers may submit)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CanopyError;
use crate::types::Document;

/// Maximum reputation score
pub const MAX_REPUTATION: f64 = 100.0;

/// Category of data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "API")]
    Api,
    Satellite,
    #[serde(rename = "IoT")]
    Iot,
    Manual,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Api => "API",
            ProviderType::Satellite => "Satellite",
            ProviderType::Iot => "IoT",
            ProviderType::Manual => "Manual",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "API" => Ok(ProviderType::Api),
            "Satellite" => Ok(ProviderType::Satellite),
            "IoT" => Ok(ProviderType::Iot),
            "Manual" => Ok(ProviderType::Manual),
            other => Err(CanopyError::invalid(format!(
                "unknown provider type '{}' (expected API, Satellite, IoT or Manual)",
                other
            ))),
        }
    }
}

/// Provider lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderStatus {
    Active,
    Suspended,
    Revoked,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderStatus::Active => "Active",
            ProviderStatus::Suspended => "Suspended",
            ProviderStatus::Revoked => "Revoked",
        };
        f.write_str(s)
    }
}

impl FromStr for ProviderStatus {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(ProviderStatus::Active),
            "Suspended" => Ok(ProviderStatus::Suspended),
            "Revoked" => Ok(ProviderStatus::Revoked),
            other => Err(CanopyError::invalid(format!("unknown provider status '{}'", other))),
        }
    }
}

/// Registered oracle provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleProvider {
    pub oracle_id: String,
    pub provider_name: String,
    pub provider_type: ProviderType,
    pub data_sources: Vec<String>,
    /// 0-100, recomputed on every submission outcome
    pub reputation_score: f64,
    pub total_submissions: u64,
    pub anomaly_count: u64,
    pub status: ProviderStatus,
    pub registered_date: DateTime<Utc>,
    pub last_submission: Option<DateTime<Utc>>,
}

impl Document for OracleProvider {
    const DOC_TYPE: &'static str = "oracle";
}

impl OracleProvider {
    /// Create a new Active provider with the given starting reputation
    pub fn new(
        oracle_id: impl Into<String>,
        provider_name: impl Into<String>,
        provider_type: ProviderType,
        data_sources: Vec<String>,
        initial_reputation: f64,
        registered_date: DateTime<Utc>,
    ) -> Self {
        Self {
            oracle_id: oracle_id.into(),
            provider_name: provider_name.into(),
            provider_type,
            data_sources,
            reputation_score: initial_reputation.clamp(0.0, MAX_REPUTATION),
            total_submissions: 0,
            anomaly_count: 0,
            status: ProviderStatus::Active,
            registered_date,
            last_submission: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    /// Record one submission outcome and recompute reputation.
    ///
    /// Formula: `100 × (submissions − anomalies) / submissions`.
    /// An Active provider falling below `suspension_threshold` becomes
    /// Suspended. Returns true if this call suspended the provider.
    pub fn record_outcome(&mut self, anomalous: bool, suspension_threshold: f64) -> bool {
        self.total_submissions += 1;
        if anomalous {
            self.anomaly_count += 1;
        }
        self.reputation_score = reputation_for(self.total_submissions, self.anomaly_count);

        if self.status == ProviderStatus::Active && self.reputation_score < suspension_threshold {
            self.status = ProviderStatus::Suspended;
            return true;
        }
        false
    }
}

/// Reputation for `submissions` outcomes of which `anomalies` were anomalous
#[inline]
pub fn reputation_for(submissions: u64, anomalies: u64) -> f64 {
    if submissions == 0 {
        return MAX_REPUTATION;
    }
    let clean = submissions.saturating_sub(anomalies);
    MAX_REPUTATION * clean as f64 / submissions as f64
}

impl fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Oracle({}, {}, rep={:.1}, {}/{} anomalous, {})",
            self.oracle_id,
            self.provider_type,
            self.reputation_score,
            self.anomaly_count,
            self.total_submissions,
            self.status
        )
    }
}
