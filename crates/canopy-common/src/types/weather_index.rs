//! WeatherIndex - a typed deviation-from-baseline measurement
//!
//! Severity answers "how bad"; `payout_triggered` answers "does it pay".
//! The two use different thresholds and are computed independently.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CanopyError;
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Rainfall,
    Temperature,
    Drought,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexType::Rainfall => "Rainfall",
            IndexType::Temperature => "Temperature",
            IndexType::Drought => "Drought",
        };
        f.write_str(s)
    }
}

/// Coarse rating of a deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Share of coverage paid out at this severity, in percent
    pub fn payout_percent(&self) -> Decimal {
        match self {
            Severity::None => Decimal::ZERO,
            Severity::Mild => Decimal::from(25),
            Severity::Moderate => Decimal::from(50),
            Severity::Severe => Decimal::ONE_HUNDRED,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::None => "None",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Severity::None),
            "Mild" => Ok(Severity::Mild),
            "Moderate" => Ok(Severity::Moderate),
            "Severe" => Ok(Severity::Severe),
            other => Err(CanopyError::invalid(format!("unknown severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherIndex {
    pub index_id: String,
    pub location: String,
    pub index_type: IndexType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Measured value (consecutive dry days for drought)
    pub calculated_value: f64,
    /// Baseline value (threshold days for drought)
    pub baseline_value: f64,
    /// Percent for rainfall and drought, degrees for temperature
    pub deviation: f64,
    pub severity: Severity,
    pub payout_triggered: bool,
    pub calculated_at: DateTime<Utc>,
}

impl Document for WeatherIndex {
    const DOC_TYPE: &'static str = "weatherIndex";
}

/// Trigger flag paired with the payout magnitude it implies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerValidation {
    pub is_triggered: bool,
    pub payout_percent: Decimal,
}
