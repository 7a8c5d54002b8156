//! RegionalBaseline - historical reference values for a region and season

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Document;

/// Historical mean and spread of one metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalBaseline {
    pub baseline_id: String,
    pub region: String,
    pub season: String,
    pub years_of_data: u32,
    pub rainfall: MetricStats,
    pub temperature: MetricStats,
    pub humidity: MetricStats,
    pub updated_at: DateTime<Utc>,
}

impl Document for RegionalBaseline {
    const DOC_TYPE: &'static str = "baseline";
}

/// Per-metric deviation of current readings from a baseline
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineComparison {
    /// Percent; absent when the baseline mean is not positive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rainfall_deviation: Option<f64>,
    /// Absolute degrees
    pub temperature_deviation: f64,
}
