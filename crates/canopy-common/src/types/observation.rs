//! Observation - one source's raw weather reading for a location and time

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CanopyError;
use crate::types::Document;

/// Validation lifecycle of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationStatus {
    Pending,
    Validated,
    Anomalous,
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObservationStatus::Pending => "Pending",
            ObservationStatus::Validated => "Validated",
            ObservationStatus::Anomalous => "Anomalous",
        };
        f.write_str(s)
    }
}

impl FromStr for ObservationStatus {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ObservationStatus::Pending),
            "Validated" => Ok(ObservationStatus::Validated),
            "Anomalous" => Ok(ObservationStatus::Anomalous),
            other => Err(CanopyError::invalid(format!("unknown observation status '{}'", other))),
        }
    }
}

/// Geographic point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The four numeric readings of an observation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readings {
    /// Precipitation in mm
    pub rainfall: f64,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    /// m/s
    pub wind_speed: f64,
}

impl Readings {
    pub fn new(rainfall: f64, temperature: f64, humidity: f64, wind_speed: f64) -> Self {
        Self {
            rainfall,
            temperature,
            humidity,
            wind_speed,
        }
    }

    /// blake3 digest of the canonical reading tuple, hex encoded
    pub fn digest(&self, oracle_id: &str, location: &str, timestamp: &DateTime<Utc>) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(oracle_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(location.as_bytes());
        hasher.update(&[0]);
        hasher.update(&timestamp.timestamp().to_le_bytes());
        hasher.update(&self.rainfall.to_le_bytes());
        hasher.update(&self.temperature.to_le_bytes());
        hasher.update(&self.humidity.to_le_bytes());
        hasher.update(&self.wind_speed.to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// A stored observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub observation_id: String,
    pub oracle_id: String,
    pub location: String,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub readings: Readings,
    pub data_hash: String,
    /// 0 until consensus, then 100 (validated) or 0 (anomalous)
    pub validation_score: f64,
    pub status: ObservationStatus,
    pub submitted_by: String,
}

impl Document for Observation {
    const DOC_TYPE: &'static str = "observation";
}

impl Observation {
    pub fn is_pending(&self) -> bool {
        self.status == ObservationStatus::Pending
    }

    /// Apply a consensus verdict
    pub fn mark(&mut self, in_consensus: bool) {
        if in_consensus {
            self.status = ObservationStatus::Validated;
            self.validation_score = 100.0;
        } else {
            self.status = ObservationStatus::Anomalous;
            self.validation_score = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Observation {
        Observation {
            observation_id: "obs-1".into(),
            oracle_id: "sat-1".into(),
            location: "Nakuru".into(),
            coordinates: Coordinates {
                latitude: -0.3,
                longitude: 36.07,
            },
            timestamp: Utc::now(),
            readings: Readings::new(12.5, 24.0, 60.0, 3.2),
            data_hash: String::new(),
            validation_score: 0.0,
            status: ObservationStatus::Pending,
            submitted_by: "sat-operator".into(),
        }
    }

    #[test]
    fn test_readings_flatten_into_document() {
        let json = serde_json::to_value(observation()).unwrap();
        assert_eq!(json["rainfall"], 12.5);
        assert_eq!(json["windSpeed"], 3.2);
        assert_eq!(json["status"], "Pending");
        assert!(json.get("readings").is_none());
    }

    #[test]
    fn test_mark() {
        let mut obs = observation();
        obs.mark(true);
        assert_eq!(obs.status, ObservationStatus::Validated);
        assert_eq!(obs.validation_score, 100.0);

        let mut obs = observation();
        obs.mark(false);
        assert_eq!(obs.status, ObservationStatus::Anomalous);
        assert_eq!(obs.validation_score, 0.0);
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let obs = observation();
        let a = obs.readings.digest("sat-1", "Nakuru", &obs.timestamp);
        let b = obs.readings.digest("sat-1", "Nakuru", &obs.timestamp);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut other = obs.readings;
        other.temperature += 0.1;
        assert_ne!(a, other.digest("sat-1", "Nakuru", &obs.timestamp));
    }
}
