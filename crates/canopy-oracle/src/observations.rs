//! Observation Store - raw per-source readings awaiting consensus

use canopy_common::{
    time::format_timestamp, CanopyError, Coordinates, Observation, ObservationStatus, Readings,
    Result,
};
use canopy_ledger::TxContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::registry::OracleRegistry;

/// Physically plausible reading ranges (inclusive)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationBounds {
    pub rainfall_min: f64,
    pub rainfall_max: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for ObservationBounds {
    fn default() -> Self {
        Self {
            rainfall_min: 0.0,
            rainfall_max: 1000.0,
            temperature_min: -50.0,
            temperature_max: 60.0,
            humidity_min: 0.0,
            humidity_max: 100.0,
        }
    }
}

impl ObservationBounds {
    /// Reject readings outside the plausible ranges
    pub fn check(&self, r: &Readings) -> Result<()> {
        let checks = [
            ("rainfall", r.rainfall, self.rainfall_min, self.rainfall_max),
            ("temperature", r.temperature, self.temperature_min, self.temperature_max),
            ("humidity", r.humidity, self.humidity_min, self.humidity_max),
        ];
        for (name, value, min, max) in checks {
            if !value.is_finite() || value < min || value > max {
                return Err(CanopyError::invalid(format!(
                    "invalid {} value: {:.2} (expected {}..={})",
                    name, value, min, max
                )));
            }
        }
        if !r.wind_speed.is_finite() {
            return Err(CanopyError::invalid("invalid wind speed value"));
        }
        Ok(())
    }
}

/// Arguments of an observation submission
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub observation_id: String,
    pub oracle_id: String,
    pub location: String,
    pub coordinates: Coordinates,
    pub readings: Readings,
    /// Provenance hash; computed from the readings when empty
    pub data_hash: String,
    /// Observation time; the transaction time when absent
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    registry: OracleRegistry,
    bounds: ObservationBounds,
}

impl ObservationStore {
    pub fn new(registry: OracleRegistry, bounds: ObservationBounds) -> Self {
        Self { registry, bounds }
    }

    /// Accept an observation from an Active provider
    #[instrument(
        skip(self, ctx, obs),
        fields(observation_id = %obs.observation_id, oracle_id = %obs.oracle_id)
    )]
    pub fn submit_observation(
        &self,
        ctx: &mut TxContext,
        obs: NewObservation,
    ) -> Result<Observation> {
        if obs.observation_id.trim().is_empty() {
            return Err(CanopyError::invalid("observation id must not be empty"));
        }
        if ctx.exists(&obs.observation_id)? {
            return Err(CanopyError::AlreadyExists(format!(
                "observation {}",
                obs.observation_id
            )));
        }
        self.bounds.check(&obs.readings)?;

        let provider = self.registry.get_oracle(ctx, &obs.oracle_id)?;
        if !provider.is_active() {
            return Err(CanopyError::precondition(format!(
                "oracle {} is not active ({})",
                obs.oracle_id, provider.status
            )));
        }

        let timestamp = obs.observed_at.unwrap_or_else(|| ctx.timestamp());
        let data_hash = if obs.data_hash.trim().is_empty() {
            obs.readings.digest(&obs.oracle_id, &obs.location, &timestamp)
        } else {
            obs.data_hash
        };

        let observation = Observation {
            observation_id: obs.observation_id,
            oracle_id: obs.oracle_id,
            location: obs.location,
            coordinates: obs.coordinates,
            timestamp,
            readings: obs.readings,
            data_hash,
            validation_score: 0.0,
            status: ObservationStatus::Pending,
            submitted_by: ctx.creator().to_string(),
        };
        ctx.put_doc(observation.observation_id.clone(), &observation)?;
        let now = ctx.timestamp();
        self.registry
            .record_submission(ctx, &observation.oracle_id, now)?;

        info!(location = %observation.location, "Observation accepted");
        Ok(observation)
    }

    pub fn get_observation(
        &self,
        ctx: &mut TxContext,
        observation_id: &str,
    ) -> Result<Observation> {
        ctx.get_doc(observation_id)?
            .ok_or_else(|| CanopyError::not_found(format!("observation {}", observation_id)))
    }

    /// Observations for a location within `[start, end]`, oldest first
    pub fn get_observations_by_region(
        &self,
        ctx: &TxContext,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        if start > end {
            return Err(CanopyError::invalid("start date is after end date"));
        }
        ctx.query_docs(&json!({
            "selector": {
                "docType": "observation",
                "location": location,
                "timestamp": {
                    "$gte": format_timestamp(&start),
                    "$lte": format_timestamp(&end),
                }
            },
            "sort": [{"timestamp": "asc"}]
        }))
    }
}
