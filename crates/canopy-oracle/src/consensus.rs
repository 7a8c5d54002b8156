//! Consensus Engine - reconciles independent observations into one reading
//!
//! A run over N usable observations:
//! 1. Averages rainfall, temperature and humidity
//! 2. Marks each observation in consensus if every metric's relative
//!    deviation from the mean is within tolerance (default 20%)
//! 3. Reports each verdict to the Oracle Registry
//! 4. Declares consensus if the in-consensus count is at least
//!    ⌊2N/3⌋ and persists a record either way
//! 5. Emits `ConsensusReached` for downstream automation on success

use std::collections::HashSet;

use canopy_common::{
    time::format_timestamp, CanopyError, ConsensusRecord, ConsensusValues, Observation,
    ObservationStatus, Readings, Result, CONSENSUS_REACHED_EVENT,
};
use canopy_ledger::{keys, TxContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::observations::ObservationStore;
use crate::registry::OracleRegistry;

/// Consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Maximum relative deviation from the mean, per metric
    pub tolerance: f64,
    pub quorum_numerator: usize,
    pub quorum_denominator: usize,
    /// Fewer usable observations than this is a hard failure
    pub min_observations: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.20,
            quorum_numerator: 2,
            quorum_denominator: 3,
            min_observations: 2,
        }
    }
}

impl ConsensusConfig {
    /// In-consensus count needed out of `valid` observations (floor)
    pub fn required(&self, valid: usize) -> usize {
        valid * self.quorum_numerator / self.quorum_denominator.max(1)
    }
}

/// Payload of the `ConsensusReached` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReachedEvent {
    pub location: String,
    /// RFC 3339
    pub timestamp: String,
    pub rainfall: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub run: u64,
}

/// `|value − mean| / |mean|`; for a zero mean, 0 if the value is 0 and
/// infinite otherwise
#[inline]
pub fn relative_deviation(value: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        if value == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (value - mean).abs() / mean.abs()
    }
}

pub fn mean_values(readings: &[Readings]) -> ConsensusValues {
    if readings.is_empty() {
        return ConsensusValues::default();
    }
    let n = readings.len() as f64;
    let sum = readings.iter().fold(ConsensusValues::default(), |acc, r| ConsensusValues {
        rainfall: acc.rainfall + r.rainfall,
        temperature: acc.temperature + r.temperature,
        humidity: acc.humidity + r.humidity,
    });
    ConsensusValues {
        rainfall: sum.rainfall / n,
        temperature: sum.temperature / n,
        humidity: sum.humidity / n,
    }
}

/// Pure outcome of a consensus evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub values: ConsensusValues,
    /// One verdict per input, in input order
    pub in_consensus: Vec<bool>,
    pub validated: usize,
    pub required: usize,
    pub reached: bool,
}

/// Evaluate a set of readings without touching state
pub fn evaluate(readings: &[Readings], config: &ConsensusConfig) -> Evaluation {
    let values = mean_values(readings);
    let in_consensus: Vec<bool> = readings
        .iter()
        .map(|r| {
            relative_deviation(r.rainfall, values.rainfall) <= config.tolerance
                && relative_deviation(r.temperature, values.temperature) <= config.tolerance
                && relative_deviation(r.humidity, values.humidity) <= config.tolerance
        })
        .collect();
    let validated = in_consensus.iter().filter(|v| **v).count();
    let required = config.required(readings.len());

    Evaluation {
        values,
        in_consensus,
        validated,
        required,
        reached: validated >= required,
    }
}

/// Result of a persisted consensus run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusOutcome {
    pub record: ConsensusRecord,
    pub validated: Vec<String>,
    pub anomalous: Vec<String>,
    /// Ids that could not be loaded
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
    registry: OracleRegistry,
    observations: ObservationStore,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        registry: OracleRegistry,
        observations: ObservationStore,
    ) -> Self {
        Self {
            config,
            registry,
            observations,
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Run consensus for `(location, timestamp)` over the given observations.
    ///
    /// Ids that fail to load are skipped; repeated ids count once. Only
    /// Pending observations change status and feed reputation; already
    /// decided ones still contribute to the averages.
    #[instrument(skip(self, ctx, observation_ids), fields(count = observation_ids.len()))]
    pub fn validate_data_consensus(
        &self,
        ctx: &mut TxContext,
        location: &str,
        timestamp: DateTime<Utc>,
        observation_ids: &[String],
    ) -> Result<ConsensusOutcome> {
        let mut seen = HashSet::new();
        let mut loaded: Vec<Observation> = Vec::with_capacity(observation_ids.len());
        let mut skipped = Vec::new();

        for id in observation_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.observations.get_observation(ctx, id) {
                Ok(obs) => loaded.push(obs),
                Err(e) => {
                    warn!(observation_id = %id, error = %e, "Skipping observation");
                    skipped.push(id.clone());
                }
            }
        }

        if loaded.len() < self.config.min_observations {
            return Err(CanopyError::InsufficientData {
                required: self.config.min_observations,
                available: loaded.len(),
            });
        }

        let readings: Vec<Readings> = loaded.iter().map(|o| o.readings).collect();
        let eval = evaluate(&readings, &self.config);

        let mut validated = Vec::new();
        let mut anomalous = Vec::new();
        for (mut obs, ok) in loaded.into_iter().zip(eval.in_consensus.iter().copied()) {
            debug!(
                observation_id = %obs.observation_id,
                rainfall_dev = relative_deviation(obs.readings.rainfall, eval.values.rainfall),
                temperature_dev =
                    relative_deviation(obs.readings.temperature, eval.values.temperature),
                humidity_dev = relative_deviation(obs.readings.humidity, eval.values.humidity),
                in_consensus = ok,
                "Observation deviation"
            );

            if ok {
                validated.push(obs.observation_id.clone());
            } else {
                anomalous.push(obs.observation_id.clone());
            }

            if obs.status != ObservationStatus::Pending {
                continue;
            }
            obs.mark(ok);
            ctx.put_doc(obs.observation_id.clone(), &obs)?;
            if !ok {
                warn!(
                    observation_id = %obs.observation_id,
                    oracle_id = %obs.oracle_id,
                    "Anomalous observation"
                );
            }
            self.registry.update_reputation(ctx, &obs.oracle_id, !ok)?;
        }

        let unix = timestamp.timestamp();
        let head_key = keys::consensus_head(location, unix);
        let run = ctx
            .get_doc::<ConsensusRecord>(&head_key)?
            .map_or(1, |prev| prev.run + 1);

        let record = ConsensusRecord {
            location: location.to_string(),
            timestamp,
            run,
            observation_count: readings.len(),
            validated_count: eval.validated,
            required_count: eval.required,
            consensus_values: eval.values,
            consensus_reached: eval.reached,
            created_at: ctx.timestamp(),
            tx_id: ctx.tx_id().to_string(),
        };
        ctx.put_doc(keys::consensus_run(location, unix, run), &record)?;
        ctx.put_doc(head_key, &record)?;

        if record.consensus_reached {
            let event = ConsensusReachedEvent {
                location: location.to_string(),
                timestamp: format_timestamp(&timestamp),
                rainfall: eval.values.rainfall,
                temperature: eval.values.temperature,
                humidity: eval.values.humidity,
                run,
            };
            ctx.set_event(CONSENSUS_REACHED_EVENT, &event)?;
        }

        info!(
            location,
            run,
            observations = record.observation_count,
            validated = record.validated_count,
            required = record.required_count,
            reached = record.consensus_reached,
            "Consensus run recorded"
        );

        Ok(ConsensusOutcome {
            record,
            validated,
            anomalous,
            skipped,
        })
    }

    /// Manually flag an observation as anomalous and penalise its source
    #[instrument(skip(self, ctx))]
    pub fn flag_anomalous_observation(
        &self,
        ctx: &mut TxContext,
        observation_id: &str,
        reason: &str,
    ) -> Result<Observation> {
        let mut obs = self.observations.get_observation(ctx, observation_id)?;
        if obs.status == ObservationStatus::Anomalous {
            return Err(CanopyError::precondition(format!(
                "observation {} is already anomalous",
                observation_id
            )));
        }

        obs.mark(false);
        ctx.put_doc(observation_id.to_string(), &obs)?;
        self.registry.update_reputation(ctx, &obs.oracle_id, true)?;

        warn!(
            observation_id,
            oracle_id = %obs.oracle_id,
            reason,
            "Observation flagged as anomalous"
        );
        Ok(obs)
    }

    /// Most recent consensus run for `(location, timestamp)`
    pub fn get_consensus_record(
        &self,
        ctx: &mut TxContext,
        location: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ConsensusRecord> {
        let key = keys::consensus_head(location, timestamp.timestamp());
        ctx.get_doc(&key)?
            .ok_or_else(|| CanopyError::not_found(format!("consensus record {}", key)))
    }

    /// Every consensus run for `(location, timestamp)`, oldest first
    pub fn get_consensus_history(
        &self,
        ctx: &TxContext,
        location: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<ConsensusRecord>> {
        let prefix = keys::consensus_runs_prefix(location, timestamp.timestamp());
        let mut runs = Vec::new();
        for (_, value) in ctx.scan_prefix(&prefix)? {
            let record: ConsensusRecord = serde_json::from_value(value)?;
            if record.location == location && record.timestamp == timestamp {
                runs.push(record);
            }
        }
        runs.sort_by_key(|r| r.run);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::{NewObservation, ObservationBounds};
    use crate::registry::RegistryConfig;
    use canopy_common::{Coordinates, ErrorKind, ProviderStatus};
    use canopy_ledger::{Ledger, StateStore};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn engine() -> ConsensusEngine {
        let registry = OracleRegistry::new(RegistryConfig::default());
        let observations = ObservationStore::new(registry.clone(), ObservationBounds::default());
        ConsensusEngine::new(ConsensusConfig::default(), registry, observations)
    }

    /// Register one oracle per reading and submit one observation each
    fn seed(
        ledger: &Ledger,
        engine: &ConsensusEngine,
        readings: &[(f64, f64, f64)],
    ) -> Vec<String> {
        let mut ctx = ledger.begin("admin");
        let mut ids = Vec::new();
        for (i, (rain, temp, hum)) in readings.iter().enumerate() {
            let oracle_id = format!("oracle-{}", i);
            engine
                .registry
                .register_oracle(&mut ctx, &oracle_id, "P", "IoT", vec![])
                .unwrap();
            let id = format!("OBS-{}", i);
            engine
                .observations
                .submit_observation(
                    &mut ctx,
                    NewObservation {
                        observation_id: id.clone(),
                        oracle_id,
                        location: "Nakuru".into(),
                        coordinates: Coordinates::default(),
                        readings: Readings::new(*rain, *temp, *hum, 1.0),
                        data_hash: "h".into(),
                        observed_at: Some(at()),
                    },
                )
                .unwrap();
            ids.push(id);
        }
        ctx.commit().unwrap();
        ids
    }

    #[test]
    fn test_relative_deviation_zero_mean() {
        assert_eq!(relative_deviation(0.0, 0.0), 0.0);
        assert!(relative_deviation(1.0, 0.0).is_infinite());
        assert!((relative_deviation(-22.0, -20.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_quorum_floor() {
        let c = ConsensusConfig::default();
        assert_eq!(c.required(2), 1);
        assert_eq!(c.required(3), 2);
        assert_eq!(c.required(4), 2);
        assert_eq!(c.required(5), 3);
    }

    #[test]
    fn test_evaluate_with_outlier() {
        let readings = [
            Readings::new(10.0, 25.0, 60.0, 0.0),
            Readings::new(11.0, 25.5, 62.0, 0.0),
            Readings::new(10.5, 24.5, 61.0, 0.0),
            Readings::new(40.0, 25.0, 60.0, 0.0),
        ];
        let eval = evaluate(&readings, &ConsensusConfig::default());
        // mean rainfall 17.875: even the cluster is > 20% away
        assert_eq!(eval.in_consensus, vec![false, false, false, false]);
        assert_eq!(eval.required, 2);
        assert!(!eval.reached);
    }

    #[test]
    fn test_consensus_reached_marks_and_emits() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let ids = seed(
            &ledger,
            &engine,
            &[(10.0, 25.0, 60.0), (11.0, 25.5, 62.0), (10.5, 24.0, 61.0)],
        );
        let mut rx = ledger.subscribe();

        let mut ctx = ledger.begin("gateway");
        let outcome = engine
            .validate_data_consensus(&mut ctx, "Nakuru", at(), &ids)
            .unwrap();
        let receipt = ctx.commit().unwrap();

        assert!(outcome.record.consensus_reached);
        assert_eq!(outcome.validated.len(), 3);
        assert!((outcome.record.consensus_values.rainfall - 10.5).abs() < 1e-9);
        assert_eq!(receipt.events.len(), 1);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name, CONSENSUS_REACHED_EVENT);
        let payload: ConsensusReachedEvent = serde_json::from_value(event.payload).unwrap();
        assert_eq!(payload.location, "Nakuru");
        assert_eq!(payload.timestamp, "2024-03-01T06:00:00Z");

        let mut ctx = ledger.begin("anyone");
        let obs = engine.observations.get_observation(&mut ctx, "OBS-0").unwrap();
        assert_eq!(obs.status, ObservationStatus::Validated);
        assert_eq!(obs.validation_score, 100.0);
        let oracle = engine.registry.get_oracle(&mut ctx, "oracle-0").unwrap();
        assert_eq!(oracle.total_submissions, 1);
        assert_eq!(oracle.reputation_score, 100.0);
    }

    #[test]
    fn test_outlier_is_penalised_but_consensus_holds() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let ids = seed(
            &ledger,
            &engine,
            &[(10.0, 25.0, 60.0), (10.0, 25.0, 60.0), (10.0, 25.0, 60.0), (10.0, 40.0, 60.0)],
        );

        let mut ctx = ledger.begin("gateway");
        let outcome = engine
            .validate_data_consensus(&mut ctx, "Nakuru", at(), &ids)
            .unwrap();
        ctx.commit().unwrap();

        // mean temperature 28.75; 25 deviates 13%, 40 deviates 39%
        assert_eq!(outcome.anomalous, vec!["OBS-3".to_string()]);
        assert_eq!(outcome.record.required_count, 2);
        assert!(outcome.record.consensus_reached);

        let mut ctx = ledger.begin("anyone");
        let oracle = engine.registry.get_oracle(&mut ctx, "oracle-3").unwrap();
        assert_eq!(oracle.anomaly_count, 1);
        assert_eq!(oracle.reputation_score, 0.0);
        assert_eq!(oracle.status, ProviderStatus::Suspended);
        let obs = engine.observations.get_observation(&mut ctx, "OBS-3").unwrap();
        assert_eq!(obs.status, ObservationStatus::Anomalous);
    }

    #[test]
    fn test_no_consensus_still_persists_record_without_event() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let ids = seed(&ledger, &engine, &[(5.0, 20.0, 40.0), (50.0, 35.0, 90.0)]);

        let mut ctx = ledger.begin("gateway");
        let outcome = engine
            .validate_data_consensus(&mut ctx, "Nakuru", at(), &ids)
            .unwrap();
        let receipt = ctx.commit().unwrap();

        assert!(!outcome.record.consensus_reached);
        assert!(receipt.events.is_empty());

        let mut ctx = ledger.begin("anyone");
        let record = engine.get_consensus_record(&mut ctx, "Nakuru", at()).unwrap();
        assert_eq!(record.observation_count, 2);
        assert!(!record.consensus_reached);
    }

    #[test]
    fn test_insufficient_data_persists_nothing() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let ids = seed(&ledger, &engine, &[(10.0, 25.0, 60.0)]);
        let height = ledger.store().height();

        let mut ctx = ledger.begin("gateway");
        let mut with_missing = ids.clone();
        with_missing.push("OBS-MISSING".into());
        with_missing.push(ids[0].clone());
        let err = engine
            .validate_data_consensus(&mut ctx, "Nakuru", at(), &with_missing)
            .unwrap_err();
        assert!(matches!(
            err,
            CanopyError::InsufficientData {
                required: 2,
                available: 1
            }
        ));
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert!(!ctx.has_writes());
        assert_eq!(ledger.store().height(), height);
    }

    #[test]
    fn test_unloadable_id_is_skipped() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let mut ids = seed(&ledger, &engine, &[(10.0, 25.0, 60.0), (10.4, 25.2, 61.0)]);
        ids.insert(1, "OBS-MISSING".into());

        let mut ctx = ledger.begin("gateway");
        let outcome = engine
            .validate_data_consensus(&mut ctx, "Nakuru", at(), &ids)
            .unwrap();
        ctx.commit().unwrap();

        assert_eq!(outcome.skipped, vec!["OBS-MISSING".to_string()]);
        assert_eq!(outcome.record.observation_count, 2);
        assert_eq!(outcome.validated, vec!["OBS-0".to_string(), "OBS-1".to_string()]);
        assert!(outcome.record.consensus_reached);

        let mut ctx = ledger.begin("anyone");
        let record = engine.get_consensus_record(&mut ctx, "Nakuru", at()).unwrap();
        assert_eq!(record.observation_count, 2);
        assert_eq!(record.run, 1);
        let obs = engine.observations.get_observation(&mut ctx, "OBS-1").unwrap();
        assert_eq!(obs.status, ObservationStatus::Validated);
    }

    #[test]
    fn test_rerun_creates_new_record_and_latest_wins() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        let ids = seed(&ledger, &engine, &[(10.0, 25.0, 60.0), (10.2, 25.1, 60.5)]);

        for _ in 0..2 {
            let mut ctx = ledger.begin("gateway");
            engine
                .validate_data_consensus(&mut ctx, "Nakuru", at(), &ids)
                .unwrap();
            ctx.commit().unwrap();
        }

        let mut ctx = ledger.begin("anyone");
        let history = engine.get_consensus_history(&ctx, "Nakuru", at()).unwrap();
        assert_eq!(history.iter().map(|r| r.run).collect::<Vec<_>>(), vec![1, 2]);
        assert_ne!(history[0].tx_id, history[1].tx_id);

        let latest = engine.get_consensus_record(&mut ctx, "Nakuru", at()).unwrap();
        assert_eq!(latest.run, 2);

        // the second run did not count the same observations again
        let oracle = engine.registry.get_oracle(&mut ctx, "oracle-0").unwrap();
        assert_eq!(oracle.total_submissions, 1);
    }

    #[test]
    fn test_flag_anomalous_observation() {
        let ledger = Ledger::in_memory();
        let engine = engine();
        seed(&ledger, &engine, &[(10.0, 25.0, 60.0)]);

        let mut ctx = ledger.begin("admin");
        let obs = engine
            .flag_anomalous_observation(&mut ctx, "OBS-0", "sensor drift")
            .unwrap();
        assert_eq!(obs.status, ObservationStatus::Anomalous);
        let err = engine
            .flag_anomalous_observation(&mut ctx, "OBS-0", "again")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        ctx.commit().unwrap();

        let mut ctx = ledger.begin("anyone");
        let oracle = engine.registry.get_oracle(&mut ctx, "oracle-0").unwrap();
        assert_eq!(oracle.anomaly_count, 1);
        assert_eq!(oracle.status, ProviderStatus::Suspended);
    }

    fn reading() -> impl Strategy<Value = Readings> {
        (0.0..200.0f64, -10.0..45.0f64, 0.0..100.0f64)
            .prop_map(|(r, t, h)| Readings::new(r, t, h, 0.0))
    }

    proptest! {
        #[test]
        fn prop_reached_iff_quorum(readings in prop::collection::vec(reading(), 2..10)) {
            let config = ConsensusConfig::default();
            let eval = evaluate(&readings, &config);
            let count = eval.in_consensus.iter().filter(|v| **v).count();
            prop_assert_eq!(eval.reached, count >= (2 * readings.len()) / 3);
        }

        #[test]
        fn prop_evaluation_is_deterministic(readings in prop::collection::vec(reading(), 2..10)) {
            let config = ConsensusConfig::default();
            prop_assert_eq!(evaluate(&readings, &config), evaluate(&readings, &config));
        }
    }
}
