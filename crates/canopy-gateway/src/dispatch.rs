//! Named-function dispatch over the pipeline
//!
//! `submit` runs a function in a fresh transaction and commits it;
//! `evaluate` runs it and discards any writes. Every committed write is
//! copied to the audit log.

use std::sync::Arc;

use canopy_claims::TriggerRequest;
use canopy_common::{audit::AuditLogger, CanopyError, Coordinates, Readings, Result};
use canopy_index::IndexWindow;
use canopy_ledger::{Ledger, TxContext};
use canopy_oracle::NewObservation;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::args::Args;
use crate::Pipeline;

/// Every function name accepted by [`Dispatcher::submit`] and
/// [`Dispatcher::evaluate`]
pub const FUNCTIONS: &[&str] = &[
    // oracle registry
    "RegisterOracle",
    "GetOracle",
    "GetOracleReputation",
    "ListOracles",
    "UpdateOracleReputation",
    "SetOracleStatus",
    // observations and consensus
    "SubmitObservation",
    "GetObservation",
    "GetObservationsByRegion",
    "ValidateDataConsensus",
    "FlagAnomalousObservation",
    "GetConsensusRecord",
    "GetConsensusHistory",
    // indices and baselines
    "CalculateRainfallIndex",
    "CalculateTemperatureIndex",
    "CalculateDroughtIndex",
    "StoreRegionalBaseline",
    "GetRegionalBaseline",
    "CompareToBaseline",
    "CalculatePayoutPercentage",
    "ValidateIndexTrigger",
    "GetWeatherIndex",
    "GetIndicesByLocation",
    "GetTriggeredIndices",
    // claims
    "EvaluatePolicy",
    "TriggerPayout",
    "CalculatePayoutAmount",
    "HasDuplicateClaim",
    "ApproveClaim",
    "RecordPayment",
    "RejectClaim",
    "GetClaim",
    "GetClaimsByPolicy",
    "GetClaimHistory",
    "GetPendingClaims",
    "GetAllClaims",
    "GenerateClaimReport",
];

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Clone)]
pub struct Dispatcher {
    ledger: Ledger,
    pipeline: Arc<Pipeline>,
    audit: Arc<AuditLogger>,
}

impl Dispatcher {
    pub fn new(ledger: Ledger, pipeline: Pipeline, audit: Arc<AuditLogger>) -> Self {
        Self {
            ledger,
            pipeline: Arc::new(pipeline),
            audit,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run `f` in one transaction and commit it, auditing every write
    pub fn transact<T>(
        &self,
        caller: &str,
        action: &str,
        f: impl FnOnce(&mut TxContext, &Pipeline) -> Result<T>,
    ) -> Result<T> {
        let mut ctx = self.ledger.begin(caller);
        let out = f(&mut ctx, &self.pipeline)?;
        let receipt = ctx.commit()?;

        for written in &receipt.writes {
            self.audit.log_transition(
                action,
                &receipt.tx_id,
                caller,
                &written.key,
                written.doc_type.as_deref(),
                written.status.as_deref(),
            );
        }
        debug!(
            action,
            tx_id = %receipt.tx_id,
            commit_seq = receipt.commit_seq,
            writes = receipt.writes.len(),
            "Transaction committed"
        );
        Ok(out)
    }

    /// Run `f` against a transaction that is never committed
    pub fn read<T>(
        &self,
        caller: &str,
        f: impl FnOnce(&mut TxContext, &Pipeline) -> Result<T>,
    ) -> Result<T> {
        let mut ctx = self.ledger.begin(caller);
        f(&mut ctx, &self.pipeline)
    }

    /// Invoke and commit
    #[instrument(skip(self, args), fields(args = args.len()))]
    pub fn submit(&self, caller: &str, function: &str, args: &[Value]) -> Result<Value> {
        let result = self.transact(caller, function, |ctx, pipeline| {
            invoke(pipeline, ctx, function, args)
        });
        match &result {
            Ok(_) => info!("Function submitted"),
            Err(e) => warn!(error = %e, kind = %e.kind(), "Function failed"),
        }
        result
    }

    /// Invoke without committing
    #[instrument(skip(self, args), fields(args = args.len()))]
    pub fn evaluate(&self, caller: &str, function: &str, args: &[Value]) -> Result<Value> {
        self.read(caller, |ctx, pipeline| invoke(pipeline, ctx, function, args))
    }
}

fn invoke(
    pipeline: &Pipeline,
    ctx: &mut TxContext,
    function: &str,
    values: &[Value],
) -> Result<Value> {
    let a = Args::new(function, values);
    let registry = &pipeline.oracle.registry;
    let observations = &pipeline.oracle.observations;
    let consensus = &pipeline.oracle.consensus;
    let engine = &pipeline.index.engine;
    let baselines = &pipeline.index.baselines;
    let claims = &pipeline.claims;

    match function {
        "RegisterOracle" => {
            a.expect(3, 4)?;
            let sources = if a.len() > 3 { a.strings(3, "dataSources")? } else { Vec::new() };
            to_value(registry.register_oracle(
                ctx,
                &a.string(0, "oracleId")?,
                &a.string(1, "providerName")?,
                &a.string(2, "providerType")?,
                sources,
            )?)
        }
        "GetOracle" => {
            a.expect(1, 1)?;
            to_value(registry.get_oracle(ctx, &a.string(0, "oracleId")?)?)
        }
        "GetOracleReputation" => {
            a.expect(1, 1)?;
            to_value(registry.get_oracle_reputation(ctx, &a.string(0, "oracleId")?)?)
        }
        "ListOracles" => {
            a.expect(0, 0)?;
            to_value(registry.list_oracles(ctx)?)
        }
        "UpdateOracleReputation" => {
            a.expect(2, 2)?;
            let oracle_id = a.string(0, "oracleId")?;
            to_value(registry.update_reputation(ctx, &oracle_id, a.bool(1, "isAnomalous")?)?)
        }
        "SetOracleStatus" => {
            a.expect(2, 2)?;
            let oracle_id = a.string(0, "oracleId")?;
            to_value(registry.set_provider_status(ctx, &oracle_id, &a.string(1, "status")?)?)
        }

        "SubmitObservation" => {
            a.expect(9, 11)?;
            let obs = NewObservation {
                observation_id: a.string(0, "observationId")?,
                oracle_id: a.string(1, "oracleId")?,
                location: a.string(2, "location")?,
                coordinates: Coordinates {
                    latitude: a.f64(3, "latitude")?,
                    longitude: a.f64(4, "longitude")?,
                },
                readings: Readings::new(
                    a.f64(5, "rainfall")?,
                    a.f64(6, "temperature")?,
                    a.f64(7, "humidity")?,
                    a.f64(8, "windSpeed")?,
                ),
                data_hash: a.opt_string(9).unwrap_or_default(),
                observed_at: a.opt_timestamp(10, "timestamp")?,
            };
            to_value(observations.submit_observation(ctx, obs)?)
        }
        "GetObservation" => {
            a.expect(1, 1)?;
            to_value(observations.get_observation(ctx, &a.string(0, "observationId")?)?)
        }
        "GetObservationsByRegion" => {
            a.expect(3, 3)?;
            to_value(observations.get_observations_by_region(
                ctx,
                &a.string(0, "location")?,
                a.timestamp(1, "startDate")?,
                a.timestamp(2, "endDate")?,
            )?)
        }
        "ValidateDataConsensus" => {
            a.expect(3, 3)?;
            to_value(consensus.validate_data_consensus(
                ctx,
                &a.string(0, "location")?,
                a.timestamp(1, "timestamp")?,
                &a.strings(2, "observationIds")?,
            )?)
        }
        "FlagAnomalousObservation" => {
            a.expect(2, 2)?;
            to_value(consensus.flag_anomalous_observation(
                ctx,
                &a.string(0, "observationId")?,
                &a.string(1, "reason")?,
            )?)
        }
        "GetConsensusRecord" => {
            a.expect(2, 2)?;
            let location = a.string(0, "location")?;
            to_value(consensus.get_consensus_record(ctx, &location, a.timestamp(1, "timestamp")?)?)
        }
        "GetConsensusHistory" => {
            a.expect(2, 2)?;
            let location = a.string(0, "location")?;
            to_value(consensus.get_consensus_history(ctx, &location, a.timestamp(1, "timestamp")?)?)
        }

        "CalculateRainfallIndex" | "CalculateTemperatureIndex" | "CalculateDroughtIndex" => {
            a.expect(6, 6)?;
            let window = IndexWindow::new(
                a.string(0, "indexId")?,
                a.string(1, "location")?,
                a.timestamp(2, "startDate")?,
                a.timestamp(3, "endDate")?,
            );
            let index = match function {
                "CalculateRainfallIndex" => engine.calculate_rainfall_index(
                    ctx,
                    window,
                    a.f64(4, "totalRainfall")?,
                    a.f64(5, "baselineRainfall")?,
                )?,
                "CalculateTemperatureIndex" => engine.calculate_temperature_index(
                    ctx,
                    window,
                    a.f64(4, "avgTemperature")?,
                    a.f64(5, "baselineTemperature")?,
                )?,
                _ => engine.calculate_drought_index(
                    ctx,
                    window,
                    a.u32(4, "consecutiveDryDays")?,
                    a.u32(5, "thresholdDays")?,
                )?,
            };
            to_value(index)
        }
        "StoreRegionalBaseline" => {
            a.expect(6, 6)?;
            to_value(baselines.store_regional_baseline(
                ctx,
                &a.string(0, "region")?,
                &a.string(1, "season")?,
                a.u32(2, "yearsOfData")?,
                a.f64(3, "rainfall")?,
                a.f64(4, "temperature")?,
                a.f64(5, "humidity")?,
            )?)
        }
        "GetRegionalBaseline" => {
            a.expect(2, 2)?;
            let region = a.string(0, "region")?;
            to_value(baselines.get_regional_baseline(ctx, &region, &a.string(1, "season")?)?)
        }
        "CompareToBaseline" => {
            a.expect(4, 4)?;
            to_value(baselines.compare_to_baseline(
                ctx,
                &a.string(0, "region")?,
                &a.string(1, "season")?,
                a.f64(2, "rainfall")?,
                a.f64(3, "temperature")?,
            )?)
        }
        "CalculatePayoutPercentage" => {
            a.expect(1, 1)?;
            to_value(engine.calculate_payout_percentage(&a.string(0, "severity")?)?)
        }
        "ValidateIndexTrigger" => {
            a.expect(1, 1)?;
            to_value(engine.validate_index_trigger(ctx, &a.string(0, "indexId")?)?)
        }
        "GetWeatherIndex" => {
            a.expect(1, 1)?;
            to_value(engine.get_weather_index(ctx, &a.string(0, "indexId")?)?)
        }
        "GetIndicesByLocation" => {
            a.expect(1, 1)?;
            to_value(engine.get_indices_by_location(ctx, &a.string(0, "location")?)?)
        }
        "GetTriggeredIndices" => {
            a.expect(0, 0)?;
            to_value(engine.get_triggered_indices(ctx)?)
        }

        "EvaluatePolicy" => {
            a.expect(4, 4)?;
            to_value(claims.evaluate_policy(
                ctx,
                &a.string(0, "claimId")?,
                &a.string(1, "policyId")?,
                &a.string(2, "indexId")?,
                a.decimal(3, "payoutPercent")?,
            )?)
        }
        "TriggerPayout" => {
            a.expect(6, 6)?;
            let req = TriggerRequest {
                claim_id: a.string(0, "claimId")?,
                policy_id: a.string(1, "policyId")?,
                farmer_id: a.string(2, "farmerId")?,
                index_id: a.string(3, "indexId")?,
                coverage_amount: a.decimal(4, "coverageAmount")?,
                payout_percent: a.decimal(5, "payoutPercent")?,
            };
            to_value(claims.trigger_payout(ctx, req)?)
        }
        "CalculatePayoutAmount" => {
            a.expect(2, 2)?;
            let coverage = a.decimal(0, "coverageAmount")?;
            to_value(claims.calculate_payout_amount(coverage, &a.string(1, "severity")?)?)
        }
        "HasDuplicateClaim" => {
            a.expect(2, 2)?;
            let policy_id = a.string(0, "policyId")?;
            to_value(claims.has_duplicate_claim(ctx, &policy_id, &a.string(1, "indexId")?)?)
        }
        "ApproveClaim" => {
            a.expect(1, 1)?;
            to_value(claims.approve_claim(ctx, &a.string(0, "claimId")?)?)
        }
        "RecordPayment" => {
            a.expect(2, 2)?;
            let claim_id = a.string(0, "claimId")?;
            to_value(claims.record_payment(ctx, &claim_id, &a.string(1, "paymentTxId")?)?)
        }
        "RejectClaim" => {
            a.expect(2, 2)?;
            to_value(claims.reject_claim(ctx, &a.string(0, "claimId")?, &a.string(1, "reason")?)?)
        }
        "GetClaim" => {
            a.expect(1, 1)?;
            to_value(claims.get_claim(ctx, &a.string(0, "claimId")?)?)
        }
        "GetClaimsByPolicy" => {
            a.expect(1, 1)?;
            to_value(claims.get_claims_by_policy(ctx, &a.string(0, "policyId")?)?)
        }
        "GetClaimHistory" => {
            a.expect(1, 1)?;
            to_value(claims.get_claim_history(ctx, &a.string(0, "farmerId")?)?)
        }
        "GetPendingClaims" => {
            a.expect(0, 0)?;
            to_value(claims.get_pending_claims(ctx)?)
        }
        "GetAllClaims" => {
            a.expect(0, 0)?;
            to_value(claims.get_all_claims(ctx)?)
        }
        "GenerateClaimReport" => {
            a.expect(1, 1)?;
            to_value(claims.generate_claim_report(ctx, &a.string(0, "claimId")?)?)
        }

        other => Err(CanopyError::invalid(format!("unknown function '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_common::{
        audit::{AuditSeverity, MemoryAuditSink},
        ErrorKind,
    };
    use canopy_ledger::StateStore;
    use serde_json::json;

    fn dispatcher() -> (Dispatcher, MemoryAuditSink) {
        let sink = MemoryAuditSink::new();
        let mut audit = AuditLogger::empty();
        audit.add_sink(Arc::new(sink.clone()));
        (
            Dispatcher::new(Ledger::in_memory(), Pipeline::default(), Arc::new(audit)),
            sink,
        )
    }

    #[test]
    fn test_submit_commits_and_audits() {
        let (d, sink) = dispatcher();
        let out = d
            .submit(
                "admin",
                "RegisterOracle",
                &[json!("sat-1"), json!("Sentinel"), json!("Satellite"), json!(["s2"])],
            )
            .unwrap();
        assert_eq!(out["oracleId"], "sat-1");
        assert_eq!(out["status"], "Active");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "RegisterOracle");
        assert_eq!(events[0].resource.as_deref(), Some("ORACLE_sat-1"));

        let fetched = d.evaluate("anyone", "GetOracle", &[json!("sat-1")]).unwrap();
        assert_eq!(fetched["providerName"], "Sentinel");
    }

    #[test]
    fn test_evaluate_discards_writes() {
        let (d, sink) = dispatcher();
        d.evaluate("admin", "RegisterOracle", &[json!("sat-1"), json!("S"), json!("API")])
            .unwrap();
        assert_eq!(d.ledger().store().height(), 0);
        assert!(sink.is_empty());
        let err = d.evaluate("anyone", "GetOracle", &[json!("sat-1")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_failed_submit_writes_nothing() {
        let (d, sink) = dispatcher();
        let err = d
            .submit(
                "admin",
                "StoreRegionalBaseline",
                &[
                    json!("Coast"),
                    json!("dry"),
                    json!(5),
                    json!(-3.0),
                    json!(20.0),
                    json!(50.0),
                ],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(d.ledger().store().height(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_anomaly_flag_is_audited_as_warning() {
        let (d, sink) = dispatcher();
        d.submit("admin", "RegisterOracle", &[json!("iot-1"), json!("FieldStation"), json!("IoT")])
            .unwrap();
        d.submit(
            "iot-1",
            "SubmitObservation",
            &[
                json!("OBS-1"),
                json!("iot-1"),
                json!("Nakuru"),
                json!(-0.3),
                json!(36.07),
                json!(40.0),
                json!(23.0),
                json!(55.0),
                json!(3.0),
            ],
        )
        .unwrap();
        assert!(sink.events().iter().all(|e| e.severity == AuditSeverity::Info));

        d.submit("auditor", "FlagAnomalousObservation", &[json!("OBS-1"), json!("stuck gauge")])
            .unwrap();

        let flagged: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.action == "FlagAnomalousObservation")
            .collect();
        assert_eq!(flagged.len(), 2);
        assert!(flagged.iter().all(|e| e.severity == AuditSeverity::Warning));
        let resources: Vec<_> = flagged.iter().filter_map(|e| e.resource.as_deref()).collect();
        assert!(resources.contains(&"OBS-1"));
        assert!(resources.contains(&"ORACLE_iot-1"));
    }

    #[test]
    fn test_warning_floor_drops_routine_writes() {
        let sink = MemoryAuditSink::new();
        let mut audit = AuditLogger::empty();
        audit.add_sink(Arc::new(sink.clone()));
        audit.set_min_severity(AuditSeverity::Warning);
        let d = Dispatcher::new(Ledger::in_memory(), Pipeline::default(), Arc::new(audit));

        d.submit("admin", "RegisterOracle", &[json!("sat-1"), json!("S"), json!("Satellite")])
            .unwrap();
        assert!(sink.is_empty());

        d.submit("admin", "SetOracleStatus", &[json!("sat-1"), json!("Suspended")])
            .unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource.as_deref(), Some("ORACLE_sat-1"));
        assert_eq!(events[0].details.get("status").map(String::as_str), Some("Suspended"));
    }

    #[test]
    fn test_unknown_function_and_bad_arity() {
        let (d, _) = dispatcher();
        let err = d.submit("x", "MintTokens", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = d.submit("x", "GetOracle", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_index_and_claim_functions() {
        let (d, _) = dispatcher();
        let idx = d
            .submit(
                "index-bot",
                "CalculateTemperatureIndex",
                &[
                    json!("IDX-T"),
                    json!("Nakuru"),
                    json!("2024-03-01T00:00:00Z"),
                    json!("2024-03-31T00:00:00Z"),
                    json!(24.0),
                    json!(20.0),
                ],
            )
            .unwrap();
        assert_eq!(idx["severity"], "Moderate");
        assert_eq!(idx["payoutTriggered"], true);

        let v = d.evaluate("x", "ValidateIndexTrigger", &[json!("IDX-T")]).unwrap();
        assert_eq!(v["isTriggered"], true);

        let claim = d
            .submit(
                "trigger-bot",
                "TriggerPayout",
                &[
                    json!("CLM-1"),
                    json!("POL-1"),
                    json!("farmer-1"),
                    json!("IDX-T"),
                    json!("1000"),
                    json!(50),
                ],
            )
            .unwrap();
        assert_eq!(claim["status"], "Approved");

        let dup = d.evaluate("x", "HasDuplicateClaim", &[json!("POL-1"), json!("IDX-T")]).unwrap();
        assert_eq!(dup, json!(true));
    }

    #[test]
    fn test_function_table_is_dispatchable() {
        let (d, _) = dispatcher();
        for name in FUNCTIONS {
            // wrong arity everywhere, but never "unknown function"
            let args: Vec<Value> = (1..=12).map(|i| json!(i)).collect();
            let err = d.evaluate("x", name, &args);
            if let Err(e) = err {
                assert!(!e.to_string().contains("unknown function"), "{}", name);
            }
        }
    }
}
