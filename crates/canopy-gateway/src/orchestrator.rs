//! Automatic payout orchestrator
//!
//! For each `ConsensusReached` event:
//! 1. Fetch active policies; keep those whose farm location matches the
//!    event location (case, spaces, `_` and `-` ignored; either contains
//!    the other)
//! 2. Per (region, season) of the matched policies, compute a rainfall and
//!    a temperature index from the agreed readings against the baseline
//! 3. Per policy and per index that fires with a positive payout percent:
//!    skip if a claim already exists, otherwise trigger it, execute the
//!    payout and record the payment reference
//!
//! Every step is its own transaction. Failures are collected per policy
//! and never stop the batch.

use std::collections::HashMap;
use std::sync::Arc;

use canopy_claims::TriggerRequest;
use canopy_common::{
    time::parse_timestamp, CanopyError, ClaimStatus, Result, WeatherIndex,
    CONSENSUS_REACHED_EVENT,
};
use canopy_index::IndexWindow;
use canopy_ledger::LedgerEvent;
use canopy_oracle::ConsensusReachedEvent;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{InsurancePolicy, PayoutLedger, PolicyRegistry};
use crate::config::OrchestratorConfig;
use crate::dispatch::Dispatcher;

fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loose location match between a policy's farm and a consensus location
pub fn locations_match(farm_location: &str, event_location: &str) -> bool {
    let farm = normalize_location(farm_location);
    let event = normalize_location(event_location);
    if farm.is_empty() || event.is_empty() {
        return false;
    }
    farm.contains(&event) || event.contains(&farm)
}

/// Outcome of processing one consensus event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReport {
    pub location: String,
    pub policies_checked: usize,
    pub thresholds_breached: usize,
    pub indices: Vec<String>,
    pub claims_triggered: Vec<String>,
    pub duplicates_skipped: usize,
    pub errors: Vec<String>,
}

pub struct PayoutOrchestrator {
    dispatcher: Dispatcher,
    policies: Arc<dyn PolicyRegistry>,
    payouts: Arc<dyn PayoutLedger>,
    config: OrchestratorConfig,
}

impl PayoutOrchestrator {
    pub fn new(
        dispatcher: Dispatcher,
        policies: Arc<dyn PolicyRegistry>,
        payouts: Arc<dyn PayoutLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            dispatcher,
            policies,
            payouts,
            config,
        }
    }

    /// Consume committed events until the bus closes
    pub async fn run(self, mut events: broadcast::Receiver<LedgerEvent>) {
        info!("Payout orchestrator started");
        loop {
            match events.recv().await {
                Ok(event) if event.name == CONSENSUS_REACHED_EVENT => {
                    match serde_json::from_value::<ConsensusReachedEvent>(event.payload) {
                        Ok(reached) => {
                            let report = self.process(&reached).await;
                            info!(
                                location = %report.location,
                                policies_checked = report.policies_checked,
                                thresholds_breached = report.thresholds_breached,
                                claims_triggered = report.claims_triggered.len(),
                                errors = report.errors.len(),
                                "Automatic payout processing complete"
                            );
                        }
                        Err(e) => warn!(
                            tx_id = %event.tx_id,
                            error = %e,
                            "Malformed ConsensusReached payload"
                        ),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Payout orchestrator lagged behind the event bus")
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Payout orchestrator stopped");
    }

    /// Process one consensus event
    #[instrument(skip(self, event), fields(location = %event.location, run = event.run))]
    pub async fn process(&self, event: &ConsensusReachedEvent) -> PayoutReport {
        let mut report = PayoutReport {
            location: event.location.clone(),
            ..PayoutReport::default()
        };

        let at = match parse_timestamp(&event.timestamp) {
            Ok(at) => at,
            Err(e) => {
                report.errors.push(e.to_string());
                return report;
            }
        };
        let policies = match self.policies.active_policies().await {
            Ok(p) => p,
            Err(e) => {
                report.errors.push(format!("policy registry: {}", e));
                return report;
            }
        };

        let matched: Vec<InsurancePolicy> = policies
            .into_iter()
            .filter(|p| p.is_active() && locations_match(&p.farm_location, &event.location))
            .collect();
        report.policies_checked = matched.len();
        if matched.is_empty() {
            debug!("No policies in affected location");
            return report;
        }

        let mut indices: HashMap<(String, String), std::result::Result<Vec<WeatherIndex>, String>> =
            HashMap::new();

        for policy in &matched {
            let season = policy
                .season
                .clone()
                .unwrap_or_else(|| self.config.default_season.clone());
            let key = (policy.region.clone(), season);

            let computed = indices.entry(key.clone()).or_insert_with(|| {
                let result = self.compute_indices(event, at, &key.0, &key.1);
                if let Ok(list) = &result {
                    report.indices.extend(list.iter().map(|i| i.index_id.clone()));
                }
                result.map_err(|e| e.to_string())
            });
            let list = match computed {
                Ok(list) => list.clone(),
                Err(e) => {
                    report.errors.push(format!("policy {}: {}", policy.policy_id, e));
                    continue;
                }
            };

            for index in list.iter().filter(|i| i.payout_triggered) {
                let percent = index.severity.payout_percent();
                if percent <= Decimal::ZERO {
                    continue;
                }
                report.thresholds_breached += 1;
                warn!(
                    policy_id = %policy.policy_id,
                    index_id = %index.index_id,
                    severity = %index.severity,
                    "Payout threshold breached"
                );

                match self.settle(policy, index, percent).await {
                    Ok(Some(claim_id)) => report.claims_triggered.push(claim_id),
                    Ok(None) => report.duplicates_skipped += 1,
                    Err(e) => report.errors.push(format!(
                        "policy {} index {}: {}",
                        policy.policy_id, index.index_id, e
                    )),
                }
            }
        }
        report
    }

    /// Rainfall and temperature indices for one run at one location against
    /// one baseline; a replayed event reuses the stored indices
    fn compute_indices(
        &self,
        event: &ConsensusReachedEvent,
        at: DateTime<Utc>,
        region: &str,
        season: &str,
    ) -> Result<Vec<WeatherIndex>> {
        let stem = format!(
            "{}_{}_{}_{}_{}",
            event.location,
            region,
            season,
            at.timestamp(),
            event.run
        );
        let rain_id = format!("IDX_RAINFALL_{}", stem);
        let temp_id = format!("IDX_TEMPERATURE_{}", stem);
        let start = at - Duration::days(self.config.window_days.max(0));

        self.dispatcher
            .transact(&self.config.caller, "CalculateIndices", |ctx, pipeline| {
                let engine = &pipeline.index.engine;
                let baseline = pipeline
                    .index
                    .baselines
                    .get_regional_baseline(ctx, region, season)?;

                let rainfall = if ctx.exists(&rain_id)? {
                    engine.get_weather_index(ctx, &rain_id)?
                } else if baseline.rainfall.mean > 0.0 {
                    engine.calculate_rainfall_index(
                        ctx,
                        IndexWindow::new(rain_id.clone(), event.location.clone(), start, at),
                        event.rainfall,
                        baseline.rainfall.mean,
                    )?
                } else {
                    return Err(CanopyError::precondition(format!(
                        "baseline {} has no rainfall mean",
                        baseline.baseline_id
                    )));
                };

                let temperature = if ctx.exists(&temp_id)? {
                    engine.get_weather_index(ctx, &temp_id)?
                } else {
                    engine.calculate_temperature_index(
                        ctx,
                        IndexWindow::new(temp_id.clone(), event.location.clone(), start, at),
                        event.temperature,
                        baseline.temperature.mean,
                    )?
                };
                Ok(vec![rainfall, temperature])
            })
    }

    /// Trigger, pay and record one claim; `None` when the pair already has
    /// a claim that needs nothing more. An automatic claim left Approved by
    /// a failed transfer is paid on the next pass.
    async fn settle(
        &self,
        policy: &InsurancePolicy,
        index: &WeatherIndex,
        percent: Decimal,
    ) -> Result<Option<String>> {
        let caller = &self.config.caller;
        let claim_id = format!("CLAIM_AUTO_{}_{}", policy.policy_id, index.index_id);

        let pending = self.dispatcher.transact(caller, "TriggerPayout", |ctx, pipeline| {
            if pipeline
                .claims
                .has_duplicate_claim(ctx, &policy.policy_id, &index.index_id)?
            {
                if ctx.exists(&claim_id)? {
                    let existing = pipeline.claims.get_claim(ctx, &claim_id)?;
                    if existing.status == ClaimStatus::Approved {
                        return Ok(Some((existing, false)));
                    }
                }
                return Ok(None);
            }
            let claim = pipeline.claims.trigger_payout(
                ctx,
                TriggerRequest {
                    claim_id: claim_id.clone(),
                    policy_id: policy.policy_id.clone(),
                    farmer_id: policy.farmer_id.clone(),
                    index_id: index.index_id.clone(),
                    coverage_amount: policy.coverage_amount,
                    payout_percent: percent,
                },
            )?;
            Ok(Some((claim, true)))
        })?;

        let Some((claim, created)) = pending else {
            info!(
                policy_id = %policy.policy_id,
                index_id = %index.index_id,
                "Claim already exists, skipping"
            );
            return Ok(None);
        };

        if created {
            if let Err(e) = self.policies.claim_triggered(&claim).await {
                warn!(
                    claim_id = %claim.claim_id,
                    error = %e,
                    "Policy registry notification failed"
                );
            }
        } else {
            info!(claim_id = %claim.claim_id, "Retrying payout for approved claim");
        }

        let payment_ref = self.payouts.execute_payout(&claim).await?;
        self.dispatcher.transact(caller, "RecordPayment", |ctx, pipeline| {
            pipeline
                .claims
                .record_payment(ctx, &claim.claim_id, &payment_ref)
        })?;

        info!(
            claim_id = %claim.claim_id,
            payout_amount = %claim.payout_amount,
            %payment_ref,
            "Automatic claim paid"
        );
        Ok(Some(claim.claim_id))
    }
}
