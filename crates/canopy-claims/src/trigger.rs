//! Claim Trigger - creates auto-approved claims from triggered indices
//!
//! A (policy, index) pair pays at most once. The `CLAIMREF_` marker for the
//! pair is read and written inside the trigger transaction, so of two
//! concurrent triggers for one pair exactly one commits; the other fails
//! the version check with `Conflict`.

use canopy_common::{CanopyError, Claim, ClaimStatus, Result, Severity};
use canopy_ledger::{keys, TxContext};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

/// `docType` of the uniqueness marker
pub const CLAIM_REF_DOC_TYPE: &str = "claimRef";

/// Arguments of a payout trigger
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub claim_id: String,
    pub policy_id: String,
    pub farmer_id: String,
    pub index_id: String,
    pub coverage_amount: Decimal,
    /// Percent of coverage, 0..=100
    pub payout_percent: Decimal,
}

/// `coverage × percent / 100`, to the cent
pub fn payout_amount(coverage: Decimal, percent: Decimal) -> Result<Decimal> {
    coverage
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(|v| v.round_dp(2))
        .ok_or_else(|| CanopyError::invalid("payout amount overflow"))
}

fn check_percent(percent: Decimal) -> Result<()> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(CanopyError::invalid(format!(
            "invalid payout percentage: {}",
            percent
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ClaimsProcessor;

impl ClaimsProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Pre-check: claim id unused and percent within range
    pub fn evaluate_policy(
        &self,
        ctx: &mut TxContext,
        claim_id: &str,
        policy_id: &str,
        index_id: &str,
        payout_percent: Decimal,
    ) -> Result<bool> {
        if claim_id.trim().is_empty() || policy_id.trim().is_empty() || index_id.trim().is_empty() {
            return Err(CanopyError::invalid("claim, policy and index ids must not be empty"));
        }
        if ctx.exists(claim_id)? {
            return Err(CanopyError::AlreadyExists(format!("claim {}", claim_id)));
        }
        check_percent(payout_percent)?;
        Ok(true)
    }

    /// Payout for a severity; `None` pays nothing and is rejected
    pub fn calculate_payout_amount(&self, coverage: Decimal, severity: &str) -> Result<Decimal> {
        let severity: Severity = severity.parse()?;
        if severity == Severity::None {
            return Err(CanopyError::invalid("invalid severity: None"));
        }
        payout_amount(coverage, severity.payout_percent())
    }

    /// Advisory check over committed claims
    pub fn has_duplicate_claim(
        &self,
        ctx: &TxContext,
        policy_id: &str,
        index_id: &str,
    ) -> Result<bool> {
        let hits = ctx.query(&json!({
            "selector": {"docType": "claim", "policyId": policy_id, "indexId": index_id},
            "limit": 1
        }))?;
        Ok(!hits.is_empty())
    }

    /// Create a claim for a triggered index and approve it at once
    #[instrument(
        skip(self, ctx, req),
        fields(
            claim_id = %req.claim_id,
            policy_id = %req.policy_id,
            index_id = %req.index_id
        )
    )]
    pub fn trigger_payout(&self, ctx: &mut TxContext, req: TriggerRequest) -> Result<Claim> {
        self.evaluate_policy(
            ctx,
            &req.claim_id,
            &req.policy_id,
            &req.index_id,
            req.payout_percent,
        )?;
        if req.farmer_id.trim().is_empty() {
            return Err(CanopyError::invalid("farmer id must not be empty"));
        }

        let amount = payout_amount(req.coverage_amount, req.payout_percent)?;
        if amount <= Decimal::ZERO {
            return Err(CanopyError::precondition(format!(
                "payout amount must be positive, got {}",
                amount
            )));
        }

        let marker = keys::claim_ref(&req.policy_id, &req.index_id);
        if let Some(existing) = ctx.get_state(&marker)? {
            warn!(existing = %existing["claimId"], "Duplicate claim rejected");
            return Err(CanopyError::precondition(format!(
                "claim already exists for policy {} and index {}",
                req.policy_id, req.index_id
            )));
        }

        let approver = ctx.creator().to_string();
        let claim = Claim {
            claim_id: req.claim_id,
            policy_id: req.policy_id,
            farmer_id: req.farmer_id,
            notes: format!("Auto-triggered by index {}", req.index_id),
            index_id: req.index_id,
            trigger_date: ctx.timestamp(),
            coverage_amount: req.coverage_amount,
            payout_amount: amount,
            payout_percent: req.payout_percent,
            status: ClaimStatus::Approved,
            approved_by: Some(approver),
            processed_date: Some(ctx.timestamp()),
            payment_tx_id: None,
        };
        ctx.put_doc(claim.claim_id.clone(), &claim)?;
        ctx.put_state(
            marker,
            json!({"docType": CLAIM_REF_DOC_TYPE, "claimId": claim.claim_id}),
        );

        info!(
            payout_amount = %claim.payout_amount,
            farmer_id = %claim.farmer_id,
            "Claim triggered and approved"
        );
        Ok(claim)
    }
}
