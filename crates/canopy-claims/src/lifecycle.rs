//! Claim lifecycle
//!
//! ```text
//! Pending ──approve──▶ Approved ──record_payment──▶ Paid
//!    │                    │
//!    └──────reject────────┴──────▶ Rejected
//! ```

use canopy_common::{CanopyError, Claim, ClaimStatus, Result};
use canopy_ledger::TxContext;
use tracing::{info, instrument};

use crate::trigger::ClaimsProcessor;

impl ClaimsProcessor {
    pub fn get_claim(&self, ctx: &mut TxContext, claim_id: &str) -> Result<Claim> {
        ctx.require_doc(claim_id, "claim")
    }

    /// Pending → Approved, recording the caller as approver
    #[instrument(skip(self, ctx))]
    pub fn approve_claim(&self, ctx: &mut TxContext, claim_id: &str) -> Result<Claim> {
        let mut claim = self.get_claim(ctx, claim_id)?;
        if claim.status != ClaimStatus::Pending {
            return Err(CanopyError::precondition(format!(
                "can only approve pending claims, {} is {}",
                claim_id, claim.status
            )));
        }
        claim.status = ClaimStatus::Approved;
        claim.approved_by = Some(ctx.creator().to_string());
        claim.processed_date = Some(ctx.timestamp());
        ctx.put_doc(claim_id, &claim)?;

        info!(approved_by = ctx.creator(), "Claim approved");
        Ok(claim)
    }

    /// Approved → Paid with the treasury's payment reference
    #[instrument(skip(self, ctx))]
    pub fn record_payment(
        &self,
        ctx: &mut TxContext,
        claim_id: &str,
        payment_tx_id: &str,
    ) -> Result<Claim> {
        if payment_tx_id.trim().is_empty() {
            return Err(CanopyError::invalid("payment reference must not be empty"));
        }
        let mut claim = self.get_claim(ctx, claim_id)?;
        if claim.status != ClaimStatus::Approved {
            return Err(CanopyError::precondition(format!(
                "can only record payment for approved claims, {} is {}",
                claim_id, claim.status
            )));
        }
        claim.status = ClaimStatus::Paid;
        claim.payment_tx_id = Some(payment_tx_id.to_string());
        claim.processed_date = Some(ctx.timestamp());
        ctx.put_doc(claim_id, &claim)?;

        info!(payout_amount = %claim.payout_amount, "Claim paid");
        Ok(claim)
    }

    /// Pending or Approved → Rejected; the reason is appended to the notes
    #[instrument(skip(self, ctx))]
    pub fn reject_claim(&self, ctx: &mut TxContext, claim_id: &str, reason: &str) -> Result<Claim> {
        let mut claim = self.get_claim(ctx, claim_id)?;
        if claim.is_settled() {
            return Err(CanopyError::precondition(format!(
                "claim {} is already {}",
                claim_id, claim.status
            )));
        }
        claim.status = ClaimStatus::Rejected;
        claim.processed_date = Some(ctx.timestamp());
        if !reason.is_empty() {
            if !claim.notes.is_empty() {
                claim.notes.push_str("; ");
            }
            claim.notes.push_str("Rejected: ");
            claim.notes.push_str(reason);
        }
        ctx.put_doc(claim_id, &claim)?;

        info!(reason, "Claim rejected");
        Ok(claim)
    }
}
