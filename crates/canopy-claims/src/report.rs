//! Claim queries and the plain-text claim report

use std::fmt::Write;

use canopy_common::{time::format_timestamp, Claim, Result};
use canopy_ledger::TxContext;
use serde_json::{json, Value};

use crate::trigger::ClaimsProcessor;

impl ClaimsProcessor {
    fn claims_where(&self, ctx: &TxContext, mut selector: Value) -> Result<Vec<Claim>> {
        selector["docType"] = Value::from("claim");
        ctx.query_docs(&json!({
            "selector": selector,
            "sort": [{"triggerDate": "asc"}]
        }))
    }

    pub fn get_claims_by_policy(&self, ctx: &TxContext, policy_id: &str) -> Result<Vec<Claim>> {
        self.claims_where(ctx, json!({"policyId": policy_id}))
    }

    /// Every claim raised for a farmer, oldest first
    pub fn get_claim_history(&self, ctx: &TxContext, farmer_id: &str) -> Result<Vec<Claim>> {
        self.claims_where(ctx, json!({"farmerId": farmer_id}))
    }

    pub fn get_pending_claims(&self, ctx: &TxContext) -> Result<Vec<Claim>> {
        self.claims_where(ctx, json!({"status": "Pending"}))
    }

    pub fn get_all_claims(&self, ctx: &TxContext) -> Result<Vec<Claim>> {
        self.claims_where(ctx, json!({}))
    }

    /// Human-readable summary of one claim
    pub fn generate_claim_report(&self, ctx: &mut TxContext, claim_id: &str) -> Result<String> {
        let claim = self.get_claim(ctx, claim_id)?;
        Ok(render_report(&claim))
    }
}

pub fn render_report(claim: &Claim) -> String {
    let mut out = String::new();
    let rows: [(&str, String); 12] = [
        ("Claim ID", claim.claim_id.clone()),
        ("Policy ID", claim.policy_id.clone()),
        ("Farmer ID", claim.farmer_id.clone()),
        ("Index ID", claim.index_id.clone()),
        ("Trigger Date", format_timestamp(&claim.trigger_date)),
        ("Coverage Amount", format!("{:.2}", claim.coverage_amount)),
        ("Payout Amount", format!("{:.2}", claim.payout_amount)),
        ("Payout Percent", format!("{:.2}%", claim.payout_percent)),
        ("Status", claim.status.to_string()),
        ("Approved By", claim.approved_by.clone().unwrap_or_else(|| "-".into())),
        (
            "Processed Date",
            claim
                .processed_date
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".into()),
        ),
        ("Payment Transaction", claim.payment_tx_id.clone().unwrap_or_else(|| "-".into())),
    ];

    let _ = writeln!(out, "CLAIM REPORT");
    let _ = writeln!(out, "============");
    for (label, value) in rows {
        let _ = writeln!(out, "{:<20} {}", format!("{}:", label), value);
    }
    let _ = writeln!(out, "{:<20} {}", "Notes:", claim.notes);
    out
}
