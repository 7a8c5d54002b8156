//! Claim - one payout event tied to a policy and a triggering index

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Approved => "Approved",
            ClaimStatus::Paid => "Paid",
            ClaimStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub claim_id: String,
    pub policy_id: String,
    pub farmer_id: String,
    pub index_id: String,
    pub trigger_date: DateTime<Utc>,
    pub coverage_amount: Decimal,
    pub payout_amount: Decimal,
    pub payout_percent: Decimal,
    pub status: ClaimStatus,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub processed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_tx_id: Option<String>,
    pub notes: String,
}

impl Document for Claim {
    const DOC_TYPE: &'static str = "claim";
}

impl Claim {
    /// Whether the claim has reached a terminal state
    pub fn is_settled(&self) -> bool {
        matches!(self.status, ClaimStatus::Paid | ClaimStatus::Rejected)
    }
}
