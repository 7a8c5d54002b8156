//! External collaborators consumed by the payout orchestrator
//!
//! - [`PolicyRegistry`]: active policies and their coverage; told about
//!   every triggered claim
//! - [`PayoutLedger`]: executes the fund transfer for an approved claim and
//!   returns the payment reference recorded back onto the claim
//!
//! In-memory implementations back tests and single-node deployments.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use canopy_common::{CanopyError, Claim, ClaimStatus, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyStatus {
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsurancePolicy {
    pub policy_id: String,
    pub farmer_id: String,
    pub farm_location: String,
    /// Baseline region
    pub region: String,
    /// Baseline season; the orchestrator default when absent
    #[serde(default)]
    pub season: Option<String>,
    pub coverage_amount: Decimal,
    pub status: PolicyStatus,
}

impl InsurancePolicy {
    pub fn is_active(&self) -> bool {
        self.status == PolicyStatus::Active
    }
}

#[async_trait]
pub trait PolicyRegistry: Send + Sync {
    async fn active_policies(&self) -> Result<Vec<InsurancePolicy>>;

    /// Notification that a claim was raised against a policy
    async fn claim_triggered(&self, _claim: &Claim) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait PayoutLedger: Send + Sync {
    /// Transfer the claim's payout; returns the payment reference
    async fn execute_payout(&self, claim: &Claim) -> Result<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryPolicyRegistry {
    policies: DashMap<String, InsurancePolicy>,
    claims: DashMap<String, Vec<String>>,
}

impl InMemoryPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from a JSON array of policies
    pub fn from_json(raw: &str) -> Result<Self> {
        let policies: Vec<InsurancePolicy> = serde_json::from_str(raw)?;
        let registry = Self::new();
        for policy in policies {
            registry.upsert(policy);
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&raw)?;
        info!(path = %path.display(), policies = registry.len(), "Insurance policies loaded");
        Ok(registry)
    }

    pub fn upsert(&self, policy: InsurancePolicy) {
        self.policies.insert(policy.policy_id.clone(), policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Claim ids reported for a policy
    pub fn claims_for(&self, policy_id: &str) -> Vec<String> {
        self.claims
            .get(policy_id)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PolicyRegistry for InMemoryPolicyRegistry {
    async fn active_policies(&self) -> Result<Vec<InsurancePolicy>> {
        let mut active: Vec<InsurancePolicy> = self
            .policies
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.value().clone())
            .collect();
        active.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
        Ok(active)
    }

    async fn claim_triggered(&self, claim: &Claim) -> Result<()> {
        self.claims
            .entry(claim.policy_id.clone())
            .or_default()
            .push(claim.claim_id.clone());
        Ok(())
    }
}

/// A completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutTransfer {
    pub payment_ref: String,
    pub claim_id: String,
    pub farmer_id: String,
    pub amount: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Premium pool held in memory. Unlimited unless built with a balance.
pub struct InMemoryPayoutLedger {
    transfers: DashMap<String, PayoutTransfer>,
    pool: Mutex<Option<Decimal>>,
}

impl InMemoryPayoutLedger {
    pub fn new() -> Self {
        Self {
            transfers: DashMap::new(),
            pool: Mutex::new(None),
        }
    }

    pub fn with_balance(balance: Decimal) -> Self {
        Self {
            transfers: DashMap::new(),
            pool: Mutex::new(Some(balance)),
        }
    }

    pub async fn balance(&self) -> Option<Decimal> {
        *self.pool.lock().await
    }

    pub fn transfer(&self, claim_id: &str) -> Option<PayoutTransfer> {
        self.transfers.get(claim_id).map(|t| t.value().clone())
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }
}

impl Default for InMemoryPayoutLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayoutLedger for InMemoryPayoutLedger {
    async fn execute_payout(&self, claim: &Claim) -> Result<String> {
        if claim.status != ClaimStatus::Approved {
            return Err(CanopyError::precondition(format!(
                "claim {} is {}, not Approved",
                claim.claim_id, claim.status
            )));
        }
        let mut pool = self.pool.lock().await;
        // one transfer per claim; a retry returns the first reference
        if let Some(existing) = self.transfers.get(&claim.claim_id) {
            return Ok(existing.payment_ref.clone());
        }
        if let Some(balance) = pool.as_mut() {
            if *balance < claim.payout_amount {
                return Err(CanopyError::precondition(format!(
                    "premium pool balance {} below payout {}",
                    balance, claim.payout_amount
                )));
            }
            *balance -= claim.payout_amount;
        }

        let transfer = PayoutTransfer {
            payment_ref: format!("TX_PAYOUT_{}", Uuid::now_v7().simple()),
            claim_id: claim.claim_id.clone(),
            farmer_id: claim.farmer_id.clone(),
            amount: claim.payout_amount,
            executed_at: Utc::now(),
        };
        let payment_ref = transfer.payment_ref.clone();
        self.transfers.insert(claim.claim_id.clone(), transfer);

        info!(
            claim_id = %claim.claim_id,
            amount = %claim.payout_amount,
            %payment_ref,
            "Payout executed"
        );
        Ok(payment_ref)
    }
}

/// Shared handles, as the orchestrator holds them
pub type SharedPolicyRegistry = Arc<dyn PolicyRegistry>;
pub type SharedPayoutLedger = Arc<dyn PayoutLedger>;
