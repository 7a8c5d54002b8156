//! Oracle Registry - authorized data sources and their trust state
//!
//! The registry is the only writer of [`OracleProvider`] records. Other
//! components go through its public operations:
//! - [`OracleRegistry::update_reputation`] after every submission outcome
//! - [`OracleRegistry::record_submission`] when an observation is accepted

use canopy_common::{CanopyError, OracleProvider, ProviderStatus, ProviderType, Result};
use canopy_ledger::{keys, TxContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Providers whose reputation falls below this are suspended
    pub suspension_threshold: f64,
    /// Reputation assigned at registration
    pub initial_reputation: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            suspension_threshold: 70.0,
            initial_reputation: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OracleRegistry {
    config: RegistryConfig,
}

impl OracleRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new Active provider
    #[instrument(skip(self, ctx, data_sources))]
    pub fn register_oracle(
        &self,
        ctx: &mut TxContext,
        oracle_id: &str,
        provider_name: &str,
        provider_type: &str,
        data_sources: Vec<String>,
    ) -> Result<OracleProvider> {
        if oracle_id.trim().is_empty() {
            return Err(CanopyError::invalid("oracle id must not be empty"));
        }
        let key = keys::oracle(oracle_id);
        if ctx.exists(&key)? {
            return Err(CanopyError::AlreadyExists(format!("oracle {}", oracle_id)));
        }
        let provider_type: ProviderType = provider_type.parse()?;

        let provider = OracleProvider::new(
            oracle_id,
            provider_name,
            provider_type,
            data_sources,
            self.config.initial_reputation,
            ctx.timestamp(),
        );
        ctx.put_doc(key, &provider)?;

        info!(oracle_id, provider_type = %provider_type, "Oracle provider registered");
        Ok(provider)
    }

    pub fn get_oracle(&self, ctx: &mut TxContext, oracle_id: &str) -> Result<OracleProvider> {
        ctx.get_doc(&keys::oracle(oracle_id))?
            .ok_or_else(|| CanopyError::not_found(format!("oracle {}", oracle_id)))
    }

    pub fn get_oracle_reputation(&self, ctx: &mut TxContext, oracle_id: &str) -> Result<f64> {
        Ok(self.get_oracle(ctx, oracle_id)?.reputation_score)
    }

    /// All registered providers, in id order
    pub fn list_oracles(&self, ctx: &TxContext) -> Result<Vec<OracleProvider>> {
        ctx.scan_prefix(keys::ORACLE_PREFIX)?
            .into_iter()
            .map(|(_, v)| serde_json::from_value(v).map_err(CanopyError::from))
            .collect()
    }

    /// Record one submission outcome and recompute reputation.
    ///
    /// Suspension is one-way here; only [`Self::set_provider_status`]
    /// brings a provider back.
    #[instrument(skip(self, ctx))]
    pub fn update_reputation(
        &self,
        ctx: &mut TxContext,
        oracle_id: &str,
        anomalous: bool,
    ) -> Result<OracleProvider> {
        let mut provider = self.get_oracle(ctx, oracle_id)?;
        let suspended = provider.record_outcome(anomalous, self.config.suspension_threshold);
        ctx.put_doc(keys::oracle(oracle_id), &provider)?;

        if suspended {
            warn!(
                oracle_id,
                reputation = provider.reputation_score,
                threshold = self.config.suspension_threshold,
                "Oracle provider suspended"
            );
        }
        Ok(provider)
    }

    /// Stamp the provider's last-submission time
    pub fn record_submission(
        &self,
        ctx: &mut TxContext,
        oracle_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut provider = self.get_oracle(ctx, oracle_id)?;
        provider.last_submission = Some(at);
        ctx.put_doc(keys::oracle(oracle_id), &provider)
    }

    /// Administrative status change. Revocation is final.
    #[instrument(skip(self, ctx))]
    pub fn set_provider_status(
        &self,
        ctx: &mut TxContext,
        oracle_id: &str,
        status: &str,
    ) -> Result<OracleProvider> {
        let status: ProviderStatus = status.parse()?;
        let mut provider = self.get_oracle(ctx, oracle_id)?;

        if provider.status == ProviderStatus::Revoked && status != ProviderStatus::Revoked {
            return Err(CanopyError::precondition(format!(
                "oracle {} is revoked",
                oracle_id
            )));
        }

        let previous = provider.status;
        provider.status = status;
        ctx.put_doc(keys::oracle(oracle_id), &provider)?;

        info!(oracle_id, from = %previous, to = %status, "Oracle provider status changed");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_common::{types::oracle::reputation_for, ErrorKind};
    use canopy_ledger::Ledger;
    use proptest::prelude::*;

    fn registered(ledger: &Ledger, registry: &OracleRegistry, id: &str) {
        let mut ctx = ledger.begin("admin");
        registry
            .register_oracle(&mut ctx, id, "Provider", "Satellite", vec!["s1".into()])
            .unwrap();
        ctx.commit().unwrap();
    }

    #[test]
    fn test_register_and_get() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        registered(&ledger, &registry, "sat-1");

        let mut ctx = ledger.begin("anyone");
        let p = registry.get_oracle(&mut ctx, "sat-1").unwrap();
        assert_eq!(p.reputation_score, 100.0);
        assert_eq!(p.status, ProviderStatus::Active);
        assert_eq!(p.total_submissions, 0);
        assert!(p.last_submission.is_none());
    }

    #[test]
    fn test_register_rejects_duplicate_and_bad_type() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        registered(&ledger, &registry, "sat-1");

        let mut ctx = ledger.begin("admin");
        let err = registry
            .register_oracle(&mut ctx, "sat-1", "Again", "API", vec![])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = registry
            .register_oracle(&mut ctx, "drone-1", "Drone", "Drone", vec![])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_get_missing_oracle() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        let mut ctx = ledger.begin("anyone");
        assert_eq!(
            registry.get_oracle(&mut ctx, "ghost").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_reputation_updates_persist_and_suspend() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        registered(&ledger, &registry, "iot-1");

        // 3 clean, 2 anomalous: 60 < 70
        let mut ctx = ledger.begin("consensus");
        for anomalous in [false, false, false, true] {
            registry.update_reputation(&mut ctx, "iot-1", anomalous).unwrap();
        }
        let p = registry.update_reputation(&mut ctx, "iot-1", true).unwrap();
        ctx.commit().unwrap();

        assert_eq!(p.total_submissions, 5);
        assert_eq!(p.anomaly_count, 2);
        assert!((p.reputation_score - 60.0).abs() < 1e-9);
        assert_eq!(p.status, ProviderStatus::Suspended);

        let mut ctx = ledger.begin("anyone");
        assert!((registry.get_oracle_reputation(&mut ctx, "iot-1").unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_admin_resume_and_revoke() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        registered(&ledger, &registry, "man-1");

        let mut ctx = ledger.begin("admin");
        registry.update_reputation(&mut ctx, "man-1", true).unwrap();
        let resumed = registry.set_provider_status(&mut ctx, "man-1", "Active").unwrap();
        assert_eq!(resumed.status, ProviderStatus::Active);

        registry.set_provider_status(&mut ctx, "man-1", "Revoked").unwrap();
        let err = registry.set_provider_status(&mut ctx, "man-1", "Active").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        assert!(registry.set_provider_status(&mut ctx, "man-1", "Paused").is_err());
    }

    #[test]
    fn test_list_oracles() {
        let ledger = Ledger::in_memory();
        let registry = OracleRegistry::default();
        registered(&ledger, &registry, "b");
        registered(&ledger, &registry, "a");

        let ctx = ledger.begin("anyone");
        let ids: Vec<_> = registry
            .list_oracles(&ctx)
            .unwrap()
            .into_iter()
            .map(|p| p.oracle_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    fn outcome_runs() -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 1..60)
    }

    fn fresh_provider(kind: ProviderType) -> OracleProvider {
        OracleProvider::new("p", "P", kind, vec![], 100.0, Utc::now())
    }

    proptest! {
        #[test]
        fn prop_reputation_matches_formula(outcomes in outcome_runs()) {
            let mut provider = fresh_provider(ProviderType::Api);
            for anomalous in &outcomes {
                provider.record_outcome(*anomalous, 70.0);
            }
            let n = outcomes.len() as u64;
            let a = outcomes.iter().filter(|x| **x).count() as u64;
            let expected = 100.0 * (n - a) as f64 / n as f64;
            prop_assert!((provider.reputation_score - expected).abs() < 1e-9);
            prop_assert!(provider.reputation_score >= 0.0);
        }

        #[test]
        fn prop_more_anomalies_never_raise_score(n in 1u64..500, a in 0u64..500) {
            let a = a.min(n);
            prop_assert!(reputation_for(n, a) >= reputation_for(n, (a + 1).min(n)));
        }

        #[test]
        fn prop_suspended_iff_dipped_below_threshold(outcomes in outcome_runs()) {
            let mut provider = fresh_provider(ProviderType::Iot);
            let mut dipped = false;
            for anomalous in &outcomes {
                provider.record_outcome(*anomalous, 70.0);
                dipped |= provider.reputation_score < 70.0;
            }
            prop_assert_eq!(provider.status == ProviderStatus::Suspended, dipped);
        }
    }
}
