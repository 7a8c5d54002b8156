//! Index Engine - turns a measurement window into a persisted WeatherIndex
//!
//! Every calculation writes its record whether or not payout fires; the
//! trigger flag and the severity are both kept so downstream callers can
//! ask "does it pay" and "how much" separately.

use canopy_common::{
    CanopyError, IndexType, Result, Severity, TriggerValidation, WeatherIndex,
};
use canopy_ledger::TxContext;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::thresholds::{Assessment, IndexThresholds};

/// Identity and time window shared by every index calculation
#[derive(Debug, Clone)]
pub struct IndexWindow {
    pub index_id: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IndexWindow {
    pub fn new(
        index_id: impl Into<String>,
        location: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            index_id: index_id.into(),
            location: location.into(),
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexEngine {
    thresholds: IndexThresholds,
}

impl IndexEngine {
    pub fn new(thresholds: IndexThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &IndexThresholds {
        &self.thresholds
    }

    /// Rainfall deficit index; `baseline_rainfall` must be positive
    #[instrument(
        skip(self, ctx, window),
        fields(index_id = %window.index_id, location = %window.location)
    )]
    pub fn calculate_rainfall_index(
        &self,
        ctx: &mut TxContext,
        window: IndexWindow,
        total_rainfall: f64,
        baseline_rainfall: f64,
    ) -> Result<WeatherIndex> {
        if !total_rainfall.is_finite() || total_rainfall < 0.0 {
            return Err(CanopyError::invalid(format!("invalid rainfall: {}", total_rainfall)));
        }
        if !baseline_rainfall.is_finite() || baseline_rainfall <= 0.0 {
            return Err(CanopyError::invalid(format!(
                "baseline rainfall must be positive, got {}",
                baseline_rainfall
            )));
        }
        let assessment = self.thresholds.assess_rainfall(total_rainfall, baseline_rainfall);
        self.record(ctx, window, IndexType::Rainfall, total_rainfall, baseline_rainfall, assessment)
    }

    /// Heat/cold stress index in absolute degrees
    #[instrument(
        skip(self, ctx, window),
        fields(index_id = %window.index_id, location = %window.location)
    )]
    pub fn calculate_temperature_index(
        &self,
        ctx: &mut TxContext,
        window: IndexWindow,
        avg_temperature: f64,
        baseline_temperature: f64,
    ) -> Result<WeatherIndex> {
        if !avg_temperature.is_finite() || !baseline_temperature.is_finite() {
            return Err(CanopyError::invalid("temperatures must be finite"));
        }
        let assessment = self
            .thresholds
            .assess_temperature(avg_temperature, baseline_temperature);
        self.record(
            ctx,
            window,
            IndexType::Temperature,
            avg_temperature,
            baseline_temperature,
            assessment,
        )
    }

    /// Consecutive-dry-days index; `threshold_days` must be at least 1
    #[instrument(
        skip(self, ctx, window),
        fields(index_id = %window.index_id, location = %window.location)
    )]
    pub fn calculate_drought_index(
        &self,
        ctx: &mut TxContext,
        window: IndexWindow,
        consecutive_dry_days: u32,
        threshold_days: u32,
    ) -> Result<WeatherIndex> {
        if threshold_days == 0 {
            return Err(CanopyError::invalid("drought threshold must be at least 1 day"));
        }
        let assessment = self
            .thresholds
            .assess_drought(consecutive_dry_days, threshold_days);
        self.record(
            ctx,
            window,
            IndexType::Drought,
            f64::from(consecutive_dry_days),
            f64::from(threshold_days),
            assessment,
        )
    }

    fn record(
        &self,
        ctx: &mut TxContext,
        window: IndexWindow,
        index_type: IndexType,
        calculated_value: f64,
        baseline_value: f64,
        assessment: Assessment,
    ) -> Result<WeatherIndex> {
        if window.index_id.trim().is_empty() {
            return Err(CanopyError::invalid("index id must not be empty"));
        }
        if window.start > window.end {
            return Err(CanopyError::invalid("start date is after end date"));
        }
        if ctx.exists(&window.index_id)? {
            return Err(CanopyError::AlreadyExists(format!("index {}", window.index_id)));
        }

        let index = WeatherIndex {
            index_id: window.index_id,
            location: window.location,
            index_type,
            start_date: window.start,
            end_date: window.end,
            calculated_value,
            baseline_value,
            deviation: assessment.deviation,
            severity: assessment.severity,
            payout_triggered: assessment.triggered,
            calculated_at: ctx.timestamp(),
        };
        ctx.put_doc(index.index_id.clone(), &index)?;

        info!(
            index_type = %index.index_type,
            deviation = index.deviation,
            severity = %index.severity,
            payout_triggered = index.payout_triggered,
            "Weather index calculated"
        );
        Ok(index)
    }

    /// Share of coverage paid at a severity, in percent
    pub fn calculate_payout_percentage(&self, severity: &str) -> Result<Decimal> {
        Ok(severity.parse::<Severity>()?.payout_percent())
    }

    /// Trigger flag of a stored index with the payout it implies
    pub fn validate_index_trigger(
        &self,
        ctx: &mut TxContext,
        index_id: &str,
    ) -> Result<TriggerValidation> {
        let index = self.get_weather_index(ctx, index_id)?;
        Ok(if index.payout_triggered {
            TriggerValidation {
                is_triggered: true,
                payout_percent: index.severity.payout_percent(),
            }
        } else {
            TriggerValidation {
                is_triggered: false,
                payout_percent: Decimal::ZERO,
            }
        })
    }

    pub fn get_weather_index(&self, ctx: &mut TxContext, index_id: &str) -> Result<WeatherIndex> {
        ctx.require_doc(index_id, "index")
    }

    /// Indices for a location, oldest calculation first
    pub fn get_indices_by_location(
        &self,
        ctx: &TxContext,
        location: &str,
    ) -> Result<Vec<WeatherIndex>> {
        ctx.query_docs(&json!({
            "selector": {"docType": "weatherIndex", "location": location},
            "sort": [{"calculatedAt": "asc"}]
        }))
    }

    pub fn get_triggered_indices(&self, ctx: &TxContext) -> Result<Vec<WeatherIndex>> {
        ctx.query_docs(&json!({
            "selector": {"docType": "weatherIndex", "payoutTriggered": true},
            "sort": [{"calculatedAt": "asc"}]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_common::ErrorKind;
    use canopy_ledger::Ledger;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn window(id: &str, location: &str) -> IndexWindow {
        IndexWindow::new(
            id,
            location,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_rainfall_index_persisted() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();

        let mut ctx = ledger.begin("index-bot");
        let idx = engine
            .calculate_rainfall_index(&mut ctx, window("IDX-R1", "Nakuru"), 69.0, 100.0)
            .unwrap();
        ctx.commit().unwrap();

        assert_eq!(idx.index_type, IndexType::Rainfall);
        assert!((idx.deviation + 31.0).abs() < 1e-9);
        assert_eq!(idx.severity, Severity::Mild);
        assert!(idx.payout_triggered);

        let mut ctx = ledger.begin("anyone");
        let stored = engine.get_weather_index(&mut ctx, "IDX-R1").unwrap();
        assert_eq!(stored.calculated_value, 69.0);
        assert_eq!(stored.baseline_value, 100.0);
    }

    #[test]
    fn test_temperature_index() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();
        let mut ctx = ledger.begin("index-bot");
        let idx = engine
            .calculate_temperature_index(&mut ctx, window("IDX-T1", "Nakuru"), 24.0, 20.0)
            .unwrap();
        assert!((idx.deviation - 4.0).abs() < 1e-9);
        assert_eq!(idx.severity, Severity::Moderate);
        assert!(idx.payout_triggered);
    }

    #[test]
    fn test_drought_index() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();
        let mut ctx = ledger.begin("index-bot");
        let idx = engine
            .calculate_drought_index(&mut ctx, window("IDX-D1", "Nakuru"), 21, 10)
            .unwrap();
        assert_eq!(idx.severity, Severity::Severe);
        assert!(idx.payout_triggered);
        assert_eq!(idx.calculated_value, 21.0);
        assert_eq!(idx.baseline_value, 10.0);

        let err = engine
            .calculate_drought_index(&mut ctx, window("IDX-D2", "Nakuru"), 5, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_untriggered_index_still_persisted() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();
        let mut ctx = ledger.begin("index-bot");
        let idx = engine
            .calculate_rainfall_index(&mut ctx, window("IDX-R2", "Nakuru"), 95.0, 100.0)
            .unwrap();
        assert!(!idx.payout_triggered);
        ctx.commit().unwrap();

        let mut ctx = ledger.begin("anyone");
        let v = engine.validate_index_trigger(&mut ctx, "IDX-R2").unwrap();
        assert!(!v.is_triggered);
        assert_eq!(v.payout_percent, Decimal::ZERO);
    }

    #[test]
    fn test_rejects_bad_input() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();
        let mut ctx = ledger.begin("index-bot");
        engine
            .calculate_rainfall_index(&mut ctx, window("IDX-1", "Nakuru"), 50.0, 100.0)
            .unwrap();

        let err = engine
            .calculate_temperature_index(&mut ctx, window("IDX-1", "Nakuru"), 24.0, 20.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = engine
            .calculate_rainfall_index(&mut ctx, window("IDX-2", "Nakuru"), 50.0, 0.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut backwards = window("IDX-3", "Nakuru");
        std::mem::swap(&mut backwards.start, &mut backwards.end);
        let err = engine
            .calculate_temperature_index(&mut ctx, backwards, 24.0, 20.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_payout_percentage_lookup() {
        let engine = IndexEngine::default();
        assert_eq!(engine.calculate_payout_percentage("Severe").unwrap(), dec!(100));
        assert_eq!(engine.calculate_payout_percentage("Moderate").unwrap(), dec!(50));
        assert_eq!(engine.calculate_payout_percentage("Mild").unwrap(), dec!(25));
        assert_eq!(engine.calculate_payout_percentage("None").unwrap(), dec!(0));
        assert!(engine.calculate_payout_percentage("Catastrophic").is_err());
    }

    #[test]
    fn test_validate_trigger_reports_magnitude() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();
        let mut ctx = ledger.begin("index-bot");
        engine
            .calculate_temperature_index(&mut ctx, window("IDX-T", "Nakuru"), 24.0, 20.0)
            .unwrap();
        ctx.commit().unwrap();

        let mut ctx = ledger.begin("anyone");
        let v = engine.validate_index_trigger(&mut ctx, "IDX-T").unwrap();
        assert!(v.is_triggered);
        assert_eq!(v.payout_percent, dec!(50));
        assert_eq!(
            engine.validate_index_trigger(&mut ctx, "IDX-NONE").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_queries_by_location_and_trigger() {
        let ledger = Ledger::in_memory();
        let engine = IndexEngine::default();

        let mut ctx = ledger.begin("index-bot");
        engine
            .calculate_rainfall_index(&mut ctx, window("IDX-A", "Nakuru"), 50.0, 100.0)
            .unwrap();
        engine
            .calculate_rainfall_index(&mut ctx, window("IDX-B", "Nakuru"), 99.0, 100.0)
            .unwrap();
        engine
            .calculate_temperature_index(&mut ctx, window("IDX-C", "Eldoret"), 26.0, 20.0)
            .unwrap();
        ctx.commit().unwrap();

        let ctx = ledger.begin("anyone");
        let nakuru = engine.get_indices_by_location(&ctx, "Nakuru").unwrap();
        assert_eq!(nakuru.len(), 2);

        let mut triggered: Vec<_> = engine
            .get_triggered_indices(&ctx)
            .unwrap()
            .into_iter()
            .map(|i| i.index_id)
            .collect();
        triggered.sort();
        assert_eq!(triggered, vec!["IDX-A", "IDX-C"]);
    }
}
