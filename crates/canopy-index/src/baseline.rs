//! Regional baselines - historical reference values per (region, season)

use canopy_common::{BaselineComparison, CanopyError, MetricStats, RegionalBaseline, Result};
use canopy_ledger::{keys, TxContext};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Default spread recorded alongside each baseline mean
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSpread {
    /// Rainfall std deviation as a fraction of the mean
    pub rainfall_ratio: f64,
    /// Degrees
    pub temperature_std_dev: f64,
    /// Percentage points
    pub humidity_std_dev: f64,
}

impl Default for BaselineSpread {
    fn default() -> Self {
        Self {
            rainfall_ratio: 0.15,
            temperature_std_dev: 2.0,
            humidity_std_dev: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    spread: BaselineSpread,
}

impl BaselineStore {
    pub fn new(spread: BaselineSpread) -> Self {
        Self { spread }
    }

    /// Create or replace the baseline for (region, season)
    #[instrument(skip(self, ctx))]
    pub fn store_regional_baseline(
        &self,
        ctx: &mut TxContext,
        region: &str,
        season: &str,
        years_of_data: u32,
        rainfall: f64,
        temperature: f64,
        humidity: f64,
    ) -> Result<RegionalBaseline> {
        if region.trim().is_empty() || season.trim().is_empty() {
            return Err(CanopyError::invalid("region and season must not be empty"));
        }
        if !rainfall.is_finite() || rainfall < 0.0 {
            return Err(CanopyError::invalid(format!("invalid baseline rainfall: {}", rainfall)));
        }
        if !temperature.is_finite() || !humidity.is_finite() {
            return Err(CanopyError::invalid("baseline values must be finite"));
        }

        let baseline = RegionalBaseline {
            baseline_id: keys::baseline_id(region, season),
            region: region.to_string(),
            season: season.to_string(),
            years_of_data,
            rainfall: MetricStats {
                mean: rainfall,
                std_dev: rainfall * self.spread.rainfall_ratio,
            },
            temperature: MetricStats {
                mean: temperature,
                std_dev: self.spread.temperature_std_dev,
            },
            humidity: MetricStats {
                mean: humidity,
                std_dev: self.spread.humidity_std_dev,
            },
            updated_at: ctx.timestamp(),
        };
        ctx.put_doc(keys::baseline(region, season), &baseline)?;

        info!(baseline_id = %baseline.baseline_id, years_of_data, "Regional baseline stored");
        Ok(baseline)
    }

    pub fn get_regional_baseline(
        &self,
        ctx: &mut TxContext,
        region: &str,
        season: &str,
    ) -> Result<RegionalBaseline> {
        ctx.require_doc(&keys::baseline(region, season), "baseline")
    }

    /// Per-metric deviation of current readings; writes nothing
    pub fn compare_to_baseline(
        &self,
        ctx: &mut TxContext,
        region: &str,
        season: &str,
        rainfall: f64,
        temperature: f64,
    ) -> Result<BaselineComparison> {
        let baseline = self.get_regional_baseline(ctx, region, season)?;
        Ok(compare(&baseline, rainfall, temperature))
    }
}

/// Rainfall in percent of a positive mean, temperature in absolute degrees
pub fn compare(baseline: &RegionalBaseline, rainfall: f64, temperature: f64) -> BaselineComparison {
    let mean = baseline.rainfall.mean;
    BaselineComparison {
        rainfall_deviation: (mean > 0.0).then(|| (rainfall - mean) / mean * 100.0),
        temperature_deviation: temperature - baseline.temperature.mean,
    }
}
