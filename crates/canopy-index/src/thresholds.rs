//! Severity bands and payout triggers
//!
//! ```text
//! Rainfall     deviation = (measured − baseline) / baseline × 100
//!              |dev|:  <20 None  <40 Mild  <60 Moderate  else Severe
//!              pays when dev < −30
//!
//! Temperature  deviation = measured − baseline   (°C)
//!              |dev|:  <1.5 None  <3 Mild  <5 Moderate  else Severe
//!              pays when dev > 3 or dev < −2
//!
//! Drought      deviation = dryDays / thresholdDays × 100
//!              days:   <t None  <⌊1.5t⌋ Mild  <⌊2t⌋ Moderate  else Severe
//!              pays when days ≥ t
//! ```
//!
//! Severity and trigger are evaluated independently; a Mild rainfall
//! deficit can pay while a Moderate surplus does not.

use canopy_common::Severity;
use serde::{Deserialize, Serialize};

/// Upper bounds (exclusive) of the None, Mild and Moderate bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub none_below: f64,
    pub mild_below: f64,
    pub moderate_below: f64,
}

impl SeverityBands {
    pub const fn new(none_below: f64, mild_below: f64, moderate_below: f64) -> Self {
        Self {
            none_below,
            mild_below,
            moderate_below,
        }
    }

    /// Classify a non-negative magnitude
    pub fn classify(&self, magnitude: f64) -> Severity {
        match magnitude {
            m if m < self.none_below => Severity::None,
            m if m < self.mild_below => Severity::Mild,
            m if m < self.moderate_below => Severity::Moderate,
            _ => Severity::Severe,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainfallThresholds {
    /// Bands over |deviation| in percent
    pub bands: SeverityBands,
    /// Deficit (percent, negative) below which payout fires
    pub trigger_below: f64,
}

impl Default for RainfallThresholds {
    fn default() -> Self {
        Self {
            bands: SeverityBands::new(20.0, 40.0, 60.0),
            trigger_below: -30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureThresholds {
    /// Bands over |deviation| in degrees
    pub bands: SeverityBands,
    pub heat_trigger_above: f64,
    pub cold_trigger_below: f64,
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            bands: SeverityBands::new(1.5, 3.0, 5.0),
            heat_trigger_above: 3.0,
            cold_trigger_below: -2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroughtThresholds {
    /// Multiples of the threshold ending the Mild and Moderate bands
    pub mild_multiplier: f64,
    pub moderate_multiplier: f64,
}

impl Default for DroughtThresholds {
    fn default() -> Self {
        Self {
            mild_multiplier: 1.5,
            moderate_multiplier: 2.0,
        }
    }
}

/// Result of scoring one measurement against its baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub deviation: f64,
    pub severity: Severity,
    pub triggered: bool,
}

/// All index thresholds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexThresholds {
    pub rainfall: RainfallThresholds,
    pub temperature: TemperatureThresholds,
    pub drought: DroughtThresholds,
}

impl IndexThresholds {
    pub fn with_rainfall_trigger(mut self, trigger_below: f64) -> Self {
        self.rainfall.trigger_below = trigger_below;
        self
    }

    pub fn with_temperature_triggers(mut self, heat_above: f64, cold_below: f64) -> Self {
        self.temperature.heat_trigger_above = heat_above;
        self.temperature.cold_trigger_below = cold_below;
        self
    }

    /// `baseline` must be positive
    pub fn assess_rainfall(&self, measured: f64, baseline: f64) -> Assessment {
        let deviation = (measured - baseline) / baseline * 100.0;
        Assessment {
            deviation,
            severity: self.rainfall.bands.classify(deviation.abs()),
            triggered: deviation < self.rainfall.trigger_below,
        }
    }

    pub fn assess_temperature(&self, measured: f64, baseline: f64) -> Assessment {
        let deviation = measured - baseline;
        let t = &self.temperature;
        Assessment {
            deviation,
            severity: t.bands.classify(deviation.abs()),
            triggered: deviation > t.heat_trigger_above || deviation < t.cold_trigger_below,
        }
    }

    /// `threshold_days` must be at least 1
    pub fn assess_drought(&self, dry_days: u32, threshold_days: u32) -> Assessment {
        let t = f64::from(threshold_days);
        let mild_end = (t * self.drought.mild_multiplier).floor() as u32;
        let moderate_end = (t * self.drought.moderate_multiplier).floor() as u32;

        let severity = if dry_days < threshold_days {
            Severity::None
        } else if dry_days < mild_end {
            Severity::Mild
        } else if dry_days < moderate_end {
            Severity::Moderate
        } else {
            Severity::Severe
        };

        Assessment {
            deviation: f64::from(dry_days) / t * 100.0,
            severity,
            triggered: dry_days >= threshold_days,
        }
    }
}
