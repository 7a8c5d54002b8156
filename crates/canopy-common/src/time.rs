//! Timestamp parsing shared by the pipeline operations

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{CanopyError, Result};

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CanopyError::invalid(format!("malformed date '{}': {}", raw, e)))
}

/// Canonical RFC 3339 rendering with whole seconds and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
