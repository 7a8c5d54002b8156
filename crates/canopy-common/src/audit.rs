//! Audit trail of committed state transitions
//!
//! Every committed write is copied to the audit sinks, fire-and-forget:
//! a sink failure never affects the transaction that produced the event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Audit event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Warning,
}

impl AuditSeverity {
    /// Severity of a committed write, judged by the stored document.
    /// Anomalous observations and providers taken out of service warn.
    pub fn for_transition(doc_type: Option<&str>, status: Option<&str>) -> Self {
        match (doc_type, status) {
            (Some("observation"), Some("Anomalous")) => AuditSeverity::Warning,
            (Some("oracle"), Some("Suspended" | "Revoked")) => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        }
    }
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "INFO"),
            AuditSeverity::Warning => write!(f, "WARN"),
        }
    }
}

/// Which entity kind a transition touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    Oracle,
    Observation,
    Consensus,
    Baseline,
    WeatherIndex,
    Claim,
    /// Anything without a recognised document type
    System,
}

impl AuditCategory {
    /// Map a stored document's `docType` to a category
    pub fn from_doc_type(doc_type: &str) -> Self {
        match doc_type {
            "oracle" => AuditCategory::Oracle,
            "observation" => AuditCategory::Observation,
            "consensus" => AuditCategory::Consensus,
            "baseline" => AuditCategory::Baseline,
            "weatherIndex" => AuditCategory::WeatherIndex,
            "claim" => AuditCategory::Claim,
            _ => AuditCategory::System,
        }
    }
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditCategory::Oracle => write!(f, "ORACLE"),
            AuditCategory::Observation => write!(f, "OBSERVATION"),
            AuditCategory::Consensus => write!(f, "CONSENSUS"),
            AuditCategory::Baseline => write!(f, "BASELINE"),
            AuditCategory::WeatherIndex => write!(f, "INDEX"),
            AuditCategory::Claim => write!(f, "CLAIM"),
            AuditCategory::System => write!(f, "SYSTEM"),
        }
    }
}

/// One audited state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    /// Function that produced the transition (e.g. "TriggerPayout")
    pub action: String,
    /// Transaction that committed it
    pub tx_id: Option<String>,
    /// Invoking identity
    pub actor: Option<String>,
    /// World-state key written
    pub resource: Option<String>,
    pub details: HashMap<String, String>,
}

impl AuditEvent {
    pub fn new(category: AuditCategory, action: &str) -> Self {
        Self {
            event_id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            severity: AuditSeverity::Info,
            category,
            action: action.to_string(),
            tx_id: None,
            actor: None,
            resource: None,
            details: HashMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_tx(mut self, tx_id: &str) -> Self {
        self.tx_id = Some(tx_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Audit log sink
pub trait AuditSink: Send + Sync {
    /// Write an audit event
    fn write(&self, event: &AuditEvent);

    /// Flush pending events
    fn flush(&self) {}
}

/// Writes audit events to the tracing log
pub struct ConsoleAuditSink;

impl AuditSink for ConsoleAuditSink {
    fn write(&self, event: &AuditEvent) {
        let line = format!(
            "[{}] {} {} tx={} actor={} resource={}",
            event.severity,
            event.category,
            event.action,
            event.tx_id.as_deref().unwrap_or("-"),
            event.actor.as_deref().unwrap_or("-"),
            event.resource.as_deref().unwrap_or("-"),
        );

        match event.severity {
            AuditSeverity::Info => info!(target: "canopy::audit", "{}", line),
            AuditSeverity::Warning => warn!(target: "canopy::audit", "{}", line),
        }
    }
}

/// Keeps audit events in memory (tests, local runs)
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, event: &AuditEvent) {
        self.events.write().push(event.clone());
    }
}

/// Fans audit events out to every configured sink
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
    min_severity: AuditSeverity,
}

impl AuditLogger {
    /// Logger with a console sink
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(ConsoleAuditSink)],
            min_severity: AuditSeverity::Info,
        }
    }

    /// Logger with no sinks
    pub fn empty() -> Self {
        Self {
            sinks: Vec::new(),
            min_severity: AuditSeverity::Info,
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn set_min_severity(&mut self, severity: AuditSeverity) {
        self.min_severity = severity;
    }

    pub fn log(&self, event: AuditEvent) {
        if event.severity < self.min_severity {
            return;
        }
        for sink in &self.sinks {
            sink.write(&event);
        }
    }

    /// Record one committed world-state write
    pub fn log_transition(
        &self,
        action: &str,
        tx_id: &str,
        actor: &str,
        key: &str,
        doc_type: Option<&str>,
        status: Option<&str>,
    ) {
        let category = doc_type
            .map(AuditCategory::from_doc_type)
            .unwrap_or(AuditCategory::System);
        let mut event = AuditEvent::new(category, action)
            .with_severity(AuditSeverity::for_transition(doc_type, status))
            .with_tx(tx_id)
            .with_actor(actor)
            .with_resource(key);
        if let Some(status) = status {
            event = event.with_detail("status", status);
        }
        self.log(event);
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
