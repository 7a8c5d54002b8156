//! # Canopy Claims
//!
//! Payout claims raised by triggered weather indices.
//!
//! - [`ClaimsProcessor::trigger_payout`] creates an already-Approved claim
//!   for a (policy, index) pair, at most once per pair
//! - Lifecycle transitions: approve, record payment, reject
//! - Queries by policy, farmer and status, plus a plain-text report

pub mod lifecycle;
pub mod report;
pub mod trigger;

pub use report::render_report;
pub use trigger::{payout_amount, ClaimsProcessor, TriggerRequest, CLAIM_REF_DOC_TYPE};
