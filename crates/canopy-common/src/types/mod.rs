//! Core data types for the Canopy pipeline

pub mod baseline;
pub mod claim;
pub mod consensus;
pub mod observation;
pub mod oracle;
pub mod weather_index;

/// A record stored as a JSON document in world state.
///
/// `DOC_TYPE` is written alongside the record as the `docType` field so
/// selector queries can target one entity kind.
pub trait Document: serde::Serialize + serde::de::DeserializeOwned {
    const DOC_TYPE: &'static str;
}
