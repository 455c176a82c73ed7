//! FHIR wire/boundary support for the discovery data service.
//!
//! This crate provides:
//! - the [`FhirClient`] seam and its HTTP implementation talking to the discovery service,
//! - [`Bundle`] and [`ResourceReference`] wire helpers,
//! - a strict [`Patient`] wire model with translation to a flat [`PatientData`].
//!
//! Resources other than Patient are handled as raw `serde_json::Value` documents; the core
//! caches them verbatim.

pub mod bundle;
pub mod client;
pub mod patient;
pub mod reference;

pub use bundle::{Bundle, BundleEntry};
pub use client::{DiscoveryConfig, FhirClient, HttpFhirClient};
pub use patient::{Patient, PatientData};
pub use reference::{collect_references, ResourceReference};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discovery service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
