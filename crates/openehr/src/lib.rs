//! openEHR wire/boundary support.
//!
//! This crate is responsible for talking to openEHR clinical data repositories and for
//! translating between their AQL result rows / FLAT compositions and the PulseTile-shaped
//! JSON the rest of the workspace works with.
//!
//! - [`client`]: the [`OpenEhrClient`] seam and its HTTP implementation
//! - [`headings`]: heading definitions (AQL, templates, summary fields)
//! - [`transform`]: the JSON template engine used by heading definitions

pub mod client;
pub mod headings;
pub mod transform;

pub use client::{HostConfig, HttpOpenEhrClient, OpenEhrClient};
pub use headings::{HeadingDefinition, HeadingRegistry};

use thiserror::Error;

/// Errors returned by the `openehr` boundary crate.
#[derive(Debug, Error)]
pub enum OpenEhrError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("openEHR server {host} responded with status {status}: {body}")]
    Status {
        host: String,
        status: u16,
        body: String,
    },

    #[error("unknown openEHR host: {0}")]
    UnknownHost(String),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with an [`OpenEhrError`].
pub type OpenEhrResult<T> = Result<T, OpenEhrError>;
