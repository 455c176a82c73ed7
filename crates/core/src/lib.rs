//! # CDR Core
//!
//! Business logic for the clinical data repository middle tier.
//!
//! The core sits between PulseTile-style clients and two kinds of backend:
//! - openEHR servers holding the patient record, grouped by clinical heading
//! - the discovery data service, a FHIR source whose records are merged into openEHR once
//!
//! Everything a caller needs flows through a [`CdrContext`]: configuration, the heading
//! registry, the remote clients and the session's slice of the document store. Commands in
//! [`commands`] validate input, check the caller's role and delegate to [`services`].
//!
//! **No API concerns**: HTTP routing and token decoding belong in `api-rest`.

pub mod caches;
pub mod commands;
pub mod config;
pub mod constants;
pub mod context;
mod error;
pub mod services;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::CoreConfig;
pub use context::{CdrContext, CdrState, Clock, Role, Session, SystemClock};
pub use error::{CdrError, CdrResult};
pub use services::Services;
pub use store::{DocumentStore, MemoryStore};
