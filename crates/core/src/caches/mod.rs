//! Typed views over the document store.
//!
//! Each cache owns one subtree and knows its path layout; services never build store paths
//! themselves. Session-scoped caches are handed the session store, global ones the global
//! store.

pub mod demographics;
pub mod discovery;
pub mod heading;
pub mod patient;
pub mod record_state;
pub mod resource;
pub mod token;

pub use demographics::DemographicsCache;
pub use discovery::{DiscoveryMapCache, DiscoveryMapping};
pub use heading::{HeadingCache, HeadingEntry};
pub use patient::PatientCache;
pub use record_state::{RecordState, RecordStateCache, RecordStatus};
pub use resource::ResourceCache;
pub use token::{AuthToken, TokenCache};

use crate::store::{DocumentStore, Segment};
use crate::{CdrError, CdrResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn put_typed<T: Serialize>(
    store: &dyn DocumentStore,
    path: &[Segment],
    value: &T,
) -> CdrResult<()> {
    let document = serde_json::to_value(value).map_err(CdrError::Serialization)?;
    store.put_object(path, document);
    Ok(())
}

pub(crate) fn get_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &[Segment],
) -> CdrResult<Option<T>> {
    store
        .get_object(path)
        .map(|document| serde_json::from_value(document).map_err(CdrError::Deserialization))
        .transpose()
}
