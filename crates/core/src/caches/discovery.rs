//! Mapping between discovery ids and the local records they were merged into.
//!
//! Layout (global store, shared by every session):
//!
//! ```text
//! discovery_map.by_discovery_id.<discoveryId>   DiscoveryMapping
//! discovery_map.by_source_id.<sourceId>         discoveryId
//! ```

use super::{get_typed, put_typed};
use crate::constants::DISCOVERY_MAP_DOCUMENT;
use crate::doc_path;
use crate::store::DocumentStore;
use crate::CdrResult;
use cdr_types::SourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a discovered item was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMapping {
    pub patient_id: u64,
    pub heading: String,
    pub host: String,
    pub composition_uid: String,
    pub source_id: SourceId,
}

pub struct DiscoveryMapCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> DiscoveryMapCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub fn exists(&self, discovery_id: &str) -> bool {
        self.store
            .exists(&doc_path![DISCOVERY_MAP_DOCUMENT, "by_discovery_id", discovery_id])
    }

    pub fn get(&self, discovery_id: &str) -> CdrResult<Option<DiscoveryMapping>> {
        get_typed(
            self.store,
            &doc_path![DISCOVERY_MAP_DOCUMENT, "by_discovery_id", discovery_id],
        )
    }

    pub fn set(&self, discovery_id: &str, mapping: &DiscoveryMapping) -> CdrResult<()> {
        put_typed(
            self.store,
            &doc_path![DISCOVERY_MAP_DOCUMENT, "by_discovery_id", discovery_id],
            mapping,
        )?;
        self.store.put(
            &doc_path![DISCOVERY_MAP_DOCUMENT, "by_source_id", &mapping.source_id],
            Value::from(discovery_id),
        );
        Ok(())
    }

    pub fn discovery_id(&self, source_id: &SourceId) -> Option<String> {
        self.store
            .get(&doc_path![DISCOVERY_MAP_DOCUMENT, "by_source_id", source_id])
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Forget the mapping of a local record, so its discovery item can be merged again.
    pub fn delete_by_source_id(&self, source_id: &SourceId) {
        if let Some(discovery_id) = self.discovery_id(source_id) {
            self.store.delete(&doc_path![
                DISCOVERY_MAP_DOCUMENT,
                "by_discovery_id",
                discovery_id
            ]);
        }
        self.store
            .delete(&doc_path![DISCOVERY_MAP_DOCUMENT, "by_source_id", source_id]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn mapping() -> DiscoveryMapping {
        DiscoveryMapping {
            patient_id: 9999999000,
            heading: "problems".into(),
            host: "ethercis".into(),
            composition_uid: "c1::ethercis::1".into(),
            source_id: SourceId::new("ethercis", "c1::ethercis::1").expect("source id"),
        }
    }

    #[test]
    fn set_records_both_directions() {
        let store = MemoryStore::new();
        let cache = DiscoveryMapCache::new(&store);
        cache.set("Condition/d1", &mapping()).expect("set");

        assert!(cache.exists("Condition/d1"));
        assert_eq!(cache.get("Condition/d1").expect("read"), Some(mapping()));
        assert_eq!(
            cache.discovery_id(&mapping().source_id).as_deref(),
            Some("Condition/d1")
        );
    }

    #[test]
    fn delete_by_source_id_forgets_the_item() {
        let store = MemoryStore::new();
        let cache = DiscoveryMapCache::new(&store);
        cache.set("Condition/d1", &mapping()).expect("set");

        cache.delete_by_source_id(&mapping().source_id);
        assert!(!cache.exists("Condition/d1"));
        assert_eq!(cache.discovery_id(&mapping().source_id), None);
    }
}
