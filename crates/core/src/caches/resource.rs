//! Cached FHIR resources, keyed by resource type and uuid.
//!
//! Layout (session store):
//!
//! ```text
//! fhir.byResource.<type>.byUuid.<uuid>.data          raw resource
//! fhir.byResource.<type>.byUuid.<uuid>.practitioner  practitioner uuid (back-reference)
//! fhir.fetching.<key>                                 in-flight marker
//! ```

use crate::constants::FHIR_DOCUMENT;
use crate::doc_path;
use crate::store::{DocumentStore, Segment};
use serde_json::Value;

pub struct ResourceCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ResourceCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    fn entry_path(resource_name: &str, uuid: &str) -> Vec<Segment> {
        doc_path![FHIR_DOCUMENT, "byResource", resource_name, "byUuid", uuid]
    }

    fn data_path(resource_name: &str, uuid: &str) -> Vec<Segment> {
        let mut path = Self::entry_path(resource_name, uuid);
        path.push(Segment::from("data"));
        path
    }

    pub fn exists(&self, resource_name: &str, uuid: &str) -> bool {
        self.store.exists(&Self::data_path(resource_name, uuid))
    }

    pub fn get(&self, resource_name: &str, uuid: &str) -> Option<Value> {
        self.store.get_object(&Self::data_path(resource_name, uuid))
    }

    pub fn set(&self, resource_name: &str, uuid: &str, resource: Value) {
        self.store
            .put_object(&Self::data_path(resource_name, uuid), resource);
    }

    /// Uuids of every cached resource of one type.
    pub fn uuids(&self, resource_name: &str) -> Vec<String> {
        self.store
            .child_keys(&doc_path![FHIR_DOCUMENT, "byResource", resource_name, "byUuid"])
    }

    /// Attach the uuid of the practitioner a resource refers to.
    pub fn set_practitioner(&self, resource_name: &str, uuid: &str, practitioner_uuid: &str) {
        let mut path = Self::entry_path(resource_name, uuid);
        path.push(Segment::from("practitioner"));
        self.store.put(&path, Value::from(practitioner_uuid));
    }

    pub fn practitioner(&self, resource_name: &str, uuid: &str) -> Option<String> {
        let mut path = Self::entry_path(resource_name, uuid);
        path.push(Segment::from("practitioner"));
        self.store
            .get(&path)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn is_fetching(&self, key: &str) -> bool {
        self.store.exists(&doc_path![FHIR_DOCUMENT, "fetching", key])
    }

    pub fn set_fetching(&self, key: &str) {
        self.store
            .put(&doc_path![FHIR_DOCUMENT, "fetching", key], Value::Bool(true));
    }

    pub fn clear_fetching(&self, key: &str) {
        self.store.delete(&doc_path![FHIR_DOCUMENT, "fetching", key]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn stores_and_lists_resources() {
        let store = MemoryStore::new();
        let cache = ResourceCache::new(&store);

        assert!(!cache.exists("Condition", "c1"));
        cache.set("Condition", "c1", json!({"resourceType": "Condition", "id": "c1"}));
        cache.set("Condition", "c2", json!({"resourceType": "Condition", "id": "c2"}));

        assert!(cache.exists("Condition", "c1"));
        assert_eq!(cache.uuids("Condition"), vec!["c1", "c2"]);
        assert_eq!(cache.get("Condition", "c2").expect("cached")["id"], "c2");
    }

    #[test]
    fn practitioner_back_reference_survives_data_overwrite() {
        let store = MemoryStore::new();
        let cache = ResourceCache::new(&store);
        cache.set("Patient", "p1", json!({"id": "p1"}));
        cache.set_practitioner("Patient", "p1", "gp1");
        cache.set("Patient", "p1", json!({"id": "p1", "gender": "male"}));

        assert_eq!(cache.practitioner("Patient", "p1").as_deref(), Some("gp1"));
    }

    #[test]
    fn fetching_marker_round_trip() {
        let store = MemoryStore::new();
        let cache = ResourceCache::new(&store);
        cache.set_fetching("Practitioner/gp1");
        assert!(cache.is_fetching("Practitioner/gp1"));
        cache.clear_fetching("Practitioner/gp1");
        assert!(!cache.is_fetching("Practitioner/gp1"));
    }
}
