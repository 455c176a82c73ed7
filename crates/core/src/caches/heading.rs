//! Cached heading records.
//!
//! Layout (session store):
//!
//! ```text
//! headings.bySourceId.<sourceId>                                   HeadingEntry
//! headings.byPatientId.<nhs>.<heading>.byHost.<host>.<sourceId>    index
//! headings.byPatientId.<nhs>.<heading>.byDate.<ms>.<sourceId>      index
//! headings.byPatientId.<nhs>.<heading>.fetched.<host>              host queried
//! ```
//!
//! The two indices are only ever written and removed together with the primary entry.

use super::{get_typed, put_typed};
use crate::constants::HEADINGS_DOCUMENT;
use crate::doc_path;
use crate::store::{DocumentStore, Segment};
use crate::CdrResult;
use cdr_types::SourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached heading record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingEntry {
    pub patient_id: u64,
    pub heading: String,
    pub host: String,
    /// Record date in epoch milliseconds.
    pub date: i64,
    /// Full (versioned) composition uid on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_id: Option<String>,
    /// Raw AQL row.
    pub data: Value,
    /// Memoised PulseTile projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulsetile: Option<Value>,
}

pub struct HeadingCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> HeadingCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    fn entry_path(source_id: &SourceId) -> Vec<Segment> {
        doc_path![HEADINGS_DOCUMENT, "bySourceId", source_id]
    }

    fn patient_path(patient_id: u64, heading: &str) -> Vec<Segment> {
        doc_path![HEADINGS_DOCUMENT, "byPatientId", patient_id, heading]
    }

    fn by_host_path(patient_id: u64, heading: &str, host: &str) -> Vec<Segment> {
        let mut path = Self::patient_path(patient_id, heading);
        path.extend(doc_path!["byHost", host]);
        path
    }

    fn fetched_path(patient_id: u64, heading: &str, host: &str) -> Vec<Segment> {
        let mut path = Self::patient_path(patient_id, heading);
        path.extend(doc_path!["fetched", host]);
        path
    }

    fn by_date_path(patient_id: u64, heading: &str) -> Vec<Segment> {
        let mut path = Self::patient_path(patient_id, heading);
        path.push(Segment::from("byDate"));
        path
    }

    /// True if `host` has been queried for `heading`, or records from it are cached.
    pub fn exists_for_host(&self, patient_id: u64, heading: &str, host: &str) -> bool {
        self.store
            .exists(&Self::fetched_path(patient_id, heading, host))
            || self
                .store
                .exists(&Self::by_host_path(patient_id, heading, host))
    }

    /// Record that `host` was queried, so a host with no records is not queried again.
    pub fn mark_host_fetched(&self, patient_id: u64, heading: &str, host: &str) {
        self.store
            .put(&Self::fetched_path(patient_id, heading, host), Value::Bool(true));
    }

    /// Store an entry and add it to both indices.
    pub fn add(&self, source_id: &SourceId, entry: &HeadingEntry) -> CdrResult<()> {
        put_typed(self.store, &Self::entry_path(source_id), entry)?;

        let mut by_host = Self::by_host_path(entry.patient_id, &entry.heading, &entry.host);
        by_host.push(Segment::from(source_id));
        self.store.put(&by_host, Value::Bool(true));

        let mut by_date = Self::by_date_path(entry.patient_id, &entry.heading);
        by_date.extend(doc_path![entry.date, source_id]);
        self.store.put(&by_date, Value::Bool(true));

        Ok(())
    }

    pub fn get(&self, source_id: &SourceId) -> CdrResult<Option<HeadingEntry>> {
        get_typed(self.store, &Self::entry_path(source_id))
    }

    /// Store the PulseTile projection back onto the entry.
    pub fn set_pulsetile(&self, source_id: &SourceId, pulsetile: Value) {
        let mut path = Self::entry_path(source_id);
        path.push(Segment::from("pulsetile"));
        self.store.put_object(&path, pulsetile);
    }

    /// Source ids of the patient's records for one heading, across hosts, in key order.
    pub fn source_ids(&self, patient_id: u64, heading: &str) -> Vec<SourceId> {
        let by_host = {
            let mut path = Self::patient_path(patient_id, heading);
            path.push(Segment::from("byHost"));
            path
        };

        let mut ids: Vec<SourceId> = self
            .store
            .child_keys(&by_host)
            .into_iter()
            .flat_map(|host| {
                let mut path = by_host.clone();
                path.push(Segment::from(host));
                self.store.child_keys(&path)
            })
            .filter_map(|raw| SourceId::parse(&raw).ok())
            .collect();
        ids.sort();
        ids
    }

    /// Source ids of the patient's records for one heading, newest first.
    pub fn source_ids_by_date(&self, patient_id: u64, heading: &str) -> Vec<SourceId> {
        let by_date = Self::by_date_path(patient_id, heading);
        let mut dates: Vec<(i64, String)> = self
            .store
            .child_keys(&by_date)
            .into_iter()
            .filter_map(|key| key.parse::<i64>().ok().map(|ms| (ms, key)))
            .collect();
        dates.sort_by(|a, b| b.0.cmp(&a.0));

        dates
            .into_iter()
            .flat_map(|(_, key)| {
                let mut path = by_date.clone();
                path.push(Segment::from(key));
                self.store.child_keys(&path)
            })
            .filter_map(|raw| SourceId::parse(&raw).ok())
            .collect()
    }

    /// Remove an entry from the primary store and both indices.
    pub fn delete(&self, source_id: &SourceId, entry: &HeadingEntry) {
        let mut by_host = Self::by_host_path(entry.patient_id, &entry.heading, &entry.host);
        by_host.push(Segment::from(source_id));
        self.store.delete(&by_host);

        let mut by_date = Self::by_date_path(entry.patient_id, &entry.heading);
        by_date.extend(doc_path![entry.date, source_id]);
        self.store.delete(&by_date);

        self.store.delete(&Self::entry_path(source_id));
    }

    /// Drop every record of `heading` from `host`, so the next fetch reloads them.
    pub fn delete_host(&self, patient_id: u64, heading: &str, host: &str) -> CdrResult<()> {
        self.store
            .delete(&Self::fetched_path(patient_id, heading, host));

        let by_host = Self::by_host_path(patient_id, heading, host);
        for raw in self.store.child_keys(&by_host) {
            let Ok(source_id) = SourceId::parse(&raw) else {
                continue;
            };
            match self.get(&source_id)? {
                Some(entry) => self.delete(&source_id, &entry),
                None => {
                    let mut path = by_host.clone();
                    path.push(Segment::from(raw));
                    self.store.delete(&path);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn entry(host: &str, date: i64) -> HeadingEntry {
        HeadingEntry {
            patient_id: 9999999000,
            heading: "allergies".into(),
            host: host.into(),
            date,
            composition_id: Some("uid::ethercis::1".into()),
            data: json!({"cause": "nuts"}),
            pulsetile: None,
        }
    }

    fn sid(raw: &str) -> SourceId {
        SourceId::parse(raw).expect("source id")
    }

    #[test]
    fn add_indexes_by_host_and_date() {
        let store = MemoryStore::new();
        let cache = HeadingCache::new(&store);
        cache.add(&sid("ethercis_a"), &entry("ethercis", 1000)).expect("add");
        cache.add(&sid("marand_b"), &entry("marand", 3000)).expect("add");
        cache.add(&sid("ethercis_c"), &entry("ethercis", 2000)).expect("add");

        assert!(cache.exists_for_host(9999999000, "allergies", "ethercis"));
        assert!(!cache.exists_for_host(9999999000, "problems", "ethercis"));
        assert_eq!(
            cache.source_ids(9999999000, "allergies"),
            vec![sid("ethercis_a"), sid("ethercis_c"), sid("marand_b")]
        );
        assert_eq!(
            cache.source_ids_by_date(9999999000, "allergies"),
            vec![sid("marand_b"), sid("ethercis_c"), sid("ethercis_a")]
        );
    }

    #[test]
    fn delete_removes_all_three_entries() {
        let store = MemoryStore::new();
        let cache = HeadingCache::new(&store);
        let id = sid("ethercis_a");
        let e = entry("ethercis", 1000);
        cache.add(&id, &e).expect("add");

        cache.delete(&id, &e);
        assert_eq!(cache.get(&id).expect("read"), None);
        assert!(cache.source_ids(9999999000, "allergies").is_empty());
        assert!(cache.source_ids_by_date(9999999000, "allergies").is_empty());
    }

    #[test]
    fn delete_host_only_touches_that_host() {
        let store = MemoryStore::new();
        let cache = HeadingCache::new(&store);
        cache.add(&sid("ethercis_a"), &entry("ethercis", 1000)).expect("add");
        cache.add(&sid("marand_b"), &entry("marand", 1000)).expect("add");

        cache
            .delete_host(9999999000, "allergies", "ethercis")
            .expect("delete host");
        assert!(!cache.exists_for_host(9999999000, "allergies", "ethercis"));
        assert_eq!(
            cache.source_ids_by_date(9999999000, "allergies"),
            vec![sid("marand_b")]
        );
    }

    #[test]
    fn queried_host_without_records_counts_as_cached() {
        let store = MemoryStore::new();
        let cache = HeadingCache::new(&store);
        cache.mark_host_fetched(9999999000, "allergies", "ethercis");

        assert!(cache.exists_for_host(9999999000, "allergies", "ethercis"));
        assert!(!cache.exists_for_host(9999999000, "allergies", "marand"));
        assert!(cache.source_ids(9999999000, "allergies").is_empty());

        cache
            .delete_host(9999999000, "allergies", "ethercis")
            .expect("delete host");
        assert!(!cache.exists_for_host(9999999000, "allergies", "ethercis"));
    }

    #[test]
    fn pulsetile_is_stored_on_the_entry() {
        let store = MemoryStore::new();
        let cache = HeadingCache::new(&store);
        let id = sid("ethercis_a");
        cache.add(&id, &entry("ethercis", 1000)).expect("add");
        cache.set_pulsetile(&id, json!({"cause": "nuts"}));

        let stored = cache.get(&id).expect("read").expect("present");
        assert_eq!(stored.pulsetile, Some(json!({"cause": "nuts"})));
    }
}
