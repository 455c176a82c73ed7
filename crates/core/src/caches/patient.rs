//! Per-patient index of cached FHIR resources.
//!
//! Layout (session store):
//!
//! ```text
//! fhir.byNhsNumber.<nhs>.resources.<type>.<uuid>   index into ResourceCache
//! fhir.byNhsNumber.<nhs>.fetched.<type>            patient resources of <type> were fetched
//! ```

use super::ResourceCache;
use crate::constants::FHIR_DOCUMENT;
use crate::doc_path;
use crate::store::DocumentStore;
use fhir::Bundle;
use serde_json::Value;

pub struct PatientCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> PatientCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// True once any Patient resource is indexed for `nhs_number`.
    pub fn exists(&self, nhs_number: u64) -> bool {
        self.store.exists(&doc_path![
            FHIR_DOCUMENT,
            "byNhsNumber",
            nhs_number,
            "resources",
            "Patient"
        ])
    }

    pub fn add_resource(&self, nhs_number: u64, resource_name: &str, uuid: &str) {
        self.store.put(
            &doc_path![
                FHIR_DOCUMENT,
                "byNhsNumber",
                nhs_number,
                "resources",
                resource_name,
                uuid
            ],
            Value::Bool(true),
        );
    }

    pub fn resource_uuids(&self, nhs_number: u64, resource_name: &str) -> Vec<String> {
        self.store.child_keys(&doc_path![
            FHIR_DOCUMENT,
            "byNhsNumber",
            nhs_number,
            "resources",
            resource_name
        ])
    }

    pub fn is_fetched(&self, nhs_number: u64, resource_name: &str) -> bool {
        self.store.exists(&doc_path![
            FHIR_DOCUMENT,
            "byNhsNumber",
            nhs_number,
            "fetched",
            resource_name
        ])
    }

    pub fn mark_fetched(&self, nhs_number: u64, resource_name: &str) {
        self.store.put(
            &doc_path![
                FHIR_DOCUMENT,
                "byNhsNumber",
                nhs_number,
                "fetched",
                resource_name
            ],
            Value::Bool(true),
        );
    }

    /// The patient's cached Patient resources as a bundle, for discovery resource searches.
    pub fn patient_bundle(&self, nhs_number: u64, resources: &ResourceCache<'_>) -> Bundle {
        Bundle::from_resources(
            self.resource_uuids(nhs_number, "Patient")
                .iter()
                .filter_map(|uuid| resources.get("Patient", uuid)),
        )
    }
}
