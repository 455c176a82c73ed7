//! Derived demographics (session store): `Demographics.by_nhsNumber.<nhs>`.

use super::{get_typed, put_typed};
use crate::constants::DEMOGRAPHICS_DOCUMENT;
use crate::doc_path;
use crate::services::demographics::Demographics;
use crate::store::DocumentStore;
use crate::CdrResult;

pub struct DemographicsCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> DemographicsCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub fn get(&self, nhs_number: u64) -> CdrResult<Option<Demographics>> {
        get_typed(
            self.store,
            &doc_path![DEMOGRAPHICS_DOCUMENT, "by_nhsNumber", nhs_number],
        )
    }

    pub fn set(&self, nhs_number: u64, demographics: &Demographics) -> CdrResult<()> {
        put_typed(
            self.store,
            &doc_path![DEMOGRAPHICS_DOCUMENT, "by_nhsNumber", nhs_number],
            demographics,
        )
    }
}
