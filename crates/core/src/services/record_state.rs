//! Loads a patient's record into the session on first access.

use super::{DiscoveryService, HeadingService};
use crate::caches::{RecordState, RecordStateCache, RecordStatus};
use crate::context::CdrContext;

#[derive(Clone, Copy)]
pub struct RecordStateService<'a> {
    ctx: &'a CdrContext,
    heading: HeadingService<'a>,
    discovery: DiscoveryService<'a>,
}

impl<'a> RecordStateService<'a> {
    pub fn new(
        ctx: &'a CdrContext,
        heading: HeadingService<'a>,
        discovery: DiscoveryService<'a>,
    ) -> Self {
        Self {
            ctx,
            heading,
            discovery,
        }
    }

    /// Count the request and, on the first one, merge discovery data and fetch every enabled
    /// heading from every host. Later calls only report the state.
    pub async fn check(&self, patient_id: u64) -> RecordState {
        let cache = RecordStateCache::new(self.ctx.session_store());
        let request_no = cache.next_request(patient_id);

        if cache.status(patient_id).is_none() {
            tracing::info!(patient_id, request_no, "loading patient record");
            cache.set_new_patient(patient_id);
            cache.set_status(patient_id, RecordStatus::LoadingData);
            let mut loading = LoadingGuard {
                cache: RecordStateCache::new(self.ctx.session_store()),
                patient_id,
                armed: true,
            };

            if let Err(e) = self.discovery.merge_all(patient_id).await {
                tracing::warn!(patient_id, error = %e, "discovery merge failed");
            }

            for heading in self.ctx.cfg().headings() {
                self.heading.fetch_all_hosts(patient_id, heading).await;
            }

            cache.set_status(patient_id, RecordStatus::Ready);
            loading.armed = false;
        }

        cache.get(patient_id)
    }
}

/// Clears a `LoadingData` status left behind by a check that never finished.
struct LoadingGuard<'a> {
    cache: RecordStateCache<'a>,
    patient_id: u64,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(patient_id = self.patient_id, "record load abandoned");
            self.cache.clear_status(self.patient_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::services::Services;
    use crate::test_support::{allergy_row, Harness, TEST_NHS_NUMBER};
    use std::time::Duration;

    #[tokio::test]
    async fn first_check_loads_the_record_once() {
        let harness = Harness::new();
        harness.openehr.add_row(
            "ethercis",
            "allergies",
            allergy_row("a1::ethercis::1", "Penicillin", "2019-01-28T10:13:48.312Z"),
        );
        let ctx = harness.context(Role::Idcr);
        let services = Services::new(&ctx);

        let first = services.record_state.check(TEST_NHS_NUMBER).await;
        assert_eq!(first.status, Some(RecordStatus::Ready));
        assert_eq!(first.request_no, 1);
        assert!(first.new_patient);
        assert_eq!(
            services.heading.get_all_source_ids(TEST_NHS_NUMBER, "allergies").len(),
            1
        );
        let queries = harness.openehr.calls("query");

        let second = services.record_state.check(TEST_NHS_NUMBER).await;
        assert_eq!(second.request_no, 2);
        assert_eq!(second.status, Some(RecordStatus::Ready));
        assert_eq!(harness.openehr.calls("query"), queries);
    }

    #[tokio::test]
    async fn discovery_failure_does_not_block_loading() {
        let harness = Harness::new();
        harness.fhir.fail_authentication(true);
        let ctx = harness.context(Role::Idcr);

        let state = Services::new(&ctx).record_state.check(TEST_NHS_NUMBER).await;
        assert_eq!(state.status, Some(RecordStatus::Ready));
    }

    #[tokio::test]
    async fn abandoned_load_is_retried_by_the_next_check() {
        let harness = Harness::new();
        harness.openehr.add_row(
            "ethercis",
            "allergies",
            allergy_row("a1::ethercis::1", "Penicillin", "2019-01-28T10:13:48.312Z"),
        );
        harness.openehr.stall_queries(true);
        let ctx = harness.context(Role::Idcr);
        let services = Services::new(&ctx);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            services.record_state.check(TEST_NHS_NUMBER),
        )
        .await;
        assert!(timed_out.is_err());
        let cache = RecordStateCache::new(ctx.session_store());
        assert_eq!(cache.status(TEST_NHS_NUMBER), None);

        harness.openehr.stall_queries(false);
        let state = services.record_state.check(TEST_NHS_NUMBER).await;
        assert_eq!(state.status, Some(RecordStatus::Ready));
        assert_eq!(state.request_no, 2);
        assert_eq!(
            services.heading.get_all_source_ids(TEST_NHS_NUMBER, "allergies").len(),
            1
        );
    }
}
