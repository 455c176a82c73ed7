//! Merges discovery data into the local openEHR record, exactly once per discovered item.

use super::mapping::{practitioner_name, to_pulsetile};
use super::{HeadingService, ResourceService};
use crate::caches::{DiscoveryMapCache, DiscoveryMapping, PatientCache, ResourceCache};
use crate::context::CdrContext;
use crate::CdrResult;
use serde_json::Value;

/// A discovered record ready to be written to a heading.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryItem {
    /// Externally assigned id, `<resourceType>/<uuid>`.
    pub discovery_id: String,
    /// PulseTile payload for the heading.
    pub payload: Value,
}

#[derive(Clone, Copy)]
pub struct DiscoveryService<'a> {
    ctx: &'a CdrContext,
    resource: ResourceService<'a>,
    heading: HeadingService<'a>,
}

impl<'a> DiscoveryService<'a> {
    pub fn new(
        ctx: &'a CdrContext,
        resource: ResourceService<'a>,
        heading: HeadingService<'a>,
    ) -> Self {
        Self {
            ctx,
            resource,
            heading,
        }
    }

    fn mappings(&self) -> DiscoveryMapCache<'a> {
        DiscoveryMapCache::new(self.ctx.global_store())
    }

    /// Write every unmapped item to the default host.
    ///
    /// Returns `true` if at least one item caused a new write.
    pub async fn merge(
        &self,
        patient_id: u64,
        heading: &str,
        items: &[DiscoveryItem],
    ) -> CdrResult<bool> {
        let host = self.ctx.cfg().default_host();
        let mappings = self.mappings();
        let mut written = false;

        for item in items {
            if mappings.exists(&item.discovery_id) {
                tracing::debug!(discovery_id = %item.discovery_id, "discovery item already merged");
                continue;
            }

            let record = self
                .heading
                .post(host, patient_id, heading, &item.payload)
                .await?;
            mappings.set(
                &item.discovery_id,
                &DiscoveryMapping {
                    patient_id,
                    heading: heading.to_owned(),
                    host: record.host,
                    composition_uid: record.composition_uid,
                    source_id: record.source_id,
                },
            )?;
            written = true;
        }

        Ok(written)
    }

    /// Fetch and merge the discovery data feeding one heading.
    ///
    /// Headings without a configured discovery resource merge nothing.
    pub async fn merge_heading(&self, patient_id: u64, heading: &str) -> CdrResult<bool> {
        let Some(resource_name) = self.ctx.cfg().discovery_headings().get(heading) else {
            return Ok(false);
        };

        self.resource
            .fetch_patient_resources(patient_id, resource_name)
            .await?;
        let items = self.discovered_items(patient_id, heading, resource_name);
        tracing::info!(patient_id, heading, count = items.len(), "merging discovery data");
        self.merge(patient_id, heading, &items).await
    }

    /// Merge every configured discovery heading.
    pub async fn merge_all(&self, patient_id: u64) -> CdrResult<bool> {
        let mut written = false;
        for heading in self.ctx.cfg().discovery_headings().keys() {
            written |= self.merge_heading(patient_id, heading).await?;
        }
        Ok(written)
    }

    /// Convert the patient's cached resources of `resource_name` into heading payloads.
    pub fn discovered_items(
        &self,
        patient_id: u64,
        heading: &str,
        resource_name: &str,
    ) -> Vec<DiscoveryItem> {
        let store = self.ctx.session_store();
        let resources = ResourceCache::new(store);

        PatientCache::new(store)
            .resource_uuids(patient_id, resource_name)
            .into_iter()
            .filter_map(|uuid| {
                let resource = resources.get(resource_name, &uuid)?;
                let author = resources
                    .practitioner(resource_name, &uuid)
                    .and_then(|gp| resources.get("Practitioner", &gp))
                    .and_then(|gp| practitioner_name(&gp));
                let payload = to_pulsetile(heading, &resource, author.as_deref())?;
                Some(DiscoveryItem {
                    discovery_id: format!("{resource_name}/{uuid}"),
                    payload,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::services::Services;
    use crate::test_support::{Harness, TEST_NHS_NUMBER};
    use serde_json::json;

    fn item(id: &str) -> DiscoveryItem {
        DiscoveryItem {
            discovery_id: id.to_owned(),
            payload: json!({"problem": "Asthma", "author": "Discovery"}),
        }
    }

    #[tokio::test]
    async fn already_mapped_item_is_not_posted_again() {
        let harness = Harness::new();
        let ctx = harness.context(Role::Idcr);
        let services = Services::new(&ctx);

        let first = services
            .discovery
            .merge(TEST_NHS_NUMBER, "problems", &[item("Condition/d1")])
            .await
            .expect("merge");
        assert!(first);
        assert_eq!(harness.openehr.calls("post_composition"), 1);

        let second = services
            .discovery
            .merge(TEST_NHS_NUMBER, "problems", &[item("Condition/d1")])
            .await
            .expect("merge");
        assert!(!second);
        assert_eq!(harness.openehr.calls("post_composition"), 1);
    }

    #[tokio::test]
    async fn mapping_is_shared_across_sessions() {
        let harness = Harness::new();
        let ctx = harness.context(Role::Idcr);
        Services::new(&ctx)
            .discovery
            .merge(TEST_NHS_NUMBER, "problems", &[item("Condition/d1")])
            .await
            .expect("merge");

        let other = harness.context_for("other-session", Role::Idcr, None);
        let merged = Services::new(&other)
            .discovery
            .merge(TEST_NHS_NUMBER, "problems", &[item("Condition/d1")])
            .await
            .expect("merge");
        assert!(!merged);
    }

    #[tokio::test]
    async fn merge_heading_converts_cached_conditions() {
        let harness = Harness::new();
        let ctx = harness.context(Role::Idcr);
        let services = Services::new(&ctx);

        assert!(services
            .discovery
            .merge_heading(TEST_NHS_NUMBER, "problems")
            .await
            .expect("merge"));

        let posted = harness.openehr.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(
            posted[0]["problem_list/problems_and_issues:0/problem_diagnosis:0/problem_diagnosis_name|value"],
            "Hypertension"
        );
        assert_eq!(posted[0]["ctx/composer_name"], "Dr Anne Smith");

        let mapping = DiscoveryMapCache::new(ctx.global_store())
            .get("Condition/cond1")
            .expect("read")
            .expect("mapped");
        assert_eq!(mapping.heading, "problems");
        assert_eq!(mapping.host, "ethercis");

        assert!(!services
            .discovery
            .merge_all(TEST_NHS_NUMBER)
            .await
            .expect("merge all"));
    }

    #[tokio::test]
    async fn unconfigured_heading_merges_nothing() {
        let harness = Harness::new();
        let ctx = harness.context(Role::Idcr);
        let merged = Services::new(&ctx)
            .discovery
            .merge_heading(TEST_NHS_NUMBER, "procedures")
            .await
            .expect("merge");
        assert!(!merged);
        assert_eq!(harness.fhir.calls("get_patient_resources"), 0);
    }
}
