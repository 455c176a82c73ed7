//! Fetches FHIR resources from the discovery service into the session cache.
//!
//! Each fetch is guarded twice: an exists-check on the target (already cached, nothing to do)
//! and an in-flight marker (another request is fetching it right now). Linked Practitioner,
//! Organization and Location resources are followed with an explicit work queue and a visited
//! set, so cyclic references terminate.

use super::TokenService;
use crate::caches::{PatientCache, ResourceCache};
use crate::context::CdrContext;
use crate::CdrResult;
use fhir::bundle::resource_identity;
use fhir::{collect_references, Bundle, ResourceReference};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::future::Future;

/// Result of a fetch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The target was already cached.
    Exists,
    /// Another request is fetching the target.
    Fetching,
    /// The remote call completed.
    Fetched {
        total_count: usize,
        processed_count: usize,
    },
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Fetched { .. })
    }
}

impl Serialize for FetchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        match self {
            FetchOutcome::Exists => {
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("exists", &true)?;
            }
            FetchOutcome::Fetching => {
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("fetching", &true)?;
            }
            FetchOutcome::Fetched {
                total_count,
                processed_count,
            } => {
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("totalCount", total_count)?;
                map.serialize_entry("processedCount", processed_count)?;
            }
        }
        map.end()
    }
}

#[derive(Clone, Copy)]
pub struct ResourceService<'a> {
    ctx: &'a CdrContext,
    token: TokenService<'a>,
}

impl<'a> ResourceService<'a> {
    pub fn new(ctx: &'a CdrContext, token: TokenService<'a>) -> Self {
        Self { ctx, token }
    }

    fn resources(&self) -> ResourceCache<'a> {
        ResourceCache::new(self.ctx.session_store())
    }

    fn patients(&self) -> PatientCache<'a> {
        PatientCache::new(self.ctx.session_store())
    }

    /// Run `fetch` under the in-flight marker `key`. The marker is cleared when the fetch
    /// finishes or is dropped.
    async fn guarded<F>(&self, key: &str, fetch: F) -> CdrResult<FetchOutcome>
    where
        F: Future<Output = CdrResult<FetchOutcome>>,
    {
        let Some(_marker) = FetchingGuard::acquire(self.resources(), key) else {
            tracing::debug!(key, "fetch already in progress");
            return Ok(FetchOutcome::Fetching);
        };
        fetch.await
    }

    /// Fetch the Patient resources matching an NHS number.
    pub async fn fetch_patients(&self, nhs_number: u64) -> CdrResult<FetchOutcome> {
        if self.patients().exists(nhs_number) {
            tracing::debug!(nhs_number, "patients already cached");
            return Ok(FetchOutcome::Exists);
        }

        let key = format!("patients:{nhs_number}");
        self.guarded(&key, async {
            tracing::info!(nhs_number, "fetching patients from discovery");
            let token = self.token.get().await?;
            let bundle = self.ctx.fhir().get_patients(nhs_number, &token).await?;
            self.store_bundle(nhs_number, &bundle, &token).await
        })
        .await
    }

    /// Fetch the resources of one type belonging to a patient.
    pub async fn fetch_patient_resources(
        &self,
        nhs_number: u64,
        resource_name: &str,
    ) -> CdrResult<FetchOutcome> {
        if self.patients().is_fetched(nhs_number, resource_name) {
            tracing::debug!(nhs_number, resource_name, "patient resources already cached");
            return Ok(FetchOutcome::Exists);
        }

        let key = format!("resources:{nhs_number}:{resource_name}");
        self.guarded(&key, async {
            if !self.patients().exists(nhs_number)
                && self.fetch_patients(nhs_number).await? == FetchOutcome::Fetching
            {
                tracing::debug!(nhs_number, resource_name, "patients still being fetched");
                return Ok(FetchOutcome::Fetching);
            }

            let patients = self.patients().patient_bundle(nhs_number, &self.resources());
            if patients.entry.is_empty() {
                tracing::debug!(nhs_number, resource_name, "no discovery patient to fetch for");
                return Ok(FetchOutcome::Fetched {
                    total_count: 0,
                    processed_count: 0,
                });
            }

            tracing::info!(nhs_number, resource_name, "fetching patient resources from discovery");
            let token = self.token.get().await?;
            let bundle = self
                .ctx
                .fhir()
                .get_patient_resources(&patients, resource_name, &token)
                .await?;

            let outcome = self.store_bundle(nhs_number, &bundle, &token).await?;
            self.patients().mark_fetched(nhs_number, resource_name);
            Ok(outcome)
        })
        .await
    }

    /// Fetch a single referenced resource and everything it links to.
    pub async fn fetch_resource(&self, reference: &ResourceReference) -> CdrResult<FetchOutcome> {
        if self
            .resources()
            .exists(reference.resource_type(), reference.id())
        {
            tracing::debug!(%reference, "resource already cached");
            return Ok(FetchOutcome::Exists);
        }

        let key = reference.to_string();
        self.guarded(&key, async {
            tracing::info!(%reference, "fetching resource from discovery");
            let token = self.token.get().await?;
            let resource = self.ctx.fhir().get_resource(reference, &token).await?;
            self.resources()
                .set(reference.resource_type(), reference.id(), resource.clone());

            let linked = self
                .follow_references(vec![(reference.clone(), resource)], &token)
                .await?;
            Ok(FetchOutcome::Fetched {
                total_count: 1,
                processed_count: 1 + linked,
            })
        })
        .await
    }

    /// Cache every new entry of `bundle`, index it under the patient and follow its links.
    async fn store_bundle(
        &self,
        nhs_number: u64,
        bundle: &Bundle,
        token: &str,
    ) -> CdrResult<FetchOutcome> {
        let resources = self.resources();
        let patients = self.patients();
        let mut processed = 0;
        let mut roots = Vec::new();

        for resource in bundle.resources() {
            let Some((resource_type, id)) = resource_identity(resource) else {
                tracing::warn!("skipping discovery resource without resourceType/id");
                continue;
            };

            if !resources.exists(resource_type, id) {
                resources.set(resource_type, id, resource.clone());
                processed += 1;
            }
            patients.add_resource(nhs_number, resource_type, id);
            roots.push((ResourceReference::new(resource_type, id), resource.clone()));
        }

        let linked = self.follow_references(roots, token).await?;

        Ok(FetchOutcome::Fetched {
            total_count: bundle.entry.len(),
            processed_count: processed + linked,
        })
    }

    /// Breadth-first walk over Practitioner / Organization / Location references.
    ///
    /// Returns the number of linked resources newly cached. A resource referencing a
    /// practitioner gets that practitioner's uuid attached as a back-reference.
    async fn follow_references(
        &self,
        roots: Vec<(ResourceReference, Value)>,
        token: &str,
    ) -> CdrResult<usize> {
        let resources = self.resources();
        let mut visited: HashSet<ResourceReference> = HashSet::new();
        let mut queue: VecDeque<(ResourceReference, ResourceReference)> = VecDeque::new();

        for (owner, resource) in roots {
            for reference in collect_references(&resource) {
                queue.push_back((owner.clone(), reference));
            }
            visited.insert(owner);
        }

        let mut fetched = 0;
        while let Some((owner, reference)) = queue.pop_front() {
            if reference.resource_type() == "Practitioner" {
                resources.set_practitioner(owner.resource_type(), owner.id(), reference.id());
            }

            if !visited.insert(reference.clone()) {
                continue;
            }

            let resource = match resources.get(reference.resource_type(), reference.id()) {
                Some(cached) => cached,
                None => {
                    let Some(marker) =
                        FetchingGuard::acquire(self.resources(), &reference.to_string())
                    else {
                        continue;
                    };
                    let resource = self.ctx.fhir().get_resource(&reference, token).await?;
                    drop(marker);

                    resources.set(reference.resource_type(), reference.id(), resource.clone());
                    fetched += 1;
                    resource
                }
            };

            for next in collect_references(&resource) {
                queue.push_back((reference.clone(), next));
            }
        }

        Ok(fetched)
    }
}

/// In-flight marker held for the duration of one remote fetch.
struct FetchingGuard<'a> {
    resources: ResourceCache<'a>,
    key: String,
}

impl<'a> FetchingGuard<'a> {
    /// Set the marker, or `None` if another request already holds it.
    fn acquire(resources: ResourceCache<'a>, key: &str) -> Option<Self> {
        if resources.is_fetching(key) {
            return None;
        }
        resources.set_fetching(key);
        Some(Self {
            resources,
            key: key.to_owned(),
        })
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        self.resources.clear_fetching(&self.key);
    }
}
