//! Patient demographics derived from discovery data.

use super::mapping::{address_line, practitioner_name};
use super::ResourceService;
use crate::caches::{DemographicsCache, PatientCache, ResourceCache};
use crate::context::CdrContext;
use crate::{CdrError, CdrResult};
use fhir::{collect_references, Patient, PatientData};
use openehr::transform::parse_date_ms;
use serde::{Deserialize, Serialize};

/// Demographics as returned to PulseTile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    pub id: u64,
    pub nhs_number: u64,
    pub name: String,
    pub gender: String,
    /// Epoch milliseconds.
    pub date_of_birth: Option<i64>,
    pub address: String,
    pub phone: String,
    pub gp_name: String,
    pub gp_address: String,
    /// Patient id on the discovery service.
    pub pas_no: String,
}

#[derive(Clone, Copy)]
pub struct DemographicsService<'a> {
    ctx: &'a CdrContext,
    resource: ResourceService<'a>,
}

impl<'a> DemographicsService<'a> {
    pub fn new(ctx: &'a CdrContext, resource: ResourceService<'a>) -> Self {
        Self { ctx, resource }
    }

    /// Cached demographics, or fetch the patient from discovery and derive them.
    pub async fn get_demographics(&self, nhs_number: u64) -> CdrResult<Demographics> {
        let store = self.ctx.session_store();
        let cache = DemographicsCache::new(store);
        if let Some(cached) = cache.get(nhs_number)? {
            tracing::debug!(nhs_number, "demographics served from cache");
            return Ok(cached);
        }

        self.resource.fetch_patients(nhs_number).await?;
        self.resource
            .fetch_patient_resources(nhs_number, "Patient")
            .await?;

        let resources = ResourceCache::new(store);
        let patient = PatientCache::new(store)
            .resource_uuids(nhs_number, "Patient")
            .into_iter()
            .find_map(|uuid| resources.get("Patient", &uuid))
            .ok_or_else(|| {
                CdrError::NotFound(format!("patient {nhs_number} not found on discovery"))
            })?;
        let data = Patient::parse(&patient)?;

        let demographics = derive(nhs_number, &data, &resources);
        cache.set(nhs_number, &demographics)?;
        Ok(demographics)
    }
}

fn derive(nhs_number: u64, data: &PatientData, resources: &ResourceCache<'_>) -> Demographics {
    let gp = data
        .general_practitioner
        .as_ref()
        .filter(|r| r.resource_type() == "Practitioner")
        .and_then(|r| resources.get("Practitioner", r.id()));

    let organisation = gp
        .as_ref()
        .and_then(|gp| {
            collect_references(gp)
                .into_iter()
                .find(|r| r.resource_type() == "Organization")
        })
        .or_else(|| data.managing_organization.clone())
        .and_then(|r| resources.get("Organization", r.id()));

    Demographics {
        id: nhs_number,
        nhs_number,
        name: data.display_name().unwrap_or_default(),
        gender: data.gender.as_deref().map(capitalise).unwrap_or_default(),
        date_of_birth: data.birth_date.as_deref().and_then(parse_date_ms),
        address: data.address.clone().unwrap_or_default(),
        phone: data.phone.clone().unwrap_or_default(),
        gp_name: gp.as_ref().and_then(practitioner_name).unwrap_or_default(),
        gp_address: organisation
            .as_ref()
            .and_then(address_line)
            .unwrap_or_default(),
        pas_no: data.id.clone(),
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
