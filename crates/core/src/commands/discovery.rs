use super::authorised_patient;
use crate::context::CdrContext;
use crate::services::Services;
use crate::validation::is_heading_valid;
use crate::CdrResult;
use serde::Serialize;

/// Whether the merge wrote anything, i.e. whether the client should reload the heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub refresh: bool,
}

pub struct MergeDiscoveryDataCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> MergeDiscoveryDataCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
    ) -> CdrResult<MergeResult> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;

        let refresh = Services::new(self.ctx)
            .discovery
            .merge_heading(patient_id, &definition.name)
            .await?;
        Ok(MergeResult { refresh })
    }
}
