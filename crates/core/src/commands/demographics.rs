use super::authorised_patient;
use crate::context::CdrContext;
use crate::services::{Demographics, Services};
use crate::CdrResult;

pub struct GetDemographicsCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> GetDemographicsCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, patient_id: Option<&str>) -> CdrResult<Demographics> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        Services::new(self.ctx)
            .demographics
            .get_demographics(patient_id)
            .await
    }
}
