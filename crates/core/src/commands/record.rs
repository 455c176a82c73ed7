use super::authorised_patient;
use crate::caches::RecordState;
use crate::context::CdrContext;
use crate::services::Services;
use crate::CdrResult;

pub struct CheckRecordCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> CheckRecordCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, patient_id: Option<&str>) -> CdrResult<RecordState> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        Ok(Services::new(self.ctx)
            .record_state
            .check(patient_id)
            .await)
    }
}
