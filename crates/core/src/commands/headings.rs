//! Heading read and write commands.

use super::authorised_patient;
use crate::context::{CdrContext, Role};
use crate::services::{HeadingFormat, Services, WrittenRecord};
use crate::validation::{
    is_heading_valid, is_heading_writable, is_payload_valid, is_source_id_valid,
};
use crate::{CdrError, CdrResult};
use serde_json::{json, Map, Value};

/// Summary of every record of a heading, newest first.
pub struct GetHeadingSummaryCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> GetHeadingSummaryCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
    ) -> CdrResult<Vec<Value>> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;

        let services = Services::new(self.ctx);
        services
            .heading
            .fetch_all_hosts(patient_id, &definition.name)
            .await;
        services
            .heading
            .get_summary(patient_id, &definition.name)
            .await
    }
}

/// Full detail of one record.
pub struct GetHeadingDetailCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> GetHeadingDetailCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
        source_id: Option<&str>,
    ) -> CdrResult<Value> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;
        let source_id = is_source_id_valid(source_id)?;

        let services = Services::new(self.ctx);
        services
            .heading
            .fetch_all_hosts(patient_id, &definition.name)
            .await;

        if !services
            .heading
            .is_owned(patient_id, &definition.name, &source_id)?
        {
            return Err(CdrError::NotFound(format!(
                "sourceId {source_id} not found"
            )));
        }

        services
            .heading
            .get_by_source_id(&source_id, HeadingFormat::Detail)
            .await
    }
}

/// The newest few records of every enabled heading.
pub struct GetPatientSynopsisCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> GetPatientSynopsisCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, patient_id: Option<&str>) -> CdrResult<Value> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let services = Services::new(self.ctx);
        let max = self.ctx.cfg().synopsis_max();

        let mut synopsis = Map::new();
        for heading in self.ctx.cfg().headings() {
            services.heading.fetch_all_hosts(patient_id, heading).await;
            let entries = services
                .heading
                .get_synopsis(patient_id, heading, max)
                .await?;
            synopsis.insert(heading.clone(), Value::Array(entries));
        }
        Ok(Value::Object(synopsis))
    }
}

/// Create a record on the default host.
pub struct PostHeadingCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> PostHeadingCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
        payload: &Value,
    ) -> CdrResult<WrittenRecord> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;
        is_heading_writable(definition)?;
        is_payload_valid(payload)?;

        Services::new(self.ctx)
            .heading
            .post(
                self.ctx.cfg().default_host(),
                patient_id,
                &definition.name,
                payload,
            )
            .await
    }
}

/// Replace an existing record.
pub struct PutHeadingCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> PutHeadingCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
        source_id: Option<&str>,
        payload: &Value,
    ) -> CdrResult<WrittenRecord> {
        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;
        is_heading_writable(definition)?;
        let source_id = is_source_id_valid(source_id)?;
        is_payload_valid(payload)?;

        let services = Services::new(self.ctx);
        services
            .heading
            .fetch_all_hosts(patient_id, &definition.name)
            .await;
        services
            .heading
            .put(patient_id, &definition.name, &source_id, payload)
            .await
    }
}

/// Delete a record. Clinicians only.
pub struct DeleteHeadingCommand<'a> {
    ctx: &'a CdrContext,
}

impl<'a> DeleteHeadingCommand<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(
        &self,
        patient_id: Option<&str>,
        heading: Option<&str>,
        source_id: Option<&str>,
    ) -> CdrResult<Value> {
        if self.ctx.session().role() == Role::PhrUser {
            return Err(CdrError::Forbidden(
                "you do not have the rights to delete records".into(),
            ));
        }

        let patient_id = authorised_patient(self.ctx, patient_id)?;
        let definition = is_heading_valid(self.ctx.cfg(), self.ctx.registry(), heading)?;
        let source_id = is_source_id_valid(source_id)?;

        let services = Services::new(self.ctx);
        services
            .heading
            .fetch_all_hosts(patient_id, &definition.name)
            .await;
        services
            .heading
            .delete(patient_id, &definition.name, &source_id)
            .await?;

        Ok(json!({
            "deleted": true,
            "patientId": patient_id,
            "heading": definition.name,
            "sourceId": source_id.to_string(),
        }))
    }
}
