//! Command layer.
//!
//! A command validates the raw request inputs, checks the session may access the patient, and
//! delegates to the services. Every validation failure surfaces as a [`crate::CdrError`] with
//! the message the caller sees.

pub mod demographics;
pub mod discovery;
pub mod headings;
pub mod record;

pub use demographics::GetDemographicsCommand;
pub use discovery::{MergeDiscoveryDataCommand, MergeResult};
pub use headings::{
    DeleteHeadingCommand, GetHeadingDetailCommand, GetHeadingSummaryCommand,
    GetPatientSynopsisCommand, PostHeadingCommand, PutHeadingCommand,
};
pub use record::CheckRecordCommand;

use crate::context::CdrContext;
use crate::validation::is_patient_id_valid;
use crate::CdrResult;

/// Validated patient id the session is allowed to access.
pub(crate) fn authorised_patient(ctx: &CdrContext, patient_id: Option<&str>) -> CdrResult<u64> {
    let patient_id = is_patient_id_valid(patient_id)?;
    ctx.session().authorise(patient_id)?;
    Ok(patient_id)
}
