//! Input validation utilities.
//!
//! Commands run these checks before touching any service, so every message here is returned
//! to the caller unchanged.

use crate::config::CoreConfig;
use crate::{CdrError, CdrResult};
use cdr_types::SourceId;
use openehr::{HeadingDefinition, HeadingRegistry};

/// Validates a patient id and returns it as an NHS number.
///
/// Patient ids are NHS numbers: ten digits, no separators. The Modulus 11 check digit is not
/// verified because test patients (e.g. `9999999000`) do not carry valid check digits.
///
/// # Errors
///
/// Returns [`CdrError::BadRequest`] if the id is missing, empty or not numeric.
pub fn is_patient_id_valid(patient_id: Option<&str>) -> CdrResult<u64> {
    let Some(patient_id) = patient_id else {
        return Err(CdrError::BadRequest(
            "patientId undefined must be defined".into(),
        ));
    };

    if patient_id.is_empty() {
        return Err(CdrError::BadRequest(format!(
            "patientId {patient_id} must be defined"
        )));
    }

    if !patient_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CdrError::BadRequest(format!(
            "patientId {patient_id} is invalid"
        )));
    }

    patient_id
        .parse::<u64>()
        .map_err(|_| CdrError::BadRequest(format!("patientId {patient_id} is invalid")))
}

/// Validates that `heading` is both enabled and defined.
pub fn is_heading_valid<'a>(
    cfg: &CoreConfig,
    registry: &'a HeadingRegistry,
    heading: Option<&str>,
) -> CdrResult<&'a HeadingDefinition> {
    let name = heading.unwrap_or_default();
    registry
        .get(name)
        .filter(|_| cfg.is_heading_enabled(name))
        .ok_or_else(|| CdrError::BadRequest(format!("Invalid or missing heading: {name}")))
}

/// Validates that a heading can be written to.
pub fn is_heading_writable(definition: &HeadingDefinition) -> CdrResult<()> {
    if definition.post.is_none() {
        return Err(CdrError::UnprocessableEntity(format!(
            "heading {} not recognised, or no POST definition available",
            definition.name
        )));
    }
    Ok(())
}

/// Validates a `<host>_<uid>` source id.
pub fn is_source_id_valid(source_id: Option<&str>) -> CdrResult<SourceId> {
    let raw = source_id.unwrap_or_default();
    SourceId::parse(raw).map_err(|_| CdrError::BadRequest(format!("sourceId {raw} is invalid")))
}

/// Validates that a request body is a non-empty JSON object.
pub fn is_payload_valid(payload: &serde_json::Value) -> CdrResult<()> {
    match payload.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        _ => Err(CdrError::UnprocessableEntity(
            "request body must be a non-empty JSON object".into(),
        )),
    }
}
