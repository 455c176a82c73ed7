//! FHIR resource -> PulseTile payload conversion for discovery merging.
//!
//! The payloads produced here are what a clinician would POST for the heading, so they go
//! through the heading's own `post` template on the way to openEHR.

use crate::constants::DISCOVERY_AUTHOR;
use openehr::transform::parse_date_ms;
use serde_json::{json, Map, Value};

const SNOMED_SYSTEM: &str = "http://snomed.info/sct";

/// Convert a cached FHIR resource into a PulseTile payload for `heading`.
///
/// Returns `None` when the resource type does not feed that heading or the resource lacks
/// the field the heading is named by.
pub(crate) fn to_pulsetile(heading: &str, resource: &Value, author: Option<&str>) -> Option<Value> {
    let resource_type = resource.get("resourceType")?.as_str()?;
    let mut payload = match (heading, resource_type) {
        ("problems", "Condition") => condition(resource)?,
        ("vaccinations", "Immunization") => immunization(resource)?,
        ("allergies", "AllergyIntolerance") => allergy(resource)?,
        ("medications", "MedicationStatement") => medication(resource)?,
        _ => return None,
    };

    payload.insert(
        "author".into(),
        Value::from(author.unwrap_or(DISCOVERY_AUTHOR)),
    );
    Some(Value::Object(payload))
}

/// Display name of a Practitioner resource.
pub(crate) fn practitioner_name(resource: &Value) -> Option<String> {
    let name = first(resource.get("name")?)?;
    if let Some(text) = name.get("text").and_then(Value::as_str) {
        return Some(text.to_owned());
    }

    let parts: Vec<&str> = ["prefix", "given"]
        .iter()
        .filter_map(|field| name.get(*field).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .chain(name.get("family").and_then(Value::as_str))
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Primary address of a resource as one comma separated line.
pub(crate) fn address_line(resource: &Value) -> Option<String> {
    let address = first(resource.get("address")?)?;
    if let Some(text) = address.get("text").and_then(Value::as_str) {
        return Some(text.to_owned());
    }

    let parts: Vec<&str> = address
        .get("line")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .chain(
            ["city", "district", "postalCode"]
                .iter()
                .filter_map(|field| address.get(*field).and_then(Value::as_str)),
        )
        .filter(|p| !p.trim().is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

fn first(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(value),
        _ => None,
    }
}

/// `(text, code, terminology)` of a CodeableConcept.
fn coded(concept: Option<&Value>) -> Option<(String, Option<String>, Option<String>)> {
    let concept = concept?;
    let coding = concept
        .get("coding")
        .and_then(Value::as_array)
        .and_then(|c| c.first());

    let text = concept
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| coding.and_then(|c| c.get("display")).and_then(Value::as_str))?
        .to_owned();

    let code = coding
        .and_then(|c| c.get("code"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let terminology = coding
        .and_then(|c| c.get("system"))
        .and_then(Value::as_str)
        .map(|system| match system {
            SNOMED_SYSTEM => "SNOMED-CT".to_owned(),
            other => other.to_owned(),
        });

    Some((text, code, terminology))
}

fn note(resource: &Value) -> Option<&str> {
    resource
        .get("note")
        .and_then(first)
        .and_then(|n| n.get("text"))
        .and_then(Value::as_str)
}

fn date_ms(resource: &Value, fields: &[&str]) -> Option<i64> {
    fields
        .iter()
        .find_map(|field| resource.get(*field).and_then(Value::as_str))
        .and_then(parse_date_ms)
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        map.insert(key.to_owned(), value.into());
    }
}

fn condition(resource: &Value) -> Option<Map<String, Value>> {
    let (problem, code, terminology) = coded(resource.get("code"))?;
    let mut map = Map::new();
    map.insert("problem".into(), json!(problem));
    insert_opt(&mut map, "problemCode", code);
    insert_opt(&mut map, "problemTerminology", terminology);
    insert_opt(&mut map, "description", note(resource));
    insert_opt(
        &mut map,
        "dateOfOnset",
        date_ms(resource, &["onsetDateTime", "assertedDate", "recordedDate"]),
    );
    Some(map)
}

fn immunization(resource: &Value) -> Option<Map<String, Value>> {
    let (name, code, _) = coded(resource.get("vaccineCode"))?;
    let mut map = Map::new();
    map.insert("vaccinationName".into(), json!(name));
    insert_opt(&mut map, "vaccinationCode", code);
    insert_opt(&mut map, "comment", note(resource));
    insert_opt(
        &mut map,
        "vaccinationDateTime",
        date_ms(resource, &["occurrenceDateTime", "date"]),
    );
    Some(map)
}

fn allergy(resource: &Value) -> Option<Map<String, Value>> {
    let (cause, code, terminology) = coded(resource.get("code").or_else(|| resource.get("substance")))?;
    let reaction = resource.get("reaction").and_then(first).and_then(|r| {
        r.get("description")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| {
                r.get("manifestation")
                    .and_then(first)
                    .and_then(|m| coded(Some(m)))
                    .map(|(text, _, _)| text)
            })
    });

    let mut map = Map::new();
    map.insert("cause".into(), json!(cause));
    insert_opt(&mut map, "causeCode", code);
    insert_opt(&mut map, "causeTerminology", terminology);
    insert_opt(&mut map, "reaction", reaction);
    Some(map)
}

fn medication(resource: &Value) -> Option<Map<String, Value>> {
    let (name, code, terminology) = coded(resource.get("medicationCodeableConcept"))?;
    let dosage = resource.get("dosage").and_then(first);

    let mut map = Map::new();
    map.insert("name".into(), json!(name));
    insert_opt(&mut map, "medicationCode", code);
    insert_opt(&mut map, "medicationTerminology", terminology);
    insert_opt(
        &mut map,
        "doseAmount",
        dosage.and_then(|d| d.get("text")).and_then(Value::as_str),
    );
    insert_opt(
        &mut map,
        "route",
        dosage
            .and_then(|d| coded(d.get("route")))
            .map(|(text, _, _)| text),
    );
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_becomes_problem() {
        let condition = json!({
            "resourceType": "Condition",
            "id": "cond1",
            "code": {
                "coding": [{ "system": SNOMED_SYSTEM, "code": "38341003", "display": "Hypertension" }]
            },
            "onsetDateTime": "2019-01-28T10:13:48.312Z",
            "note": [{ "text": "Monitor monthly" }]
        });

        let payload = to_pulsetile("problems", &condition, Some("Dr Rao")).expect("mapped");
        assert_eq!(
            payload,
            json!({
                "problem": "Hypertension",
                "problemCode": "38341003",
                "problemTerminology": "SNOMED-CT",
                "description": "Monitor monthly",
                "dateOfOnset": 1548670428312i64,
                "author": "Dr Rao"
            })
        );
    }

    #[test]
    fn immunization_without_author_uses_discovery() {
        let immunization = json!({
            "resourceType": "Immunization",
            "vaccineCode": { "text": "Influenza" },
            "date": "2019-01-28"
        });

        let payload = to_pulsetile("vaccinations", &immunization, None).expect("mapped");
        assert_eq!(payload["vaccinationName"], "Influenza");
        assert_eq!(payload["author"], DISCOVERY_AUTHOR);
        assert!(payload["vaccinationDateTime"].is_i64());
    }

    #[test]
    fn allergy_reaction_falls_back_to_manifestation() {
        let allergy = json!({
            "resourceType": "AllergyIntolerance",
            "substance": { "text": "Penicillin" },
            "reaction": [{ "manifestation": [{ "text": "Rash" }] }]
        });
        let payload = to_pulsetile("allergies", &allergy, None).expect("mapped");
        assert_eq!(payload["cause"], "Penicillin");
        assert_eq!(payload["reaction"], "Rash");
    }

    #[test]
    fn medication_statement_dosage() {
        let statement = json!({
            "resourceType": "MedicationStatement",
            "medicationCodeableConcept": { "text": "Aspirin 75mg" },
            "dosage": [{ "text": "One daily", "route": { "text": "Oral" } }]
        });
        let payload = to_pulsetile("medications", &statement, None).expect("mapped");
        assert_eq!(payload["doseAmount"], "One daily");
        assert_eq!(payload["route"], "Oral");
    }

    #[test]
    fn mismatched_heading_or_missing_code_is_skipped() {
        let condition = json!({ "resourceType": "Condition", "code": { "text": "Asthma" } });
        assert_eq!(to_pulsetile("allergies", &condition, None), None);

        let uncoded = json!({ "resourceType": "Condition" });
        assert_eq!(to_pulsetile("problems", &uncoded, None), None);
    }

    #[test]
    fn practitioner_and_address_rendering() {
        let practitioner = json!({
            "name": [{ "prefix": ["Dr"], "given": ["Anne"], "family": "Smith" }],
            "address": [{ "line": ["1 High Street"], "city": "Leeds", "postalCode": "LS1 1AA" }]
        });
        assert_eq!(practitioner_name(&practitioner).as_deref(), Some("Dr Anne Smith"));
        assert_eq!(
            address_line(&practitioner).as_deref(),
            Some("1 High Street, Leeds, LS1 1AA")
        );
    }
}
