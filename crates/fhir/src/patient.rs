//! FHIR-aligned patient wire model and translation helpers.
//!
//! This module provides both a domain-level type and a wire model for Patient resources
//! returned by the discovery service.
//!
//! Responsibilities:
//! - Define a public flat domain type ([`PatientData`]) for the demographics service
//! - Define a wire model for deserialisation of the FHIR JSON
//! - Translate between the two, picking the primary name/address/phone
//!
//! Notes:
//! - Unlike on-disk records, remote resources carry many fields we do not use, so unknown keys
//!   are ignored rather than rejected.

use crate::reference::ResourceReference;
use crate::FhirError;
use serde::Deserialize;
use serde_json::Value;

/// Identifier system for NHS numbers.
pub const NHS_NUMBER_SYSTEM: &str = "https://fhir.nhs.uk/Id/nhs-number";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Domain-level carrier for patient data (flat structure).
///
/// The wire format supports multiple names, addresses and contact points; this flat structure
/// keeps the primary one of each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientData {
    /// Resource id on the discovery service.
    pub id: String,

    /// NHS number from the patient's identifiers.
    pub nhs_number: Option<u64>,

    /// Free-text name, when the server supplies one.
    pub name_text: Option<String>,

    pub prefix: Option<String>,
    pub given: Vec<String>,
    pub family: Option<String>,

    /// Administrative gender (`male`, `female`, `other`, `unknown`).
    pub gender: Option<String>,

    /// Date of birth (ISO 8601 date format: YYYY-MM-DD).
    pub birth_date: Option<String>,

    /// Primary address rendered as a single comma separated line.
    pub address: Option<String>,

    /// First phone contact point.
    pub phone: Option<String>,

    /// Registered GP.
    pub general_practitioner: Option<ResourceReference>,

    /// Organisation holding the record.
    pub managing_organization: Option<ResourceReference>,
}

impl PatientData {
    /// Human readable name: the text form if present, else `prefix given family`.
    pub fn display_name(&self) -> Option<String> {
        if let Some(text) = self.name_text.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(text.clone());
        }

        let parts: Vec<&str> = self
            .prefix
            .iter()
            .map(String::as_str)
            .chain(self.given.iter().map(String::as_str))
            .chain(self.family.iter().map(String::as_str))
            .filter(|p| !p.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse a Patient resource from FHIR JSON.
    ///
    /// This uses `serde_path_to_error` to surface a best-effort path (e.g. `name.0.given`)
    /// to the failing field when the JSON does not match the wire schema.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - any known field has an unexpected type,
    /// - resourceType is not "Patient".
    pub fn parse(resource: &Value) -> Result<PatientData, FhirError> {
        let wire = match serde_path_to_error::deserialize::<_, PatientWire>(resource) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(FhirError::Translation(format!(
                    "Patient schema mismatch at {path}: {source}"
                )));
            }
        };

        if wire.resource_type != "Patient" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Patient', got '{}'",
                wire.resource_type
            )));
        }

        Ok(wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
struct PatientWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    id: String,

    #[serde(default)]
    identifier: Vec<IdentifierWire>,

    #[serde(default)]
    name: Vec<HumanNameWire>,

    #[serde(default)]
    gender: Option<String>,

    #[serde(rename = "birthDate", default)]
    birth_date: Option<String>,

    #[serde(default)]
    address: Vec<AddressWire>,

    #[serde(default)]
    telecom: Vec<ContactPointWire>,

    #[serde(rename = "generalPractitioner", default)]
    general_practitioner: Vec<ReferenceWire>,

    #[serde(rename = "managingOrganization", default)]
    managing_organization: Option<ReferenceWire>,
}

#[derive(Clone, Debug, Deserialize)]
struct IdentifierWire {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct HumanNameWire {
    #[serde(rename = "use", default)]
    use_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    given: Vec<String>,
    #[serde(default)]
    prefix: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct AddressWire {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    line: Vec<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    district: Option<String>,
    #[serde(rename = "postalCode", default)]
    postal_code: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ContactPointWire {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ReferenceWire {
    #[serde(default)]
    reference: Option<String>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: PatientWire) -> PatientData {
    let nhs_number = wire
        .identifier
        .iter()
        .find(|i| i.system.as_deref() == Some(NHS_NUMBER_SYSTEM))
        .and_then(|i| i.value.as_deref())
        .and_then(|v| v.replace(' ', "").parse::<u64>().ok());

    // Prefer the official name, else the first one.
    let name = wire
        .name
        .iter()
        .find(|n| n.use_type.as_deref() == Some("official"))
        .or_else(|| wire.name.first());

    let address = wire.address.first().and_then(render_address);

    let phone = wire
        .telecom
        .iter()
        .find(|t| t.system.as_deref().map_or(true, |s| s == "phone"))
        .and_then(|t| t.value.clone());

    PatientData {
        id: wire.id,
        nhs_number,
        name_text: name.and_then(|n| n.text.clone()),
        prefix: name.and_then(|n| n.prefix.first().cloned()),
        given: name.map(|n| n.given.clone()).unwrap_or_default(),
        family: name.and_then(|n| n.family.clone()),
        gender: wire.gender,
        birth_date: wire.birth_date,
        address,
        phone,
        general_practitioner: wire
            .general_practitioner
            .iter()
            .find_map(|r| r.reference.as_deref())
            .and_then(|r| ResourceReference::parse(r).ok()),
        managing_organization: wire
            .managing_organization
            .and_then(|r| r.reference)
            .and_then(|r| ResourceReference::parse(&r).ok()),
    }
}

fn render_address(address: &AddressWire) -> Option<String> {
    if let Some(text) = address.text.as_ref().filter(|t| !t.trim().is_empty()) {
        return Some(text.clone());
    }

    let parts: Vec<&str> = address
        .line
        .iter()
        .map(String::as_str)
        .chain(address.city.as_deref())
        .chain(address.district.as_deref())
        .chain(address.postal_code.as_deref())
        .filter(|p| !p.trim().is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
