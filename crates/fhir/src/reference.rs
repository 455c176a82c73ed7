//! FHIR resource references (`Practitioner/123`).

use crate::FhirError;
use serde_json::Value;
use std::fmt;

/// Resource types whose inline references are followed when caching discovery data.
pub const LINKED_RESOURCE_TYPES: &[&str] = &["Practitioner", "Organization", "Location"];

/// A `<ResourceType>/<id>` reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceReference {
    resource_type: String,
    id: String,
}

impl ResourceReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse a relative (`Practitioner/123`) or absolute (`https://host/fhir/Practitioner/123`)
    /// reference. Version suffixes (`/_history/2`) are dropped.
    pub fn parse(reference: &str) -> Result<Self, FhirError> {
        let trimmed = reference.trim().trim_end_matches('/');
        let trimmed = match trimmed.find("/_history/") {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        };

        let mut parts = trimmed.rsplitn(2, '/');
        let id = parts.next().unwrap_or_default();
        let resource_type = parts
            .next()
            .map(|rest| rest.rsplit('/').next().unwrap_or(rest))
            .unwrap_or_default();

        let type_ok = resource_type
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase());
        if !type_ok || id.is_empty() {
            return Err(FhirError::InvalidReference(reference.to_owned()));
        }

        Ok(Self::new(resource_type, id))
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Collect every inline `{"reference": "..."}` in `resource` that points at a
/// Practitioner, Organization or Location, in document order, without duplicates.
pub fn collect_references(resource: &Value) -> Vec<ResourceReference> {
    fn walk(node: &Value, out: &mut Vec<ResourceReference>) {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("reference") {
                    if let Ok(parsed) = ResourceReference::parse(reference) {
                        if LINKED_RESOURCE_TYPES.contains(&parsed.resource_type())
                            && !out.contains(&parsed)
                        {
                            out.push(parsed);
                        }
                    }
                }
                for value in map.values() {
                    walk(value, out);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(resource, &mut out);
    out
}
