//! FHIR `Bundle` wire model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A searchset bundle as returned by the discovery service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType", default = "bundle_type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

/// One bundle entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    pub resource: Value,
}

fn bundle_type() -> String {
    "Bundle".to_owned()
}

impl Bundle {
    /// Build a bundle from resources.
    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Self {
        let entry: Vec<BundleEntry> = resources
            .into_iter()
            .map(|resource| BundleEntry {
                full_url: None,
                resource,
            })
            .collect();

        Self {
            resource_type: bundle_type(),
            total: Some(entry.len() as u64),
            entry,
        }
    }

    /// Iterate the contained resources.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entry.iter().map(|e| &e.resource)
    }
}

/// The `resourceType` and `id` of a raw resource, if both are present.
pub fn resource_identity(resource: &Value) -> Option<(&str, &str)> {
    let resource_type = resource.get("resourceType")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some((resource_type, id))
}
