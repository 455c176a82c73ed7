//! Heading definitions.
//!
//! A heading (allergies, problems, medications, ...) is a clinical-data category. Each heading
//! is declared in YAML and tells the services:
//! - which openEHR template backs it (`template_id`),
//! - how to query it (`aql`, with an `{{ehrId}}` placeholder),
//! - how to turn an AQL row into a PulseTile record (`get` template),
//! - how to turn a PulseTile record into a FLAT composition (`post` template, optional),
//! - which fields make up its summary and synopsis views.
//!
//! The built-in headings live in `crates/openehr/headings/` and are embedded at compile time.

use crate::transform::transform;
use crate::{OpenEhrError, OpenEhrResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const BUILTIN_HEADINGS: &[&str] = &[
    include_str!("../headings/allergies.yaml"),
    include_str!("../headings/contacts.yaml"),
    include_str!("../headings/medications.yaml"),
    include_str!("../headings/problems.yaml"),
    include_str!("../headings/procedures.yaml"),
    include_str!("../headings/vaccinations.yaml"),
];

/// A single heading definition.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeadingDefinition {
    pub name: String,
    pub template_id: String,
    pub aql: String,
    /// Field of the AQL row holding the record date.
    pub date_field: String,
    /// PulseTile fields returned by the summary view.
    pub summary_fields: Vec<String>,
    /// PulseTile field used as the synopsis text.
    pub synopsis_field: String,
    /// AQL row -> PulseTile template.
    pub get: Value,
    /// PulseTile -> FLAT composition template. Headings without one are read-only.
    #[serde(default)]
    pub post: Option<Value>,
}

impl HeadingDefinition {
    /// Parse a heading definition from YAML text.
    ///
    /// Uses `serde_path_to_error` to report the failing field path.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::Translation`] if the YAML does not match the schema, or
    /// [`OpenEhrError::InvalidInput`] if the AQL lacks the `{{ehrId}}` placeholder.
    pub fn parse(yaml_text: &str) -> OpenEhrResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

        let definition = match serde_path_to_error::deserialize::<_, Self>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(OpenEhrError::Translation(format!(
                    "heading schema mismatch at {path}: {source}"
                )));
            }
        };

        if !definition.aql.contains("{{ehrId}}") {
            return Err(OpenEhrError::InvalidInput(format!(
                "heading {} AQL must contain an {{{{ehrId}}}} placeholder",
                definition.name
            )));
        }

        Ok(definition)
    }

    /// Render the heading's AQL for one EHR.
    pub fn render_aql(&self, ehr_id: &str) -> String {
        self.aql.replace("{{ehrId}}", ehr_id)
    }

    /// Transform a raw AQL row into its PulseTile projection.
    pub fn to_pulsetile(&self, row: &Value) -> OpenEhrResult<Value> {
        transform(&self.get, row)
    }

    /// Transform a PulseTile payload into a FLAT composition.
    ///
    /// Returns `None` if this heading has no `post` template.
    pub fn to_flat(&self, payload: &Value) -> Option<OpenEhrResult<Value>> {
        self.post.as_ref().map(|template| transform(template, payload))
    }
}

/// Registry of known heading definitions, keyed by heading name.
#[derive(Clone, Debug, Default)]
pub struct HeadingRegistry {
    headings: BTreeMap<String, HeadingDefinition>,
}

impl HeadingRegistry {
    /// Registry holding the built-in heading definitions.
    pub fn builtin() -> OpenEhrResult<Self> {
        let mut registry = Self::default();
        for yaml in BUILTIN_HEADINGS {
            registry.insert(HeadingDefinition::parse(yaml)?);
        }
        Ok(registry)
    }

    /// Add or replace a heading definition.
    pub fn insert(&mut self, definition: HeadingDefinition) {
        self.headings.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&HeadingDefinition> {
        self.headings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.headings.keys().map(String::as_str)
    }
}
