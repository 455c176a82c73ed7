//! Heading records: fetch from openEHR hosts, cache, project to PulseTile, write back.

use crate::caches::{DiscoveryMapCache, HeadingCache, HeadingEntry};
use crate::context::CdrContext;
use crate::validation::is_heading_writable;
use crate::{CdrError, CdrResult};
use cdr_types::SourceId;
use openehr::transform::parse_date_ms;
use openehr::HeadingDefinition;
use serde::Serialize;
use serde_json::{Map, Value};

/// Response shape of a heading record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadingFormat {
    /// The full PulseTile projection.
    Detail,
    /// The heading's summary fields plus `source` and `sourceId`.
    Summary,
    /// `{sourceId, text}` from the heading's synopsis field.
    Synopsis,
}

/// Where a POST or PUT landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenRecord {
    pub host: String,
    pub heading: String,
    pub composition_uid: String,
    pub source_id: SourceId,
}

#[derive(Clone, Copy)]
pub struct HeadingService<'a> {
    ctx: &'a CdrContext,
}

impl<'a> HeadingService<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    fn cache(&self) -> HeadingCache<'a> {
        HeadingCache::new(self.ctx.session_store())
    }

    fn definition(&self, heading: &str) -> CdrResult<&'a HeadingDefinition> {
        self.ctx
            .registry()
            .get(heading)
            .ok_or_else(|| CdrError::BadRequest(format!("Invalid or missing heading: {heading}")))
    }

    /// Load a heading's records from one host into the cache.
    ///
    /// Remote failures are logged and reported as `false`; the caller treats them as "no data".
    pub async fn fetch(&self, host: &str, patient_id: u64, heading: &str) -> bool {
        if self.cache().exists_for_host(patient_id, heading, host) {
            tracing::debug!(host, patient_id, heading, "heading already cached");
            return true;
        }

        match self.fetch_from_host(host, patient_id, heading).await {
            Ok(count) => {
                tracing::info!(host, patient_id, heading, count, "fetched heading records");
                self.cache().mark_host_fetched(patient_id, heading, host);
                true
            }
            Err(e) => {
                tracing::warn!(host, patient_id, heading, error = %e, "heading fetch failed");
                false
            }
        }
    }

    /// Fetch a heading from every configured host.
    pub async fn fetch_all_hosts(&self, patient_id: u64, heading: &str) {
        for host in self.ctx.cfg().host_names() {
            self.fetch(host, patient_id, heading).await;
        }
    }

    async fn fetch_from_host(&self, host: &str, patient_id: u64, heading: &str) -> CdrResult<usize> {
        let definition = self.definition(heading)?;
        let Some(ehr_id) = self.ctx.openehr().get_ehr_id(host, patient_id).await? else {
            tracing::debug!(host, patient_id, "no EHR on host");
            return Ok(0);
        };

        let rows = self
            .ctx
            .openehr()
            .query(host, &definition.render_aql(&ehr_id))
            .await?;

        let cache = self.cache();
        let mut count = 0;
        for row in rows {
            let Some(uid) = row.get("uid").and_then(Value::as_str) else {
                tracing::warn!(host, heading, "skipping AQL row without uid");
                continue;
            };
            let source_id = SourceId::new(host, uid)?;

            let date = row
                .get(&definition.date_field)
                .or_else(|| row.get("date_created"))
                .and_then(Value::as_str)
                .and_then(parse_date_ms)
                .unwrap_or(0);

            let entry = HeadingEntry {
                patient_id,
                heading: heading.to_owned(),
                host: host.to_owned(),
                date,
                composition_id: Some(uid.to_owned()),
                data: row.clone(),
                pulsetile: None,
            };
            cache.add(&source_id, &entry)?;
            count += 1;
        }

        Ok(count)
    }

    fn entry(&self, source_id: &SourceId) -> CdrResult<HeadingEntry> {
        self.cache()
            .get(source_id)?
            .ok_or_else(|| CdrError::NotFound(format!("sourceId {source_id} not found")))
    }

    /// Like [`Self::entry`], but the record must belong to `patient_id` and `heading`.
    fn owned_entry(
        &self,
        patient_id: u64,
        heading: &str,
        source_id: &SourceId,
    ) -> CdrResult<HeadingEntry> {
        let entry = self.entry(source_id)?;
        if entry.patient_id != patient_id || entry.heading != heading {
            return Err(CdrError::NotFound(format!(
                "sourceId {source_id} not found for patient {patient_id} heading {heading}"
            )));
        }
        Ok(entry)
    }

    /// True if `source_id` is a cached record of this patient and heading.
    pub fn is_owned(&self, patient_id: u64, heading: &str, source_id: &SourceId) -> CdrResult<bool> {
        match self.owned_entry(patient_id, heading, source_id) {
            Ok(_) => Ok(true),
            Err(CdrError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A cached record in the requested format. The PulseTile projection is computed once and
    /// stored on the entry.
    pub async fn get_by_source_id(
        &self,
        source_id: &SourceId,
        format: HeadingFormat,
    ) -> CdrResult<Value> {
        let entry = self.entry(source_id)?;
        let definition = self.definition(&entry.heading)?;

        let pulsetile = match entry.pulsetile {
            Some(memoised) => memoised,
            None => {
                let mut projected = definition.to_pulsetile(&entry.data)?;
                if let Value::Object(map) = &mut projected {
                    map.insert("source".into(), Value::from(entry.host.as_str()));
                    map.insert("sourceId".into(), Value::from(source_id.to_string()));
                }
                self.cache().set_pulsetile(source_id, projected.clone());
                projected
            }
        };

        Ok(match format {
            HeadingFormat::Detail => pulsetile,
            HeadingFormat::Summary => {
                let mut summary = Map::new();
                for field in definition
                    .summary_fields
                    .iter()
                    .map(String::as_str)
                    .chain(["source", "sourceId"])
                {
                    if let Some(value) = pulsetile.get(field) {
                        summary.insert(field.to_owned(), value.clone());
                    }
                }
                Value::Object(summary)
            }
            HeadingFormat::Synopsis => {
                let text = pulsetile
                    .get(&definition.synopsis_field)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                serde_json::json!({ "sourceId": source_id.to_string(), "text": text })
            }
        })
    }

    pub fn get_all_source_ids(&self, patient_id: u64, heading: &str) -> Vec<SourceId> {
        self.cache().source_ids(patient_id, heading)
    }

    /// Summary view of every cached record, newest first.
    pub async fn get_summary(&self, patient_id: u64, heading: &str) -> CdrResult<Vec<Value>> {
        let mut out = Vec::new();
        for source_id in self.cache().source_ids_by_date(patient_id, heading) {
            out.push(
                self.get_by_source_id(&source_id, HeadingFormat::Summary)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Synopsis view of the `max` newest records.
    pub async fn get_synopsis(
        &self,
        patient_id: u64,
        heading: &str,
        max: usize,
    ) -> CdrResult<Vec<Value>> {
        let mut out = Vec::new();
        for source_id in self
            .cache()
            .source_ids_by_date(patient_id, heading)
            .into_iter()
            .take(max)
        {
            out.push(
                self.get_by_source_id(&source_id, HeadingFormat::Synopsis)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Write a new record to `host` and drop that host's cached records of the heading.
    pub async fn post(
        &self,
        host: &str,
        patient_id: u64,
        heading: &str,
        payload: &Value,
    ) -> CdrResult<WrittenRecord> {
        let definition = self.definition(heading)?;
        is_heading_writable(definition)?;
        let flat = Self::to_flat(definition, payload)?;

        tracing::info!(host, patient_id, heading, "posting heading record");
        let openehr = self.ctx.openehr();
        let ehr_id = match openehr.get_ehr_id(host, patient_id).await? {
            Some(id) => id,
            None => openehr.create_ehr(host, patient_id).await?,
        };
        let composition_uid = openehr
            .post_composition(host, &ehr_id, &definition.template_id, &flat)
            .await?;

        self.cache().delete_host(patient_id, heading, host)?;

        Ok(WrittenRecord {
            host: host.to_owned(),
            heading: heading.to_owned(),
            source_id: SourceId::new(host, &composition_uid)?,
            composition_uid,
        })
    }

    /// Replace an existing record and drop its host's cached records of the heading.
    pub async fn put(
        &self,
        patient_id: u64,
        heading: &str,
        source_id: &SourceId,
        payload: &Value,
    ) -> CdrResult<WrittenRecord> {
        let definition = self.definition(heading)?;
        is_heading_writable(definition)?;
        let entry = self.owned_entry(patient_id, heading, source_id)?;
        let composition_id = entry
            .composition_id
            .as_deref()
            .ok_or_else(|| CdrError::NotFound(format!("sourceId {source_id} has no composition")))?;
        let flat = Self::to_flat(definition, payload)?;

        tracing::info!(host = %entry.host, patient_id, heading, %source_id, "updating heading record");
        let composition_uid = self
            .ctx
            .openehr()
            .put_composition(&entry.host, composition_id, &definition.template_id, &flat)
            .await?;

        self.cache().delete_host(patient_id, heading, &entry.host)?;

        Ok(WrittenRecord {
            host: entry.host.clone(),
            heading: heading.to_owned(),
            source_id: SourceId::new(&entry.host, &composition_uid)?,
            composition_uid,
        })
    }

    /// Delete a record remotely, then remove it from the cache indices.
    pub async fn delete(
        &self,
        patient_id: u64,
        heading: &str,
        source_id: &SourceId,
    ) -> CdrResult<()> {
        let entry = self.owned_entry(patient_id, heading, source_id)?;
        let composition_id = entry
            .composition_id
            .as_deref()
            .ok_or_else(|| CdrError::NotFound(format!("sourceId {source_id} has no composition")))?;

        tracing::info!(host = %entry.host, patient_id, heading, %source_id, "deleting heading record");
        self.ctx
            .openehr()
            .delete_composition(&entry.host, composition_id)
            .await?;

        self.cache().delete(source_id, &entry);
        DiscoveryMapCache::new(self.ctx.global_store()).delete_by_source_id(source_id);
        Ok(())
    }

    fn to_flat(definition: &HeadingDefinition, payload: &Value) -> CdrResult<Value> {
        match definition.to_flat(payload) {
            Some(flat) => Ok(flat?),
            None => Err(CdrError::UnprocessableEntity(format!(
                "heading {} not recognised, or no POST definition available",
                definition.name
            ))),
        }
    }
}
