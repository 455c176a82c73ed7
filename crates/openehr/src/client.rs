//! openEHR REST client.
//!
//! [`OpenEhrClient`] is the seam the core services talk to. [`HttpOpenEhrClient`] implements it
//! against EHRbase-style servers: the openEHR REST API for EHR lookup/creation and AQL, and the
//! ECIS endpoints for FLAT compositions.
//!
//! Each call is a single attempt: transport errors and non-2xx responses are returned to the
//! caller unchanged.

use crate::{OpenEhrError, OpenEhrResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const NHS_NUMBER_NAMESPACE: &str = "uk.nhs.nhs_number";

/// Connection details for one named openEHR host.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Operations the CDR services need from an openEHR server.
#[async_trait]
pub trait OpenEhrClient: Send + Sync {
    /// Look up the EHR id for a patient. `Ok(None)` if the patient has no EHR on `host`.
    async fn get_ehr_id(&self, host: &str, nhs_number: u64) -> OpenEhrResult<Option<String>>;

    /// Create an EHR for a patient and return its id.
    async fn create_ehr(&self, host: &str, nhs_number: u64) -> OpenEhrResult<String>;

    /// Run an AQL query, returning one JSON object per result row keyed by column name.
    async fn query(&self, host: &str, aql: &str) -> OpenEhrResult<Vec<Value>>;

    /// Commit a FLAT composition, returning the new composition uid.
    async fn post_composition(
        &self,
        host: &str,
        ehr_id: &str,
        template_id: &str,
        flat: &Value,
    ) -> OpenEhrResult<String>;

    /// Replace an existing composition, returning the new version's uid.
    async fn put_composition(
        &self,
        host: &str,
        composition_id: &str,
        template_id: &str,
        flat: &Value,
    ) -> OpenEhrResult<String>;

    /// Delete a composition.
    async fn delete_composition(&self, host: &str, composition_id: &str) -> OpenEhrResult<()>;
}

/// HTTP implementation of [`OpenEhrClient`] using basic authentication per host.
#[derive(Clone, Debug)]
pub struct HttpOpenEhrClient {
    hosts: BTreeMap<String, HostConfig>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct EhrResponse {
    ehr_id: IdValue,
}

#[derive(Deserialize)]
struct IdValue {
    value: String,
}

#[derive(Deserialize)]
struct AqlResponse {
    #[serde(default)]
    columns: Vec<AqlColumn>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct AqlColumn {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositionResponse {
    composition_uid: String,
}

impl HttpOpenEhrClient {
    /// Build a client for the given hosts.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::Http`] if the underlying HTTP client cannot be constructed.
    pub fn new(hosts: BTreeMap<String, HostConfig>, timeout: Duration) -> OpenEhrResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { hosts, http })
    }

    fn host(&self, host: &str) -> OpenEhrResult<&HostConfig> {
        self.hosts
            .get(host)
            .ok_or_else(|| OpenEhrError::UnknownHost(host.to_owned()))
    }

    fn request(
        &self,
        host: &str,
        method: reqwest::Method,
        path: &str,
    ) -> OpenEhrResult<reqwest::RequestBuilder> {
        let cfg = self.host(host)?;
        let url = format!("{}{}", cfg.url.trim_end_matches('/'), path);
        Ok(self
            .http
            .request(method, url)
            .basic_auth(&cfg.username, Some(&cfg.password))
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(
        &self,
        host: &str,
        builder: reqwest::RequestBuilder,
    ) -> OpenEhrResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(OpenEhrError::Status {
            host: host.to_owned(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl OpenEhrClient for HttpOpenEhrClient {
    async fn get_ehr_id(&self, host: &str, nhs_number: u64) -> OpenEhrResult<Option<String>> {
        let builder = self
            .request(host, reqwest::Method::GET, "/rest/openehr/v1/ehr")?
            .query(&[
                ("subject_id", nhs_number.to_string()),
                ("subject_namespace", NHS_NUMBER_NAMESPACE.to_owned()),
            ]);

        match self.send(host, builder).await {
            Ok(response) => {
                let ehr: EhrResponse = response.json().await?;
                Ok(Some(ehr.ehr_id.value))
            }
            Err(OpenEhrError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_ehr(&self, host: &str, nhs_number: u64) -> OpenEhrResult<String> {
        tracing::info!("creating EHR for {} on {}", nhs_number, host);

        let body = json!({
            "_type": "EHR_STATUS",
            "archetype_node_id": "openEHR-EHR-EHR_STATUS.generic.v1",
            "name": { "value": "EHR Status" },
            "subject": {
                "external_ref": {
                    "id": { "_type": "GENERIC_ID", "value": nhs_number.to_string(), "scheme": "id_scheme" },
                    "namespace": NHS_NUMBER_NAMESPACE,
                    "type": "PERSON"
                }
            },
            "is_modifiable": true,
            "is_queryable": true
        });

        let builder = self
            .request(host, reqwest::Method::POST, "/rest/openehr/v1/ehr")?
            .header("Prefer", "return=representation")
            .json(&body);

        let ehr: EhrResponse = self.send(host, builder).await?.json().await?;
        Ok(ehr.ehr_id.value)
    }

    async fn query(&self, host: &str, aql: &str) -> OpenEhrResult<Vec<Value>> {
        let builder = self
            .request(host, reqwest::Method::POST, "/rest/openehr/v1/query/aql")?
            .json(&json!({ "q": aql }));

        let result: AqlResponse = self.send(host, builder).await?.json().await?;
        Ok(rows_to_objects(result))
    }

    async fn post_composition(
        &self,
        host: &str,
        ehr_id: &str,
        template_id: &str,
        flat: &Value,
    ) -> OpenEhrResult<String> {
        let builder = self
            .request(host, reqwest::Method::POST, "/rest/ecis/v1/composition")?
            .query(&[
                ("format", "FLAT"),
                ("ehrId", ehr_id),
                ("templateId", template_id),
            ])
            .json(flat);

        let created: CompositionResponse = self.send(host, builder).await?.json().await?;
        Ok(created.composition_uid)
    }

    async fn put_composition(
        &self,
        host: &str,
        composition_id: &str,
        template_id: &str,
        flat: &Value,
    ) -> OpenEhrResult<String> {
        let path = format!("/rest/ecis/v1/composition/{composition_id}");
        let builder = self
            .request(host, reqwest::Method::PUT, &path)?
            .query(&[("format", "FLAT"), ("templateId", template_id)])
            .json(flat);

        let updated: CompositionResponse = self.send(host, builder).await?.json().await?;
        Ok(updated.composition_uid)
    }

    async fn delete_composition(&self, host: &str, composition_id: &str) -> OpenEhrResult<()> {
        let path = format!("/rest/ecis/v1/composition/{composition_id}");
        let builder = self.request(host, reqwest::Method::DELETE, &path)?;
        self.send(host, builder).await?;
        Ok(())
    }
}

fn rows_to_objects(result: AqlResponse) -> Vec<Value> {
    result
        .rows
        .into_iter()
        .map(|row| {
            let object: Map<String, Value> = result
                .columns
                .iter()
                .map(|c| c.name.clone())
                .zip(row)
                .collect();
            Value::Object(object)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aql_rows_are_keyed_by_column_name() {
        let result: AqlResponse = serde_json::from_value(json!({
            "columns": [{ "name": "uid", "path": "/uid/value" }, { "name": "cause" }],
            "rows": [["abc::host::1", "Penicillin"], ["def::host::1", null]]
        }))
        .expect("valid AQL response");

        let rows = rows_to_objects(result);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({ "uid": "abc::host::1", "cause": "Penicillin" }));
        assert_eq!(rows[1], json!({ "uid": "def::host::1", "cause": null }));
    }

    #[test]
    fn empty_aql_result_yields_no_rows() {
        let result: AqlResponse =
            serde_json::from_value(json!({ "q": "select ..." })).expect("valid AQL response");
        assert!(rows_to_objects(result).is_empty());
    }

    #[test]
    fn unknown_host_is_rejected_before_any_request() {
        let client =
            HttpOpenEhrClient::new(BTreeMap::new(), Duration::from_secs(1)).expect("client");
        let err = client
            .request("ethercis", reqwest::Method::GET, "/")
            .expect_err("unknown host");
        assert!(matches!(err, OpenEhrError::UnknownHost(h) if h == "ethercis"));
    }
}
