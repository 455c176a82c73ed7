//! Discovery data service client.
//!
//! The discovery service exposes patient-centred FHIR searches behind a bearer token issued by
//! its auth server. [`FhirClient`] is the seam the core services use; [`HttpFhirClient`] is the
//! `reqwest` implementation. Every call is a single attempt.

use crate::bundle::Bundle;
use crate::reference::ResourceReference;
use crate::{FhirError, FhirResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Connection details for the discovery service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Base URL of the discovery data service.
    pub fhir_url: String,
    /// Token endpoint of the discovery auth server.
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Operations the CDR services need from the discovery service.
#[async_trait]
pub trait FhirClient: Send + Sync {
    /// Obtain a fresh bearer token.
    async fn authenticate(&self) -> FhirResult<String>;

    /// Patient resources matching an NHS number.
    async fn get_patients(&self, nhs_number: u64, token: &str) -> FhirResult<Bundle>;

    /// Resources of one type belonging to the patients in `patients`.
    async fn get_patient_resources(
        &self,
        patients: &Bundle,
        resource_name: &str,
        token: &str,
    ) -> FhirResult<Bundle>;

    /// A single referenced resource.
    async fn get_resource(&self, reference: &ResourceReference, token: &str) -> FhirResult<Value>;
}

/// HTTP implementation of [`FhirClient`].
#[derive(Clone, Debug)]
pub struct HttpFhirClient {
    cfg: DiscoveryConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "token", alias = "jwt")]
    access_token: String,
}

impl HttpFhirClient {
    /// Build a client for the discovery service.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Http`] if the underlying HTTP client cannot be constructed.
    pub fn new(cfg: DiscoveryConfig, timeout: Duration) -> FhirResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { cfg, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.fhir_url.trim_end_matches('/'), path)
    }

    async fn send(builder: reqwest::RequestBuilder) -> FhirResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(FhirError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl FhirClient for HttpFhirClient {
    async fn authenticate(&self) -> FhirResult<String> {
        tracing::info!("authenticating with discovery auth server");

        let builder = self.http.post(&self.cfg.auth_url).json(&json!({
            "grant_type": "client_credentials",
            "client_id": self.cfg.client_id,
            "client_secret": self.cfg.client_secret,
        }));

        let response = match Self::send(builder).await {
            Ok(response) => response,
            Err(FhirError::Status { status, body }) => {
                return Err(FhirError::Authentication(format!("status {status}: {body}")));
            }
            Err(e) => return Err(e),
        };

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn get_patients(&self, nhs_number: u64, token: &str) -> FhirResult<Bundle> {
        let builder = self
            .http
            .get(self.url("/api/fhir/patients"))
            .bearer_auth(token)
            .query(&[("nhsNumber", nhs_number.to_string())]);

        Ok(Self::send(builder).await?.json().await?)
    }

    async fn get_patient_resources(
        &self,
        patients: &Bundle,
        resource_name: &str,
        token: &str,
    ) -> FhirResult<Bundle> {
        let builder = self
            .http
            .post(self.url("/api/fhir/resources"))
            .bearer_auth(token)
            .json(&json!({
                "resources": [resource_name],
                "patients": patients,
            }));

        Ok(Self::send(builder).await?.json().await?)
    }

    async fn get_resource(&self, reference: &ResourceReference, token: &str) -> FhirResult<Value> {
        let builder = self
            .http
            .get(self.url("/api/fhir/reference"))
            .bearer_auth(token)
            .query(&[("reference", reference.to_string())]);

        Ok(Self::send(builder).await?.json().await?)
    }
}
