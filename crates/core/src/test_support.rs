//! In-memory fakes shared by the unit tests.

use crate::config::CoreConfig;
use crate::context::{CdrContext, CdrState, Clock, Role, Session};
use crate::store::MemoryStore;
use async_trait::async_trait;
use cdr_types::NonEmptyText;
use fhir::bundle::resource_identity;
use fhir::{Bundle, FhirClient, FhirError, FhirResult, ResourceReference};
use openehr::{HeadingRegistry, OpenEhrClient, OpenEhrError, OpenEhrResult};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_NHS_NUMBER: u64 = 9999999000;

const CONFIG: &str = r#"{
    "openehr": {
        "default_host": "ethercis",
        "hosts": {
            "ethercis": { "url": "http://ethercis.test", "username": "u", "password": "p" }
        }
    },
    "discovery": {
        "service": {
            "fhir_url": "http://discovery.test",
            "auth_url": "http://auth.test/token",
            "client_id": "cdr",
            "client_secret": "secret"
        },
        "headings": { "problems": "Condition", "vaccinations": "Immunization" }
    },
    "headings": ["allergies", "medications", "problems", "procedures", "vaccinations"]
}"#;

pub fn config() -> CoreConfig {
    CoreConfig::from_json_str(CONFIG).expect("test config")
}

pub fn allergy_row(uid: &str, cause: &str, date_created: &str) -> Value {
    json!({
        "uid": uid,
        "author": "Dr Tony Shannon",
        "date_created": date_created,
        "cause": cause,
        "cause_code": "1234",
        "cause_terminology": "SNOMED-CT",
        "reaction": "Rash"
    })
}

fn count(calls: &Mutex<BTreeMap<String, usize>>, name: &str) {
    *calls
        .lock()
        .expect("calls lock")
        .entry(name.to_owned())
        .or_default() += 1;
}

#[derive(Debug)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Discovery service holding a fixed set of resources.
#[derive(Default)]
pub struct FakeFhirClient {
    resources: Mutex<BTreeMap<(String, String), Value>>,
    calls: Mutex<BTreeMap<String, usize>>,
    fail_authentication: AtomicBool,
    stall_patients: AtomicBool,
    tokens: AtomicI64,
}

impl FakeFhirClient {
    fn with_fixtures() -> Self {
        let client = Self::default();
        client.add_resource(json!({
            "resourceType": "Patient",
            "id": "p1",
            "identifier": [{ "system": fhir::patient::NHS_NUMBER_SYSTEM, "value": "9999999000" }],
            "name": [{ "use": "official", "prefix": ["Mr"], "given": ["Ivor", "James"], "family": "Cox" }],
            "gender": "male",
            "birthDate": "1950-04-10",
            "address": [{ "line": ["6948 Et St."], "city": "Leeds", "postalCode": "LS1 6AB" }],
            "telecom": [{ "system": "phone", "value": "(011981) 32362" }],
            "generalPractitioner": [{ "reference": "Practitioner/gp1" }]
        }));
        client.add_resource(json!({
            "resourceType": "Practitioner",
            "id": "gp1",
            "name": [{ "prefix": ["Dr"], "given": ["Anne"], "family": "Smith" }],
            "practitionerRole": [{ "managingOrganization": { "reference": "Organization/org1" } }]
        }));
        client.add_resource(json!({
            "resourceType": "Organization",
            "id": "org1",
            "name": "High Street Surgery",
            "address": [{ "line": ["1 High Street"], "city": "Leeds", "postalCode": "LS1 1AA" }]
        }));
        client.add_resource(json!({
            "resourceType": "Condition",
            "id": "cond1",
            "subject": { "reference": "Patient/p1" },
            "asserter": { "reference": "Practitioner/gp1" },
            "code": {
                "coding": [{ "system": "http://snomed.info/sct", "code": "38341003", "display": "Hypertension" }]
            },
            "onsetDateTime": "2018-06-01T00:00:00Z"
        }));
        client
    }

    pub fn add_resource(&self, resource: Value) {
        let (resource_type, id) = resource_identity(&resource)
            .map(|(t, i)| (t.to_owned(), i.to_owned()))
            .expect("fixture identity");
        self.resources
            .lock()
            .expect("resources lock")
            .insert((resource_type, id), resource);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_authentication(&self, fail: bool) {
        self.fail_authentication.store(fail, Ordering::SeqCst);
    }

    pub fn remove_resource(&self, resource_type: &str, id: &str) {
        self.resources
            .lock()
            .expect("resources lock")
            .remove(&(resource_type.to_owned(), id.to_owned()));
    }

    /// While set, `get_patients` never completes.
    pub fn stall_patients(&self, stall: bool) {
        self.stall_patients.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl FhirClient for FakeFhirClient {
    async fn authenticate(&self) -> FhirResult<String> {
        count(&self.calls, "authenticate");
        if self.fail_authentication.load(Ordering::SeqCst) {
            return Err(FhirError::Authentication("denied".into()));
        }
        let n = self.tokens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }

    async fn get_patients(&self, nhs_number: u64, _token: &str) -> FhirResult<Bundle> {
        count(&self.calls, "get_patients");
        if self.stall_patients.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let nhs = nhs_number.to_string();
        let resources = self.resources.lock().expect("resources lock");
        Ok(Bundle::from_resources(
            resources
                .iter()
                .filter(|((t, _), r)| {
                    t == "Patient"
                        && r["identifier"]
                            .as_array()
                            .is_some_and(|ids| ids.iter().any(|i| i["value"] == nhs.as_str()))
                })
                .map(|(_, r)| r.clone()),
        ))
    }

    async fn get_patient_resources(
        &self,
        patients: &Bundle,
        resource_name: &str,
        _token: &str,
    ) -> FhirResult<Bundle> {
        count(&self.calls, "get_patient_resources");
        let ids: BTreeSet<String> = patients
            .resources()
            .filter_map(resource_identity)
            .map(|(_, id)| id.to_owned())
            .collect();

        let resources = self.resources.lock().expect("resources lock");
        Ok(Bundle::from_resources(
            resources
                .iter()
                .filter(|((t, id), r)| {
                    t == resource_name
                        && if t == "Patient" {
                            ids.contains(id)
                        } else {
                            r["subject"]["reference"]
                                .as_str()
                                .and_then(|s| s.strip_prefix("Patient/"))
                                .is_some_and(|p| ids.contains(p))
                        }
                })
                .map(|(_, r)| r.clone()),
        ))
    }

    async fn get_resource(&self, reference: &ResourceReference, _token: &str) -> FhirResult<Value> {
        count(&self.calls, "get_resource");
        self.resources
            .lock()
            .expect("resources lock")
            .get(&(
                reference.resource_type().to_owned(),
                reference.id().to_owned(),
            ))
            .cloned()
            .ok_or_else(|| FhirError::Status {
                status: 404,
                body: format!("{reference} not found"),
            })
    }
}

type RowKey = (String, u64, String);

/// openEHR server holding canned AQL rows per (host, patient, heading).
pub struct FakeOpenEhrClient {
    registry: HeadingRegistry,
    hosts: BTreeSet<String>,
    ehrs: Mutex<BTreeMap<(String, u64), String>>,
    rows: Mutex<BTreeMap<RowKey, Vec<Value>>>,
    posted: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<String>>,
    calls: Mutex<BTreeMap<String, usize>>,
    compositions: AtomicI64,
    stall_queries: AtomicBool,
}

impl FakeOpenEhrClient {
    fn new() -> Self {
        let client = Self {
            registry: HeadingRegistry::builtin().expect("builtin headings"),
            hosts: BTreeSet::from(["ethercis".to_owned()]),
            ehrs: Mutex::default(),
            rows: Mutex::default(),
            posted: Mutex::default(),
            deleted: Mutex::default(),
            calls: Mutex::default(),
            compositions: AtomicI64::new(0),
            stall_queries: AtomicBool::new(false),
        };
        client.ehrs.lock().expect("ehrs lock").insert(
            ("ethercis".to_owned(), TEST_NHS_NUMBER),
            format!("ehr-{TEST_NHS_NUMBER}"),
        );
        client
    }

    /// Add a row returned for the test patient's heading query on `host`.
    pub fn add_row(&self, host: &str, heading: &str, row: Value) {
        self.rows
            .lock()
            .expect("rows lock")
            .entry((host.to_owned(), TEST_NHS_NUMBER, heading.to_owned()))
            .or_default()
            .push(row);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().expect("posted lock").clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    /// While set, `query` never completes.
    pub fn stall_queries(&self, stall: bool) {
        self.stall_queries.store(stall, Ordering::SeqCst);
    }

    fn check_host(&self, host: &str) -> OpenEhrResult<()> {
        if self.hosts.contains(host) {
            Ok(())
        } else {
            Err(OpenEhrError::UnknownHost(host.to_owned()))
        }
    }
}

#[async_trait]
impl OpenEhrClient for FakeOpenEhrClient {
    async fn get_ehr_id(&self, host: &str, nhs_number: u64) -> OpenEhrResult<Option<String>> {
        count(&self.calls, "get_ehr_id");
        self.check_host(host)?;
        Ok(self
            .ehrs
            .lock()
            .expect("ehrs lock")
            .get(&(host.to_owned(), nhs_number))
            .cloned())
    }

    async fn create_ehr(&self, host: &str, nhs_number: u64) -> OpenEhrResult<String> {
        count(&self.calls, "create_ehr");
        self.check_host(host)?;
        let ehr_id = format!("ehr-{nhs_number}");
        self.ehrs
            .lock()
            .expect("ehrs lock")
            .insert((host.to_owned(), nhs_number), ehr_id.clone());
        Ok(ehr_id)
    }

    async fn query(&self, host: &str, aql: &str) -> OpenEhrResult<Vec<Value>> {
        count(&self.calls, "query");
        self.check_host(host)?;
        if self.stall_queries.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let ehrs = self.ehrs.lock().expect("ehrs lock");
        let rows = self.rows.lock().expect("rows lock");

        Ok(rows
            .iter()
            .find(|((h, nhs, heading), _)| {
                h == host
                    && ehrs.get(&(h.clone(), *nhs)).is_some_and(|ehr| {
                        self.registry
                            .get(heading)
                            .is_some_and(|d| d.render_aql(ehr) == aql)
                    })
            })
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn post_composition(
        &self,
        host: &str,
        ehr_id: &str,
        template_id: &str,
        flat: &Value,
    ) -> OpenEhrResult<String> {
        count(&self.calls, "post_composition");
        self.check_host(host)?;
        let n = self.compositions.fetch_add(1, Ordering::SeqCst) + 1;
        let uid = format!("posted{n}::{host}::1");
        self.posted.lock().expect("posted lock").push(flat.clone());

        let nhs = self
            .ehrs
            .lock()
            .expect("ehrs lock")
            .iter()
            .find(|((h, _), ehr)| h == host && ehr.as_str() == ehr_id)
            .map(|((_, nhs), _)| *nhs);
        let heading = self
            .registry
            .names()
            .find(|name| {
                self.registry
                    .get(name)
                    .is_some_and(|d| d.template_id == template_id)
            })
            .map(str::to_owned);

        if let (Some(nhs), Some(heading)) = (nhs, heading) {
            self.rows
                .lock()
                .expect("rows lock")
                .entry((host.to_owned(), nhs, heading))
                .or_default()
                .push(json!({ "uid": uid, "date_created": "2020-01-01T00:00:00Z" }));
        }
        Ok(uid)
    }

    async fn put_composition(
        &self,
        host: &str,
        composition_id: &str,
        _template_id: &str,
        _flat: &Value,
    ) -> OpenEhrResult<String> {
        count(&self.calls, "put_composition");
        self.check_host(host)?;
        let base = composition_id.split("::").next().unwrap_or(composition_id);
        Ok(format!("{base}::{host}::2"))
    }

    async fn delete_composition(&self, host: &str, composition_id: &str) -> OpenEhrResult<()> {
        count(&self.calls, "delete_composition");
        self.check_host(host)?;
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(composition_id.to_owned());
        Ok(())
    }
}

/// Shared state wired to the fakes.
pub struct Harness {
    pub openehr: Arc<FakeOpenEhrClient>,
    pub fhir: Arc<FakeFhirClient>,
    pub clock: Arc<FixedClock>,
    pub state: CdrState,
}

impl Harness {
    pub fn new() -> Self {
        let openehr = Arc::new(FakeOpenEhrClient::new());
        let fhir = Arc::new(FakeFhirClient::with_fixtures());
        let clock = Arc::new(FixedClock {
            now: AtomicI64::new(1_600_000_000_000),
        });

        let state = CdrState {
            cfg: Arc::new(config()),
            registry: Arc::new(HeadingRegistry::builtin().expect("builtin headings")),
            openehr: openehr.clone(),
            fhir: fhir.clone(),
            store: Arc::new(MemoryStore::new()),
            clock: clock.clone(),
        };

        Self {
            openehr,
            fhir,
            clock,
            state,
        }
    }

    pub fn context(&self, role: Role) -> CdrContext {
        let nhs_number = (role == Role::PhrUser).then_some(TEST_NHS_NUMBER);
        self.context_for("test-session", role, nhs_number)
    }

    pub fn context_for(&self, session_id: &str, role: Role, nhs_number: Option<u64>) -> CdrContext {
        let id = NonEmptyText::new(session_id).expect("session id");
        self.state.context(Session::new(id, role, nhs_number))
    }
}
