//! Per-request context.
//!
//! [`CdrState`] holds everything shared by the whole process (configuration, heading registry,
//! remote clients, the global store, the clock). A [`CdrContext`] pairs it with one caller's
//! [`Session`] and that session's scoped view of the store. Services and commands borrow the
//! context; nothing is looked up globally.

use crate::config::CoreConfig;
use crate::constants::SESSION_DOCUMENT;
use crate::store::{DocumentStore, MemoryStore, ScopedStore, Segment};
use crate::{CdrError, CdrResult};
use cdr_types::NonEmptyText;
use fhir::{FhirClient, HttpFhirClient};
use openehr::{HeadingRegistry, HttpOpenEhrClient, OpenEhrClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role claimed by the caller's session token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Clinician: may read and write any patient's record.
    #[serde(rename = "IDCR")]
    Idcr,
    /// Patient: may only read and write their own record.
    #[serde(rename = "phrUser")]
    PhrUser,
}

/// The authenticated caller.
#[derive(Clone, Debug)]
pub struct Session {
    id: NonEmptyText,
    role: Role,
    nhs_number: Option<u64>,
}

impl Session {
    pub fn new(id: NonEmptyText, role: Role, nhs_number: Option<u64>) -> Self {
        Self {
            id,
            role,
            nhs_number,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn nhs_number(&self) -> Option<u64> {
        self.nhs_number
    }

    /// Checks this session may access `patient_id`'s record.
    ///
    /// # Errors
    ///
    /// Returns [`CdrError::Forbidden`] when a patient session asks for another patient.
    pub fn authorise(&self, patient_id: u64) -> CdrResult<()> {
        match self.role {
            Role::Idcr => Ok(()),
            Role::PhrUser if self.nhs_number == Some(patient_id) => Ok(()),
            Role::PhrUser => Err(CdrError::Forbidden(format!(
                "patientId {patient_id} is not accessible to this user"
            ))),
        }
    }
}

/// Source of the current time, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Process-wide dependencies, built once at startup.
#[derive(Clone)]
pub struct CdrState {
    pub cfg: Arc<CoreConfig>,
    pub registry: Arc<HeadingRegistry>,
    pub openehr: Arc<dyn OpenEhrClient>,
    pub fhir: Arc<dyn FhirClient>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
}

impl CdrState {
    /// Wire the HTTP clients, built-in headings and an empty in-memory store for `cfg`.
    ///
    /// # Errors
    ///
    /// Returns an error if an enabled heading has no definition or an HTTP client cannot be
    /// built.
    pub fn connect(cfg: CoreConfig) -> CdrResult<Self> {
        let registry = HeadingRegistry::builtin()?;
        cfg.check_headings(&registry)?;

        let openehr = HttpOpenEhrClient::new(cfg.openehr_hosts().clone(), cfg.request_timeout())?;
        let fhir = HttpFhirClient::new(cfg.discovery().clone(), cfg.request_timeout())?;

        Ok(Self {
            cfg: Arc::new(cfg),
            registry: Arc::new(registry),
            openehr: Arc::new(openehr),
            fhir: Arc::new(fhir),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(SystemClock),
        })
    }

    /// Context for one request made by `session`.
    pub fn context(&self, session: Session) -> CdrContext {
        let prefix = vec![
            Segment::from(SESSION_DOCUMENT),
            Segment::from(session.id()),
        ];
        CdrContext {
            session_store: ScopedStore::new(self.store.clone(), prefix),
            state: self.clone(),
            session,
        }
    }
}

/// Everything a command needs to serve one request.
pub struct CdrContext {
    state: CdrState,
    session: Session,
    session_store: ScopedStore,
}

impl CdrContext {
    pub fn cfg(&self) -> &CoreConfig {
        &self.state.cfg
    }

    pub fn registry(&self) -> &HeadingRegistry {
        &self.state.registry
    }

    pub fn openehr(&self) -> &dyn OpenEhrClient {
        self.state.openehr.as_ref()
    }

    pub fn fhir(&self) -> &dyn FhirClient {
        self.state.fhir.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.state.clock.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Store shared by every session.
    pub fn global_store(&self) -> &dyn DocumentStore {
        self.state.store.as_ref()
    }

    /// This session's namespace of the store.
    pub fn session_store(&self) -> &dyn DocumentStore {
        &self.session_store
    }
}
