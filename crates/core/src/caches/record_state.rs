//! Per-patient record state (session store): `record_state.<nhs>`.

use crate::constants::RECORD_STATE_DOCUMENT;
use crate::doc_path;
use crate::store::{DocumentStore, Segment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    LoadingData,
    Ready,
}

impl RecordStatus {
    fn as_str(self) -> &'static str {
        match self {
            RecordStatus::LoadingData => "loading_data",
            RecordStatus::Ready => "ready",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "loading_data" => Some(RecordStatus::LoadingData),
            "ready" => Some(RecordStatus::Ready),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    pub status: Option<RecordStatus>,
    #[serde(rename = "requestNo")]
    pub request_no: i64,
    pub new_patient: bool,
}

pub struct RecordStateCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> RecordStateCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    fn field(patient_id: u64, name: &str) -> Vec<Segment> {
        doc_path![RECORD_STATE_DOCUMENT, patient_id, name]
    }

    /// Bump the request counter and return its new value.
    pub fn next_request(&self, patient_id: u64) -> i64 {
        self.store.increment(&Self::field(patient_id, "requestNo"))
    }

    pub fn status(&self, patient_id: u64) -> Option<RecordStatus> {
        self.store
            .get(&Self::field(patient_id, "status"))
            .and_then(|v| v.as_str().and_then(RecordStatus::parse))
    }

    pub fn set_status(&self, patient_id: u64, status: RecordStatus) {
        self.store
            .put(&Self::field(patient_id, "status"), Value::from(status.as_str()));
    }

    /// Forget the status so the next check loads the record again.
    pub fn clear_status(&self, patient_id: u64) {
        self.store.delete(&Self::field(patient_id, "status"));
    }

    pub fn set_new_patient(&self, patient_id: u64) {
        self.store
            .put(&Self::field(patient_id, "new_patient"), Value::Bool(true));
    }

    pub fn get(&self, patient_id: u64) -> RecordState {
        RecordState {
            status: self.status(patient_id),
            request_no: self
                .store
                .get(&Self::field(patient_id, "requestNo"))
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            new_patient: self
                .store
                .get(&Self::field(patient_id, "new_patient"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}
