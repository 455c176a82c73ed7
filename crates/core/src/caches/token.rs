//! Cached discovery bearer token (global store).

use super::{get_typed, put_typed};
use crate::constants::DISCOVERY_TOKEN_DOCUMENT;
use crate::store::{DocumentStore, Segment};
use crate::CdrResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub jwt: String,
    /// Epoch milliseconds at which the token was obtained.
    pub created_at: i64,
}

impl AuthToken {
    pub fn is_valid(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.created_at < ttl_ms
    }
}

pub struct TokenCache<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> TokenCache<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    fn path() -> [Segment; 1] {
        [Segment::from(DISCOVERY_TOKEN_DOCUMENT)]
    }

    pub fn get(&self) -> CdrResult<Option<AuthToken>> {
        get_typed(self.store, &Self::path())
    }

    pub fn set(&self, token: &AuthToken) -> CdrResult<()> {
        put_typed(self.store, &Self::path(), token)
    }

    pub fn delete(&self) {
        self.store.delete(&Self::path());
    }
}
