//! Constants used throughout the CDR core crate.
//!
//! Store document names live here so every cache addresses the same subtrees.

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "CDR_CONFIG";

/// Configuration file used when `CDR_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/cdr.json";

/// Default lifetime of a discovery bearer token.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60;

/// Default timeout for remote HTTP calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of synopsis entries returned per heading.
pub const DEFAULT_SYNOPSIS_MAX: usize = 2;

/// Root subscript of the per-session namespace in the global store.
pub const SESSION_DOCUMENT: &str = "session";

/// Cached heading records (session scoped).
pub const HEADINGS_DOCUMENT: &str = "headings";

/// Cached discovery FHIR resources (session scoped).
pub const FHIR_DOCUMENT: &str = "fhir";

/// Derived demographics (session scoped).
pub const DEMOGRAPHICS_DOCUMENT: &str = "Demographics";

/// Per-patient record state (session scoped).
pub const RECORD_STATE_DOCUMENT: &str = "record_state";

/// Discovery id <-> local record mapping (global).
pub const DISCOVERY_MAP_DOCUMENT: &str = "discovery_map";

/// Discovery bearer token (global).
pub const DISCOVERY_TOKEN_DOCUMENT: &str = "discovery_token";

/// Author recorded on compositions created from discovery data.
pub const DISCOVERY_AUTHOR: &str = "Discovery";
