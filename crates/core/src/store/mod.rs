//! Hierarchical document store.
//!
//! Every cache in this crate addresses data by a path of [`Segment`]s, e.g.
//! `["headings", "byPatientId", 9999999000, "allergies", "byHost", "ethercis"]`. Writing a path
//! overwrites the whole subtree at that path. Reads of missing paths return `None`; store
//! operations never fail.
//!
//! - [`MemoryStore`]: an in-process JSON tree behind a lock
//! - [`ScopedStore`]: a view of another store rooted at a fixed prefix (one per session)

mod memory;
mod scoped;

pub use memory::MemoryStore;
pub use scoped::ScopedStore;

use serde_json::Value;
use std::fmt;

/// One subscript of a document path.
///
/// Numeric subscripts are stored as their decimal text, so equal-width numbers (epoch
/// milliseconds, NHS numbers) enumerate in numeric order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(u64),
}

impl Segment {
    /// The stored key text of this segment.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::Key(value.to_owned())
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::Key(value)
    }
}

impl From<&String> for Segment {
    fn from(value: &String) -> Self {
        Segment::Key(value.clone())
    }
}

impl From<u64> for Segment {
    fn from(value: u64) -> Self {
        Segment::Index(value)
    }
}

impl From<&u64> for Segment {
    fn from(value: &u64) -> Self {
        Segment::Index(*value)
    }
}

impl From<i64> for Segment {
    fn from(value: i64) -> Self {
        match u64::try_from(value) {
            Ok(v) => Segment::Index(v),
            Err(_) => Segment::Key(value.to_string()),
        }
    }
}

impl From<&cdr_types::SourceId> for Segment {
    fn from(value: &cdr_types::SourceId) -> Self {
        Segment::Key(value.to_string())
    }
}

/// Build a `Vec<Segment>` from heterogeneous subscripts.
///
/// ```ignore
/// let path = doc_path!["fhir", "byNhsNumber", 9999999000u64, "resources"];
/// ```
#[macro_export]
macro_rules! doc_path {
    ($($segment:expr),* $(,)?) => {
        vec![$($crate::store::Segment::from($segment)),*]
    };
}

/// Operations every cache relies on.
///
/// Implementors provide the node primitives; the scalar/object accessors are defined on top of
/// them.
pub trait DocumentStore: Send + Sync {
    /// The subtree at `path`, if any.
    fn node(&self, path: &[Segment]) -> Option<Value>;

    /// Replace the subtree at `path`, creating parents as needed.
    fn set_node(&self, path: &[Segment], value: Value);

    /// Remove the subtree at `path`. Parents left empty are removed too.
    fn delete(&self, path: &[Segment]);

    /// Immediate subscripts under `path`, in key order.
    fn child_keys(&self, path: &[Segment]) -> Vec<String>;

    /// Increment the numeric leaf at `path` (missing counts as zero) and return the new value.
    fn increment(&self, path: &[Segment]) -> i64;

    fn exists(&self, path: &[Segment]) -> bool {
        self.node(path).is_some()
    }

    /// Scalar value at `path`. Documents (objects and arrays) are not returned here.
    fn get(&self, path: &[Segment]) -> Option<Value> {
        self.node(path)
            .filter(|v| !v.is_object() && !v.is_array())
    }

    /// Document at `path`.
    fn get_object(&self, path: &[Segment]) -> Option<Value> {
        self.node(path).filter(Value::is_object)
    }

    fn put(&self, path: &[Segment], value: Value) {
        self.set_node(path, value);
    }

    fn put_object(&self, path: &[Segment], document: Value) {
        self.set_node(path, document);
    }
}
