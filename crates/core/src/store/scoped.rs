use super::{DocumentStore, Segment};
use serde_json::Value;
use std::sync::Arc;

/// A view of another store with every path prefixed by a fixed root.
///
/// Sessions use this to get their own namespace: `["session", <id>, ...]`.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn DocumentStore>,
    prefix: Vec<Segment>,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, prefix: Vec<Segment>) -> Self {
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &[Segment] {
        &self.prefix
    }

    fn full(&self, path: &[Segment]) -> Vec<Segment> {
        self.prefix.iter().chain(path).cloned().collect()
    }
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl DocumentStore for ScopedStore {
    fn node(&self, path: &[Segment]) -> Option<Value> {
        self.inner.node(&self.full(path))
    }

    fn set_node(&self, path: &[Segment], value: Value) {
        self.inner.set_node(&self.full(path), value);
    }

    fn delete(&self, path: &[Segment]) {
        self.inner.delete(&self.full(path));
    }

    fn child_keys(&self, path: &[Segment]) -> Vec<String> {
        self.inner.child_keys(&self.full(path))
    }

    fn increment(&self, path: &[Segment]) -> i64 {
        self.inner.increment(&self.full(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_path;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn sessions_do_not_see_each_other() {
        let global: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let a = ScopedStore::new(global.clone(), doc_path!["session", "a"]);
        let b = ScopedStore::new(global.clone(), doc_path!["session", "b"]);

        a.put(&doc_path!["headings", "x"], json!(1));
        assert!(a.exists(&doc_path!["headings", "x"]));
        assert!(!b.exists(&doc_path!["headings", "x"]));
        assert_eq!(
            global.get(&doc_path!["session", "a", "headings", "x"]),
            Some(json!(1))
        );
    }

    #[test]
    fn delete_stays_inside_scope() {
        let global: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        global.put(&doc_path!["discovery_map", "d1"], json!("kept"));
        let scoped = ScopedStore::new(global.clone(), doc_path!["session", "a"]);
        scoped.put(&doc_path!["x"], json!(1));

        scoped.delete(&[]);
        assert!(!global.exists(&doc_path!["session", "a"]));
        assert!(global.exists(&doc_path!["discovery_map", "d1"]));
    }
}
