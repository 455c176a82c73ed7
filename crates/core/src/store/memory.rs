use super::{DocumentStore, Segment};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

/// In-process JSON tree.
///
/// Each operation takes the lock once; there are no multi-operation transactions.
#[derive(Debug)]
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn find<'a>(root: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, segment| node.as_object()?.get(&segment.as_key()))
}

/// Walk to `path`, turning scalars on the way into objects. A newly created leaf is `null`.
fn find_or_create<'a>(root: &'a mut Value, path: &[Segment]) -> &'a mut Value {
    path.iter().fold(root, |node, segment| {
        if !node.is_object() {
            // Indexing a null by key turns it into an object.
            *node = Value::Null;
        }
        &mut node[segment.as_key()]
    })
}

/// Remove `path` below `node`; returns true when `node` is left empty.
fn remove(node: &mut Value, path: &[Segment]) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };

    let key = first.as_key();
    if rest.is_empty() {
        map.remove(&key);
    } else if let Some(child) = map.get_mut(&key) {
        if remove(child, rest) {
            map.remove(&key);
        }
    }

    map.is_empty()
}

impl DocumentStore for MemoryStore {
    fn node(&self, path: &[Segment]) -> Option<Value> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        find(&root, path).cloned()
    }

    fn set_node(&self, path: &[Segment], value: Value) {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        if path.is_empty() {
            if value.is_object() {
                *root = value;
            }
            return;
        }
        *find_or_create(&mut root, path) = value;
    }

    fn delete(&self, path: &[Segment]) {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        if path.is_empty() {
            *root = Value::Object(Map::new());
            return;
        }
        remove(&mut root, path);
    }

    fn child_keys(&self, path: &[Segment]) -> Vec<String> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        match find(&root, path) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn increment(&self, path: &[Segment]) -> i64 {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let leaf = find_or_create(&mut root, path);
        let next = leaf.as_i64().unwrap_or(0) + 1;
        *leaf = Value::from(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_path;
    use serde_json::json;

    #[test]
    fn missing_paths_read_as_none() {
        let store = MemoryStore::new();
        assert!(!store.exists(&doc_path!["a", "b"]));
        assert_eq!(store.get(&doc_path!["a"]), None);
        assert_eq!(store.get_object(&doc_path!["a"]), None);
        assert!(store.child_keys(&doc_path!["a"]).is_empty());
    }

    #[test]
    fn put_overwrites_subtree() {
        let store = MemoryStore::new();
        store.put_object(&doc_path!["p", 1u64], json!({"a": 1, "b": {"c": 2}}));
        assert_eq!(store.get(&doc_path!["p", 1u64, "b", "c"]), Some(json!(2)));

        store.put(&doc_path!["p", 1u64, "b"], json!("flat"));
        assert_eq!(store.get(&doc_path!["p", 1u64, "b"]), Some(json!("flat")));
        assert!(!store.exists(&doc_path!["p", 1u64, "b", "c"]));
    }

    #[test]
    fn get_returns_scalars_and_get_object_documents() {
        let store = MemoryStore::new();
        store.put(&doc_path!["x", "leaf"], json!(true));
        assert_eq!(store.get(&doc_path!["x"]), None);
        assert_eq!(store.get_object(&doc_path!["x"]), Some(json!({"leaf": true})));
        assert_eq!(store.get_object(&doc_path!["x", "leaf"]), None);
    }

    #[test]
    fn writing_below_a_scalar_replaces_it() {
        let store = MemoryStore::new();
        store.put(&doc_path!["a"], json!(1));
        store.put(&doc_path!["a", "b"], json!(2));
        assert_eq!(store.get_object(&doc_path!["a"]), Some(json!({"b": 2})));
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let store = MemoryStore::new();
        store.put(&doc_path!["a", "b", "c"], json!(1));
        store.put(&doc_path!["a", "d"], json!(2));

        store.delete(&doc_path!["a", "b", "c"]);
        assert!(!store.exists(&doc_path!["a", "b"]));
        assert!(store.exists(&doc_path!["a", "d"]));

        store.delete(&doc_path!["a", "d"]);
        assert!(!store.exists(&doc_path!["a"]));
    }

    #[test]
    fn child_keys_are_ordered() {
        let store = MemoryStore::new();
        for ms in [1548670428312u64, 1448670428312, 1648670428312] {
            store.put(&doc_path!["byDate", ms], json!(true));
        }
        assert_eq!(
            store.child_keys(&doc_path!["byDate"]),
            vec!["1448670428312", "1548670428312", "1648670428312"]
        );
    }

    #[test]
    fn increment_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.increment(&doc_path!["state", "requestNo"]), 1);
        assert_eq!(store.increment(&doc_path!["state", "requestNo"]), 2);
        assert_eq!(store.get(&doc_path!["state", "requestNo"]), Some(json!(2)));
    }
}
