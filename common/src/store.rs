use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared string map carried alongside one task execution.
///
/// The control plane hands the store in with the request; writes made by an
/// executor (e.g. a cached OAuth token) are echoed back verbatim in the
/// response, so entries must survive until the snapshot is taken.
#[derive(Clone, Debug, Default)]
pub struct Store {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: HashMap<String, String>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn read(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn write(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_survive_into_the_snapshot() {
        let store = Store::from_map(HashMap::from([("a".to_string(), "1".to_string())]));
        store.write("b", "2");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert_eq!(snapshot.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn clones_share_the_same_entries() {
        let store = Store::new();
        let alias = store.clone();
        alias.write("k", "v");
        assert_eq!(store.read("k").as_deref(), Some("v"));
        store.remove("k");
        assert!(alias.read("k").is_none());
        assert!(alias.is_empty());
    }
}
