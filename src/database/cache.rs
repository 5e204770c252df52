use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::database::tree::{delete_at_path, get_at_path, path_starts_with, set_at_path};

/// Last known values of nodes read or written through the façade, served
/// while the store is offline.
///
/// A write that would push the cached tree past its byte budget is refused
/// and the affected subtree is forgotten, so lookups under it miss instead
/// of serving an older value.
pub struct OfflineCache {
    enabled: AtomicBool,
    budget_bytes: u64,
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    tree: Value,
    known: HashSet<Vec<String>>,
    approx_bytes: u64,
}

impl OfflineCache {
    pub fn new(enabled: bool, budget_bytes: u64) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            budget_bytes,
            inner: Mutex::new(CacheState {
                tree: Value::Object(Map::new()),
                ..Default::default()
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Turns the cache off and forgets everything it held.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let mut state = self.inner.lock().unwrap();
        state.tree = Value::Object(Map::new());
        state.known.clear();
        state.approx_bytes = 0;
    }

    /// Stores the confirmed value of `path`. Returns `false` when the cache
    /// is disabled or out of budget; in the latter case the path is dropped
    /// from the cache.
    pub fn record(&self, path: &[String], value: Option<&Value>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let added = value.map(encoded_len).unwrap_or(0);
        let mut state = self.inner.lock().unwrap();
        let replaced = get_at_path(&state.tree, path).map(encoded_len).unwrap_or(0);
        let projected = state.approx_bytes.saturating_sub(replaced).saturating_add(added);
        if projected > self.budget_bytes {
            state.forget(path);
            return false;
        }
        set_at_path(&mut state.tree, path, value.cloned().unwrap_or(Value::Null));
        state.approx_bytes = projected;
        state.known.insert(path.to_vec());
        true
    }

    /// Merges child writes into an already cached node.
    pub fn record_children(&self, path: &[String], children: &Map<String, Value>) {
        for (key, value) in children {
            let mut target = path.to_vec();
            target.extend(key.split('/').filter(|s| !s.is_empty()).map(str::to_owned));
            // Only refresh subtrees the cache already vouches for.
            if self.covers(&target) {
                self.record(&target, Some(value).filter(|v| !v.is_null()));
            }
        }
    }

    /// `Some(value)` when `path` (or an ancestor) was recorded; the inner
    /// option is `None` for a node known to be absent.
    pub fn lookup(&self, path: &[String]) -> Option<Option<Value>> {
        if !self.is_enabled() {
            return None;
        }
        let state = self.inner.lock().unwrap();
        let covered = state
            .known
            .iter()
            .any(|known| path_starts_with(path, known));
        covered.then(|| get_at_path(&state.tree, path).cloned())
    }

    fn covers(&self, path: &[String]) -> bool {
        self.inner
            .lock()
            .unwrap()
            .known
            .iter()
            .any(|known| path_starts_with(path, known))
    }
}

impl CacheState {
    /// Drops `path` together with the widest recorded node covering it.
    fn forget(&mut self, path: &[String]) {
        let root = self
            .known
            .iter()
            .filter(|known| path_starts_with(path, known))
            .min_by_key(|known| known.len())
            .cloned()
            .unwrap_or_else(|| path.to_vec());
        let freed = get_at_path(&self.tree, &root).map(encoded_len).unwrap_or(0);
        delete_at_path(&mut self.tree, &root);
        self.approx_bytes = self.approx_bytes.saturating_sub(freed);
        self.known.retain(|known| !path_starts_with(known, &root));
    }
}

fn encoded_len(value: &Value) -> u64 {
    value.to_string().len() as u64
}
