use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use crate::database::normalize_path;
use crate::logger::Logger;
use crate::relay::{AuthOperationResult, CallbackRelay, DatabaseOperationResult};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/relay"));

pub type AuthCallback = Box<dyn FnOnce(AuthOperationResult) + Send + 'static>;
pub type DatabaseCallback = Box<dyn FnOnce(DatabaseOperationResult) + Send + 'static>;
pub type ValueChangedCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Routes results to closures registered per operation id.
///
/// Register a closure first to obtain its id (`AUTH_<n>` or `DB_<n>`), then
/// pass that id to the façade call. Each closure runs at most once; results
/// carrying an unknown or missing id are logged and dropped.
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    auth: Mutex<HashMap<String, AuthCallback>>,
    database: Mutex<HashMap<String, DatabaseCallback>>,
    values: Mutex<HashMap<String, Vec<ValueChangedCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_auth<F>(&self, callback: F) -> String
    where
        F: FnOnce(AuthOperationResult) + Send + 'static,
    {
        let op_id = format!("AUTH_{}", self.next());
        self.auth
            .lock()
            .unwrap()
            .insert(op_id.clone(), Box::new(callback));
        op_id
    }

    pub fn track_database<F>(&self, callback: F) -> String
    where
        F: FnOnce(DatabaseOperationResult) + Send + 'static,
    {
        let op_id = format!("DB_{}", self.next());
        self.database
            .lock()
            .unwrap()
            .insert(op_id.clone(), Box::new(callback));
        op_id
    }

    /// Adds a closure receiving every value change reported for `path`.
    pub fn on_value_changed<F>(&self, path: &str, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.values
            .lock()
            .unwrap()
            .entry(normalize_path(path))
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn remove_value_listeners(&self, path: &str) -> bool {
        self.values
            .lock()
            .unwrap()
            .remove(&normalize_path(path))
            .is_some()
    }

    /// Number of operations still waiting for their result.
    pub fn pending(&self) -> usize {
        self.auth.lock().unwrap().len() + self.database.lock().unwrap().len()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl CallbackRelay for CallbackRegistry {
    fn auth_result(&self, op_id: Option<&str>, result: AuthOperationResult) {
        let callback = op_id.and_then(|id| self.auth.lock().unwrap().remove(id));
        match callback {
            Some(callback) => callback(result),
            None => LOGGER.warn(format!(
                "Dropping auth result for unknown operation {:?} (success: {})",
                op_id, result.success
            )),
        }
    }

    fn database_result(&self, op_id: Option<&str>, result: DatabaseOperationResult) {
        let callback = op_id.and_then(|id| self.database.lock().unwrap().remove(id));
        match callback {
            Some(callback) => callback(result),
            None => LOGGER.warn(format!(
                "Dropping database result for unknown operation {:?} at '{}'",
                op_id, result.path
            )),
        }
    }

    fn value_changed(&self, path: &str, data: &str) {
        let callbacks = self
            .values
            .lock()
            .unwrap()
            .get(&normalize_path(path))
            .cloned()
            .unwrap_or_default();
        if callbacks.is_empty() {
            LOGGER.debug(format!("No value listeners registered for '{path}'"));
        }
        for callback in callbacks {
            callback(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_reach_only_their_own_callback() {
        let registry = CallbackRegistry::new();
        let first = Arc::new(Mutex::new(None));
        let second = Arc::new(Mutex::new(None));

        let first_slot = Arc::clone(&first);
        let first_id = registry.track_auth(move |result| {
            *first_slot.lock().unwrap() = Some(result);
        });
        let second_slot = Arc::clone(&second);
        let second_id = registry.track_auth(move |result| {
            *second_slot.lock().unwrap() = Some(result);
        });
        assert_eq!(first_id, "AUTH_1");
        assert_eq!(second_id, "AUTH_2");

        registry.auth_result(Some(&second_id), AuthOperationResult::failure("boom"));

        assert!(first.lock().unwrap().is_none());
        assert_eq!(
            second.lock().unwrap().as_ref().map(|r| r.error_message.clone()),
            Some("boom".to_string())
        );
        assert_eq!(registry.pending(), 1);
    }

    #[test]
    fn callbacks_fire_once_and_unknown_ids_are_dropped() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let op_id = registry.track_database(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(op_id.starts_with("DB_"));

        registry.database_result(Some(&op_id), DatabaseOperationResult::success("a", ""));
        registry.database_result(Some(&op_id), DatabaseOperationResult::success("a", ""));
        registry.database_result(None, DatabaseOperationResult::success("a", ""));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn value_listeners_match_normalized_paths() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.on_value_changed("/rooms/lobby/", move |data| {
            sink.lock().unwrap().push(data.to_owned());
        });

        registry.value_changed("rooms/lobby", "{\"open\":true}");
        registry.value_changed("rooms/other", "{}");
        assert!(registry.remove_value_listeners("rooms/lobby"));
        registry.value_changed("rooms/lobby", "{}");

        assert_eq!(seen.lock().unwrap().as_slice(), ["{\"open\":true}".to_string()]);
    }
}
