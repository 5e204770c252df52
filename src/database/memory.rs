use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::backend::{StoreBackend, Versioned};
use crate::database::error::{invalid_argument, DatabaseResult};
use crate::database::listeners::{ListenerHub, ListenerId, ValueCallback};
use crate::database::query::QueryParams;
use crate::database::server_value::{contains_server_value, resolve_server_values};
use crate::database::tree::{delete_at_path, get_at_path, set_at_path, split_path};
use crate::util::value_etag;

/// Process-local store holding the whole tree in memory.
pub struct InMemoryStoreBackend {
    data: Mutex<Value>,
    listeners: ListenerHub,
}

impl Default for InMemoryStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStoreBackend {
    pub fn new() -> Self {
        Self::with_data(Value::Object(Map::new()))
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: Mutex::new(data),
            listeners: ListenerHub::new(),
        }
    }

    /// Copy of the entire tree.
    pub fn snapshot(&self) -> Value {
        self.data.lock().unwrap().clone()
    }

    fn write<F>(&self, changed: &[String], mutate: F) -> DatabaseResult<()>
    where
        F: FnOnce(&mut Value) -> DatabaseResult<()>,
    {
        let (sequence, root) = {
            let mut data = self.data.lock().unwrap();
            let mut staged = data.clone();
            mutate(&mut staged)?;
            *data = staged;
            if self.listeners.is_empty() {
                return Ok(());
            }
            (self.listeners.next_sequence(), data.clone())
        };
        self.listeners.dispatch(sequence, changed, &root);
        Ok(())
    }
}

fn resolve(value: Value, root: &Value, path: &[String]) -> DatabaseResult<Value> {
    if !contains_server_value(&value) {
        return Ok(value);
    }
    resolve_server_values(
        value,
        get_at_path(root, path),
        chrono::Utc::now().timestamp_millis(),
    )
}

#[async_trait]
impl StoreBackend for InMemoryStoreBackend {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        self.write(path, |root| {
            let value = resolve(value, root, path)?;
            set_at_path(root, path, value);
            Ok(())
        })
    }

    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.write(path, |root| {
            for (key, value) in updates {
                let relative = split_path(&key)?;
                if relative.is_empty() {
                    return Err(invalid_argument("Database update path cannot be empty"));
                }
                let mut target = path.to_vec();
                target.extend(relative);
                let value = resolve(value, root, &target)?;
                set_at_path(root, &target, value);
            }
            Ok(())
        })
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        self.write(path, |root| {
            delete_at_path(root, path);
            Ok(())
        })
    }

    async fn get(&self, path: &[String]) -> DatabaseResult<Option<Value>> {
        let data = self.data.lock().unwrap();
        Ok(get_at_path(&data, path).cloned())
    }

    async fn query(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Option<Value>> {
        let data = self.data.lock().unwrap();
        params.apply(get_at_path(&data, path))
    }

    async fn get_versioned(&self, path: &[String]) -> DatabaseResult<Versioned> {
        let data = self.data.lock().unwrap();
        let value = get_at_path(&data, path).cloned();
        let etag = value_etag(value.as_ref().unwrap_or(&Value::Null));
        Ok(Versioned { value, etag })
    }

    async fn compare_and_set(
        &self,
        path: &[String],
        expected_etag: &str,
        value: Option<Value>,
    ) -> DatabaseResult<bool> {
        let mut applied = false;
        self.write(path, |root| {
            let current = get_at_path(root, path).unwrap_or(&Value::Null);
            if value_etag(current) != expected_etag {
                return Ok(());
            }
            match value {
                Some(value) => {
                    let value = resolve(value, root, path)?;
                    set_at_path(root, path, value);
                }
                None => delete_at_path(root, path),
            }
            applied = true;
            Ok(())
        })?;
        Ok(applied)
    }

    async fn listen(&self, path: &[String], callback: ValueCallback) -> DatabaseResult<ListenerId> {
        let id = self.listeners.register(path.to_vec(), callback);
        let (sequence, current) = {
            let data = self.data.lock().unwrap();
            (self.listeners.next_sequence(), get_at_path(&data, path).cloned())
        };
        self.listeners.deliver_at(sequence, id, current);
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
