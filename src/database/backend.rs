use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::error::DatabaseResult;
use crate::database::listeners::{ListenerId, ValueCallback};
use crate::database::query::QueryParams;

/// A node together with its content version.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned {
    pub value: Option<Value>,
    pub etag: String,
}

/// Storage behind the [`Database`](crate::database::Database) façade.
///
/// Paths arrive pre-split and validated. Reads return `None` for absent
/// nodes. Writes resolve server-value placeholders and notify the
/// backend's own listeners.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()>;

    /// Merges `updates` (keys may be nested `a/b` paths) below `path`.
    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()>;

    async fn delete(&self, path: &[String]) -> DatabaseResult<()>;

    async fn get(&self, path: &[String]) -> DatabaseResult<Option<Value>>;

    async fn query(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Option<Value>>;

    async fn get_versioned(&self, path: &[String]) -> DatabaseResult<Versioned>;

    /// Writes `value` (`None` deletes) only if the node still carries
    /// `expected_etag`. Returns `Ok(false)` when another writer got there first.
    async fn compare_and_set(
        &self,
        path: &[String],
        expected_etag: &str,
        value: Option<Value>,
    ) -> DatabaseResult<bool>;

    /// Registers a value listener and delivers the current value to it.
    async fn listen(&self, path: &[String], callback: ValueCallback) -> DatabaseResult<ListenerId>;

    fn unlisten(&self, id: ListenerId) -> bool;

    fn listener_count(&self) -> usize;
}
