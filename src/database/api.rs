use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use serde_json::Value;

use crate::app::BridgeSettings;
use crate::database::backend::StoreBackend;
use crate::database::cache::OfflineCache;
use crate::database::error::{offline, DatabaseError, DatabaseErrorCode, DatabaseResult};
use crate::database::listeners::{ListenerId, ValueCallback};
use crate::database::push_id::PushIdGenerator;
use crate::database::query::QueryParams;
use crate::database::server_value;
use crate::database::tree::{normalize_path, split_path};
use crate::logger::Logger;
use crate::relay::DatabaseOperationResult;
use crate::session::Session;
use crate::util::{decode_document, decode_updates, encode_snapshot};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/database"));

/// Attempts made by a transaction before it gives up on a contended node.
pub const MAX_TRANSACTION_RETRIES: u32 = 25;

/// Store bookkeeping owned by the session: active listeners, synced paths,
/// the offline cache and the connection flag.
pub(crate) struct StoreState {
    subscriptions: Mutex<HashMap<String, ListenerId>>,
    synced: Mutex<HashMap<String, ListenerId>>,
    cache: Arc<OfflineCache>,
    push_ids: PushIdGenerator,
    online: AtomicBool,
}

impl StoreState {
    pub(crate) fn new(settings: &BridgeSettings) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            synced: Mutex::new(HashMap::new()),
            cache: Arc::new(OfflineCache::new(
                settings.enable_offline_persistence,
                settings.cache_size_bytes(),
            )),
            push_ids: PushIdGenerator::new(),
            online: AtomicBool::new(true),
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Realtime Database façade bound to a [`Session`].
///
/// Paths are slash separated (`"scores/alice"`); leading and trailing
/// slashes are ignored. Values are exchanged as JSON text: writes take a
/// JSON object (or an empty string / `null` to clear the node) and reads
/// report the node as JSON, `"{}"` when it is absent.
///
/// As with [`Auth`](crate::auth::Auth), every plain operation reports one
/// [`DatabaseOperationResult`] through the relay and has an `_async`
/// counterpart returning it directly.
#[derive(Clone)]
pub struct Database {
    session: Session,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("connected", &self.is_connected())
            .field("listeners", &self.active_listeners())
            .finish()
    }
}

impl Database {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    fn store(&self) -> &StoreState {
        self.session.store()
    }

    // ---- writes ---------------------------------------------------------

    pub fn set_value(&self, path: &str, json: &str, op_id: Option<&str>) {
        let json = json.to_owned();
        self.dispatch(path, op_id, false, move |db, path| async move {
            db.set_value_async(&path, &json).await
        });
    }

    /// Overwrites the node at `path`. The result carries the JSON as sent.
    pub async fn set_value_async(&self, path: &str, json: &str) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.writable()?;
        let segments = split_path(path)?;
        let value = decode_document(json)?;
        self.session.refresh_token_if_needed().await;
        backend
            .set(&segments, value.clone().unwrap_or(Value::Null))
            .await?;
        self.store().cache.record(&segments, value.as_ref());
        LOGGER.info(format!("Database value set: {path}"));
        Ok(DatabaseOperationResult::success(path, json))
    }

    pub fn update_value(&self, path: &str, json: &str, op_id: Option<&str>) {
        let json = json.to_owned();
        self.dispatch(path, op_id, false, move |db, path| async move {
            db.update_value_async(&path, &json).await
        });
    }

    /// Merges the keys of `json` into the node at `path`; other children
    /// are left untouched. Keys may be nested paths (`"profile/name"`).
    pub async fn update_value_async(&self, path: &str, json: &str) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.writable()?;
        let segments = split_path(path)?;
        let updates = decode_updates(json)?;
        self.session.refresh_token_if_needed().await;
        backend.update(&segments, updates.clone()).await?;
        self.store().cache.record_children(&segments, &updates);
        LOGGER.info(format!("Database value updated: {path}"));
        Ok(DatabaseOperationResult::success(path, json))
    }

    pub fn push_value(&self, path: &str, json: &str, op_id: Option<&str>) {
        let json = json.to_owned();
        self.dispatch(path, op_id, false, move |db, path| async move {
            db.push_value_async(&path, &json).await
        });
    }

    /// Writes `json` under a new push id child of `path`. The result path
    /// is the full path of the new child.
    pub async fn push_value_async(&self, path: &str, json: &str) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.writable()?;
        let mut segments = split_path(path)?;
        let value = decode_document(json)?;
        let key = self.store().push_ids.next_id();
        segments.push(key.clone());
        self.session.refresh_token_if_needed().await;
        backend
            .set(&segments, value.clone().unwrap_or(Value::Null))
            .await?;
        self.store().cache.record(&segments, value.as_ref());
        let child_path = child_path(path, &key);
        LOGGER.info(format!("Database value pushed: {child_path}"));
        Ok(DatabaseOperationResult::success(child_path, json))
    }

    pub fn delete_value(&self, path: &str, op_id: Option<&str>) {
        self.dispatch(path, op_id, false, |db, path| async move {
            db.delete_value_async(&path).await
        });
    }

    pub async fn delete_value_async(&self, path: &str) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.writable()?;
        let segments = split_path(path)?;
        self.session.refresh_token_if_needed().await;
        backend.delete(&segments).await?;
        self.store().cache.record(&segments, None);
        LOGGER.info(format!("Database value deleted: {path}"));
        Ok(DatabaseOperationResult::success(path, ""))
    }

    // ---- reads ----------------------------------------------------------

    pub fn get_value(&self, path: &str, op_id: Option<&str>) {
        self.dispatch(path, op_id, true, |db, path| async move {
            db.get_value_async(&path).await
        });
    }

    /// Reads the node at `path` once. While offline the last cached value is
    /// served when the cache covers the path.
    pub async fn get_value_async(&self, path: &str) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.session.store_backend()?;
        let segments = split_path(path)?;
        if !self.store().is_online() {
            let cached = self.store().cache.lookup(&segments).ok_or_else(offline)?;
            return Ok(DatabaseOperationResult::success(path, encode_snapshot(cached.as_ref())));
        }
        self.session.refresh_token_if_needed().await;
        let value = backend.get(&segments).await?;
        self.store().cache.record(&segments, value.as_ref());
        LOGGER.info(format!("Database value retrieved: {path}"));
        Ok(DatabaseOperationResult::success(path, encode_snapshot(value.as_ref())))
    }

    pub fn query_values(
        &self,
        path: &str,
        order_by: &str,
        limit_to_first: i32,
        start_at: &str,
        end_at: &str,
        op_id: Option<&str>,
    ) {
        let (order_by, start_at, end_at) = (order_by.to_owned(), start_at.to_owned(), end_at.to_owned());
        self.dispatch(path, op_id, true, move |db, path| async move {
            db.query_values_async(&path, &order_by, limit_to_first, &start_at, &end_at)
                .await
        });
    }

    /// Orders the children of `path` by the `order_by` child (by key when
    /// empty), keeps those within the inclusive `start_at`..`end_at` range
    /// and then the first `limit_to_first` of them when it is positive.
    /// Empty bounds are open.
    pub async fn query_values_async(
        &self,
        path: &str,
        order_by: &str,
        limit_to_first: i32,
        start_at: &str,
        end_at: &str,
    ) -> DatabaseResult<DatabaseOperationResult> {
        let params = QueryParams::from_boundary(order_by, limit_to_first, start_at, end_at)?;
        self.query_async(path, &params).await
    }

    /// Runs a query built with [`QueryParams`].
    pub async fn query_async(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> DatabaseResult<DatabaseOperationResult> {
        let backend = self.session.store_backend()?;
        let segments = split_path(path)?;
        if !self.store().is_online() {
            let cached = self.store().cache.lookup(&segments).ok_or_else(offline)?;
            let selected = params.apply(cached.as_ref())?;
            return Ok(DatabaseOperationResult::success(path, encode_snapshot(selected.as_ref())));
        }
        self.session.refresh_token_if_needed().await;
        let selected = backend.query(&segments, params).await?;
        LOGGER.info(format!("Database query successful: {path}"));
        Ok(DatabaseOperationResult::success(path, encode_snapshot(selected.as_ref())))
    }

    // ---- listeners ------------------------------------------------------

    /// Subscribes to `path`. The current value and every later change are
    /// reported through the relay's `value_changed` with `path` as given.
    ///
    /// Listening again on the same path replaces the earlier registration.
    /// Failures are reported as a database result without an operation id.
    pub fn listen_for_value_changes(&self, path: &str) {
        self.dispatch_unreported(path, false, |db, path| async move {
            db.listen_for_value_changes_async(&path).await
        });
    }

    pub async fn listen_for_value_changes_async(&self, path: &str) -> DatabaseResult<()> {
        let backend = self.writable()?;
        let segments = split_path(path)?;
        let key = normalize_path(path);

        let previous = self.store().subscriptions.lock().unwrap().remove(&key);
        if let Some(previous) = previous {
            backend.unlisten(previous);
        }

        let relay = self.session.relay_handle();
        let cache = self.store().cache.clone();
        let reported_path = path.to_string();
        let cached_segments = segments.clone();
        let callback: ValueCallback = Arc::new(move |value: Option<&Value>| {
            cache.record(&cached_segments, value);
            relay.value_changed(&reported_path, &encode_snapshot(value));
        });

        self.session.refresh_token_if_needed().await;
        let id = backend.listen(&segments, callback).await?;
        let displaced = self.store().subscriptions.lock().unwrap().insert(key, id);
        if let Some(displaced) = displaced {
            backend.unlisten(displaced);
        }
        LOGGER.info(format!("Listening for value changes: {path}"));
        Ok(())
    }

    /// Removes the subscription on `path`. Returns `false` when there was none.
    pub fn stop_listening(&self, path: &str) -> bool {
        let Ok(backend) = self.session.store_backend() else {
            return false;
        };
        let removed = self
            .store()
            .subscriptions
            .lock()
            .unwrap()
            .remove(&normalize_path(path));
        match removed {
            Some(id) => {
                backend.unlisten(id);
                LOGGER.info(format!("Stopped listening: {path}"));
                true
            }
            None => false,
        }
    }

    /// Number of paths with an active subscription.
    pub fn active_listeners(&self) -> usize {
        self.store().subscriptions.lock().unwrap().len()
    }

    // ---- transactions ---------------------------------------------------

    pub fn run_transaction(&self, path: &str, json: &str, op_id: Option<&str>) {
        let json = json.to_owned();
        self.dispatch(path, op_id, false, move |db, path| async move {
            db.run_transaction_async(&path, &json).await
        });
    }

    /// Writes `json` to `path` as a transaction. The result carries the JSON
    /// as sent.
    pub async fn run_transaction_async(&self, path: &str, json: &str) -> DatabaseResult<DatabaseOperationResult> {
        let value = decode_document(json)?.unwrap_or(Value::Null);
        self.run_transaction_with(path, move |_| Some(value.clone()))
            .await?;
        LOGGER.info(format!("Transaction successful: {path}"));
        Ok(DatabaseOperationResult::success(path, json))
    }

    /// Read-modify-write on `path`.
    ///
    /// `update` receives the current node (`None` when absent) and returns
    /// the new value, `Value::Null` to delete the node, or `None` to abort.
    /// The write only lands if the node has not changed since it was read;
    /// otherwise `update` runs again on the fresh value, up to
    /// [`MAX_TRANSACTION_RETRIES`] times. Returns the committed value.
    pub async fn run_transaction_with<F>(&self, path: &str, mut update: F) -> DatabaseResult<Option<Value>>
    where
        F: FnMut(Option<&Value>) -> Option<Value> + Send,
    {
        let backend = self.writable()?;
        let segments = split_path(path)?;
        self.session.refresh_token_if_needed().await;

        for attempt in 1..=MAX_TRANSACTION_RETRIES {
            let current = backend.get_versioned(&segments).await?;
            let Some(next) = update(current.value.as_ref()) else {
                return Err(DatabaseError::new(
                    DatabaseErrorCode::TransactionAborted,
                    "Transaction failed",
                ));
            };
            let next = (!next.is_null()).then_some(next);
            match backend
                .compare_and_set(&segments, &current.etag, next.clone())
                .await
            {
                Ok(true) => {
                    self.store().cache.record(&segments, next.as_ref());
                    return Ok(next);
                }
                Ok(false) => {
                    LOGGER.debug(format!("Transaction on {path} lost a race (attempt {attempt})"));
                }
                Err(err) if err.code == DatabaseErrorCode::VersionMismatch => {
                    LOGGER.debug(format!("Transaction on {path} lost a race (attempt {attempt})"));
                }
                Err(err) => return Err(err),
            }
        }
        Err(DatabaseError::new(
            DatabaseErrorCode::MaxRetries,
            "The transaction had too many retries",
        ))
    }

    // ---- offline and connection -------------------------------------------

    pub fn enable_offline_persistence(&self) {
        if !self.session.is_initialized() {
            return;
        }
        self.store().cache.enable();
        LOGGER.info("Offline persistence enabled");
    }

    /// Turns the offline cache off and discards its contents.
    pub fn disable_offline_persistence(&self) {
        if !self.session.is_initialized() {
            return;
        }
        self.store().cache.disable();
        LOGGER.info("Offline persistence disabled");
    }

    /// Keeps `path` mirrored in the offline cache while `keep_synced` is set.
    pub fn keep_synced(&self, path: &str, keep_synced: bool) {
        // Un-syncing only touches local bookkeeping and works offline.
        self.dispatch_unreported(path, !keep_synced, move |db, path| async move {
            db.keep_synced_async(&path, keep_synced).await
        });
    }

    pub async fn keep_synced_async(&self, path: &str, keep_synced: bool) -> DatabaseResult<()> {
        let segments = split_path(path)?;
        let key = normalize_path(path);

        if !keep_synced {
            let backend = self.session.store_backend()?;
            let removed = self.store().synced.lock().unwrap().remove(&key);
            if let Some(id) = removed {
                backend.unlisten(id);
            }
            LOGGER.info(format!("Keep synced disabled for: {path}"));
            return Ok(());
        }

        let backend = self.writable()?;
        if self.store().synced.lock().unwrap().contains_key(&key) {
            return Ok(());
        }
        let cache = self.store().cache.clone();
        let synced_segments = segments.clone();
        let callback: ValueCallback = Arc::new(move |value: Option<&Value>| {
            cache.record(&synced_segments, value);
        });
        self.session.refresh_token_if_needed().await;
        let id = backend.listen(&segments, callback).await?;
        let displaced = self.store().synced.lock().unwrap().insert(key, id);
        if let Some(displaced) = displaced {
            backend.unlisten(displaced);
        }
        LOGGER.info(format!("Keep synced enabled for: {path}"));
        Ok(())
    }

    pub fn go_online(&self) {
        if !self.session.is_initialized() {
            return;
        }
        self.store().online.store(true, Ordering::SeqCst);
        LOGGER.info("Database going online");
    }

    /// Until [`go_online`](Self::go_online), writes fail with
    /// `"Database is offline"` and reads are answered from the offline
    /// cache.
    pub fn go_offline(&self) {
        if !self.session.is_initialized() {
            return;
        }
        self.store().online.store(false, Ordering::SeqCst);
        LOGGER.info("Database going offline");
    }

    pub fn is_connected(&self) -> bool {
        self.session.store_backend().is_ok() && self.store().is_online()
    }

    // ---- utilities ------------------------------------------------------

    /// A fresh push id, or an empty string before initialization.
    pub fn generate_push_id(&self) -> String {
        if self.session.store_backend().is_err() {
            return String::new();
        }
        self.store().push_ids.next_id()
    }

    /// JSON placeholder for the server's write time, for embedding in values
    /// passed to the write operations.
    pub fn server_timestamp(&self) -> String {
        server_value::server_timestamp().to_string()
    }

    /// JSON placeholder that adds `delta` to the stored number at write time.
    pub fn increment(&self, delta: f64) -> String {
        server_value::increment(delta).to_string()
    }

    // ---- plumbing -------------------------------------------------------

    fn writable(&self) -> DatabaseResult<Arc<dyn StoreBackend>> {
        let backend = self.session.store_backend()?;
        if !self.store().is_online() {
            return Err(offline());
        }
        Ok(backend)
    }

    fn check(&self, allow_offline: bool) -> DatabaseResult<()> {
        if allow_offline {
            self.session.store_backend().map(|_| ())
        } else {
            self.writable().map(|_| ())
        }
    }

    fn dispatch<F, Fut>(&self, path: &str, op_id: Option<&str>, allow_offline: bool, operation: F)
    where
        F: FnOnce(Database, String) -> Fut,
        Fut: Future<Output = DatabaseResult<DatabaseOperationResult>> + Send + 'static,
    {
        if let Err(err) = self.check(allow_offline) {
            LOGGER.warn(format!("{} ({path})", err.message()));
            self.session
                .relay()
                .database_result(op_id, DatabaseOperationResult::failure(path, err.message()));
            return;
        }

        let relay = self.session.relay_handle();
        let op_id = op_id.map(str::to_owned);
        let reported_path = path.to_owned();
        let task = operation(self.clone(), path.to_owned());
        self.session.spawn(async move {
            let result = task.await.unwrap_or_else(|err| {
                LOGGER.error(format!("Database operation on {reported_path} failed: {err}"));
                DatabaseOperationResult::failure(reported_path, err.message())
            });
            relay.database_result(op_id.as_deref(), result);
        });
    }

    /// Like `dispatch` for operations whose success has no result; only
    /// failures reach the relay.
    fn dispatch_unreported<F, Fut>(&self, path: &str, allow_offline: bool, operation: F)
    where
        F: FnOnce(Database, String) -> Fut,
        Fut: Future<Output = DatabaseResult<()>> + Send + 'static,
    {
        if let Err(err) = self.check(allow_offline) {
            LOGGER.warn(format!("{} ({path})", err.message()));
            self.session
                .relay()
                .database_result(None, DatabaseOperationResult::failure(path, err.message()));
            return;
        }

        let relay = self.session.relay_handle();
        let reported_path = path.to_owned();
        let task = operation(self.clone(), path.to_owned());
        self.session.spawn(async move {
            if let Err(err) = task.await {
                LOGGER.error(format!("Database operation on {reported_path} failed: {err}"));
                relay.database_result(
                    None,
                    DatabaseOperationResult::failure(reported_path, err.message()),
                );
            }
        });
    }
}

fn child_path(path: &str, key: &str) -> String {
    let parent = path.trim_end_matches('/');
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}/{key}")
    }
}
