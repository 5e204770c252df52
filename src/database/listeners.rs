use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::database::tree::{get_at_path, paths_related};

/// Invoked with the node at the listened path; `None` when it is absent.
pub type ValueCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listener {
    path: Vec<String>,
    callback: ValueCallback,
    // Outer `None` until the first delivery.
    last_sent: Option<Option<Value>>,
    last_sequence: u64,
}

/// Value listeners of a store backend.
///
/// Deliveries are de-duplicated per listener: a callback only runs when the
/// node it watches differs from what it last received. Each delivery carries
/// a sequence number taken when its value was read; a delivery older than
/// the last one a listener accepted is dropped.
///
/// Callbacks run one at a time with the registry lock released. They must
/// not write to the backend that owns the hub synchronously.
#[derive(Default)]
pub struct ListenerHub {
    next_id: AtomicU64,
    sequence: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, Listener>>,
    delivery: Mutex<()>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: Vec<String>, callback: ValueCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.listeners.lock().unwrap().insert(
            id,
            Listener {
                path,
                callback,
                last_sent: None,
                last_sequence: 0,
            },
        );
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.lock().unwrap().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listeners whose path is an ancestor or descendant of `changed_path`.
    pub fn related(&self, changed_path: &[String]) -> Vec<(ListenerId, Vec<String>)> {
        let listeners = self.listeners.lock().unwrap();
        let mut related: Vec<_> = listeners
            .iter()
            .filter(|(_, listener)| paths_related(&listener.path, changed_path))
            .map(|(id, listener)| (*id, listener.path.clone()))
            .collect();
        related.sort_by_key(|(id, _)| *id);
        related
    }

    /// Orders snapshots. Take it while the state the snapshot is read from
    /// is still locked.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Hands `value` to one listener unless it already saw exactly this value.
    pub fn deliver(&self, id: ListenerId, value: Option<Value>) {
        let sequence = self.next_sequence();
        self.deliver_at(sequence, id, value);
    }

    /// Like [`deliver`](Self::deliver) for a value read at `sequence`.
    pub fn deliver_at(&self, sequence: u64, id: ListenerId, value: Option<Value>) {
        let _delivery = self.delivery.lock().unwrap();
        let callback = {
            let mut listeners = self.listeners.lock().unwrap();
            let Some(listener) = listeners.get_mut(&id) else {
                return;
            };
            if sequence <= listener.last_sequence {
                return;
            }
            listener.last_sequence = sequence;
            if listener.last_sent.as_ref() == Some(&value) {
                return;
            }
            listener.last_sent = Some(value.clone());
            Arc::clone(&listener.callback)
        };
        callback(value.as_ref());
    }

    /// Delivers the new state of every listener affected by a write at
    /// `changed_path`, reading values from a root captured at `sequence`.
    pub fn dispatch(&self, sequence: u64, changed_path: &[String], root: &Value) {
        for (id, path) in self.related(changed_path) {
            self.deliver_at(sequence, id, get_at_path(root, &path).cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording() -> (ValueCallback, Arc<Mutex<Vec<Option<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ValueCallback = Arc::new(move |value: Option<&Value>| {
            sink.lock().unwrap().push(value.cloned());
        });
        (callback, seen)
    }

    fn path(raw: &str) -> Vec<String> {
        raw.split('/').map(str::to_owned).collect()
    }

    #[test]
    fn unchanged_values_are_not_redelivered() {
        let hub = ListenerHub::new();
        let (callback, seen) = recording();
        let id = hub.register(path("rooms/a"), callback);

        hub.deliver(id, None);
        hub.deliver(id, None);
        hub.deliver(id, Some(json!({"open": true})));
        hub.deliver(id, Some(json!({"open": true})));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[None, Some(json!({"open": true}))]
        );
    }

    #[test]
    fn dispatch_reaches_ancestors_and_descendants_only() {
        let hub = ListenerHub::new();
        let (parent_cb, parent_seen) = recording();
        let (child_cb, child_seen) = recording();
        let (other_cb, other_seen) = recording();
        hub.register(path("rooms"), parent_cb);
        hub.register(path("rooms/a/players"), child_cb);
        hub.register(path("scores"), other_cb);

        let root = json!({"rooms": {"a": {"open": true}}});
        hub.dispatch(hub.next_sequence(), &path("rooms/a"), &root);

        assert_eq!(parent_seen.lock().unwrap().len(), 1);
        assert_eq!(child_seen.lock().unwrap().as_slice(), &[None]);
        assert!(other_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn older_snapshots_are_dropped() {
        let hub = ListenerHub::new();
        let (callback, seen) = recording();
        let id = hub.register(path("counter"), callback);

        let first = hub.next_sequence();
        let second = hub.next_sequence();
        hub.deliver_at(second, id, Some(json!(2)));
        hub.deliver_at(first, id, Some(json!(1)));
        hub.deliver(id, Some(json!(3)));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Some(json!(2)), Some(json!(3))]
        );
    }

    #[test]
    fn removed_listeners_stop_receiving() {
        let hub = ListenerHub::new();
        let (callback, seen) = recording();
        let id = hub.register(path("a"), callback);
        assert!(hub.remove(id));
        assert!(!hub.remove(id));
        hub.deliver(id, Some(json!(1)));
        assert!(seen.lock().unwrap().is_empty());
        assert!(hub.is_empty());
    }
}
