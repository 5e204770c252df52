use async_channel::{Receiver, Sender, TryRecvError};

use crate::relay::{AuthOperationResult, CallbackRelay, DatabaseOperationResult, RelayEvent};

/// Queues relay calls so the host can consume them on its own thread.
#[derive(Clone, Debug)]
pub struct ChannelRelay {
    sender: Sender<RelayEvent>,
}

#[derive(Clone, Debug)]
pub struct RelayReceiver {
    receiver: Receiver<RelayEvent>,
}

impl ChannelRelay {
    pub fn new() -> (Self, RelayReceiver) {
        let (sender, receiver) = async_channel::unbounded();
        (Self { sender }, RelayReceiver { receiver })
    }

    fn push(&self, event: RelayEvent) {
        // Only fails once every receiver is gone, at which point nobody is
        // listening for results anyway.
        let _ = self.sender.try_send(event);
    }
}

impl CallbackRelay for ChannelRelay {
    fn auth_result(&self, op_id: Option<&str>, result: AuthOperationResult) {
        self.push(RelayEvent::Auth {
            op_id: op_id.map(str::to_owned),
            result,
        });
    }

    fn database_result(&self, op_id: Option<&str>, result: DatabaseOperationResult) {
        self.push(RelayEvent::Database {
            op_id: op_id.map(str::to_owned),
            result,
        });
    }

    fn value_changed(&self, path: &str, data: &str) {
        self.push(RelayEvent::ValueChanged {
            path: path.to_owned(),
            data: data.to_owned(),
        });
    }
}

impl RelayReceiver {
    /// Waits for the next event. `None` once every sender has been dropped.
    pub async fn recv(&self) -> Option<RelayEvent> {
        self.receiver.recv().await.ok()
    }

    pub fn try_recv(&self) -> Option<RelayEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Takes everything queued so far without waiting.
    pub fn drain(&self) -> Vec<RelayEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Delivers every queued event to `target`, returning how many were
    /// delivered. Meant to be called once per host frame.
    pub fn pump(&self, target: &dyn CallbackRelay) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.try_recv() {
            event.deliver(target);
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::CallbackRegistry;
    use std::sync::{Arc, Mutex};

    #[test]
    fn events_queue_in_call_order() {
        let (relay, receiver) = ChannelRelay::new();
        relay.database_result(Some("DB_1"), DatabaseOperationResult::success("a", "{}"));
        relay.value_changed("scores", "{\"x\":1}");
        relay.auth_result(None, AuthOperationResult::failure("nope"));

        let events = receiver.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], RelayEvent::Database { op_id: Some(id), .. } if id == "DB_1"));
        assert!(matches!(&events[1], RelayEvent::ValueChanged { path, .. } if path == "scores"));
        assert!(receiver.is_empty());
    }

    #[test]
    fn pump_forwards_to_another_relay() {
        let (relay, receiver) = ChannelRelay::new();
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let op_id = registry.track_database(move |result| {
            seen_cb.lock().unwrap().push(result.path);
        });

        relay.database_result(
            Some(&op_id),
            DatabaseOperationResult::success("players/one", "{}"),
        );
        assert_eq!(receiver.pump(&registry), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["players/one".to_string()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn recv_waits_for_events() {
        let (relay, receiver) = ChannelRelay::new();
        let handle = tokio::spawn(async move {
            relay.value_changed("a", "1");
        });
        let event = receiver.recv().await;
        handle.await.unwrap();
        assert_eq!(
            event,
            Some(RelayEvent::ValueChanged {
                path: "a".into(),
                data: "1".into()
            })
        );
    }
}
