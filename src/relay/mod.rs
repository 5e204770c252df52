//! Outbound delivery of operation results to the host.
//!
//! Every façade operation ends in exactly one call on a [`CallbackRelay`].
//! Hosts either implement the trait directly, queue events with
//! [`ChannelRelay`] and drain them on their own thread, or route them to
//! per-operation closures through [`CallbackRegistry`].

mod channel;
mod registry;
mod types;

pub use channel::{ChannelRelay, RelayReceiver};
pub use registry::{AuthCallback, CallbackRegistry, DatabaseCallback, ValueChangedCallback};
pub use types::{AuthOperationResult, DatabaseOperationResult, RelayEvent};

/// Receives the terminal result of each operation and every value change of
/// an active listener.
///
/// Implementations are called from executor threads and must not block.
pub trait CallbackRelay: Send + Sync {
    fn auth_result(&self, op_id: Option<&str>, result: AuthOperationResult);

    fn database_result(&self, op_id: Option<&str>, result: DatabaseOperationResult);

    fn value_changed(&self, path: &str, data: &str);
}

/// Relay that drops everything. Used when a session is built without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

impl CallbackRelay for NullRelay {
    fn auth_result(&self, _op_id: Option<&str>, _result: AuthOperationResult) {}

    fn database_result(&self, _op_id: Option<&str>, _result: DatabaseOperationResult) {}

    fn value_changed(&self, _path: &str, _data: &str) {}
}
