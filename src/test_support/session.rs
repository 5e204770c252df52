use std::sync::Arc;

use crate::app::BridgeSettings;
use crate::auth::InMemoryAuthBackend;
use crate::database::InMemoryStoreBackend;
use crate::relay::{ChannelRelay, RelayReceiver};
use crate::session::Session;

/// A session on in-memory backends whose relay events queue in `events`.
pub struct TestSession {
    pub session: Session,
    pub events: RelayReceiver,
    pub auth: Arc<InMemoryAuthBackend>,
    pub store: Arc<InMemoryStoreBackend>,
}

impl TestSession {
    pub fn build(auth: Arc<InMemoryAuthBackend>, initialize: bool) -> Self {
        Self::build_with_settings(BridgeSettings::default(), auth, initialize)
    }

    pub fn build_with_settings(
        settings: BridgeSettings,
        auth: Arc<InMemoryAuthBackend>,
        initialize: bool,
    ) -> Self {
        let (relay, events) = ChannelRelay::new();
        let store = Arc::new(InMemoryStoreBackend::new());
        let session = Session::builder()
            .with_settings(settings)
            .with_relay(Arc::new(relay))
            .with_auth_backend(auth.clone())
            .with_store_backend(store.clone())
            .build()
            .expect("test session");
        if initialize {
            session.initialize(None);
        }
        Self {
            session,
            events,
            auth,
            store,
        }
    }

    /// Initialized session on a caller-supplied auth backend.
    pub fn with_auth_backend(auth: Arc<InMemoryAuthBackend>) -> Self {
        Self::build(auth, true)
    }
}

/// Must be called from within a tokio runtime.
pub fn memory_session(initialize: bool) -> TestSession {
    TestSession::build(Arc::new(InMemoryAuthBackend::new()), initialize)
}
