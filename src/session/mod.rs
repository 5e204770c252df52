//! Session context shared by the [`Auth`] and [`Database`] façades.
//!
//! A [`Session`] owns the bridge settings, the callback relay, the executor
//! handle operations are spawned on and, once initialized, the auth and
//! store backends. Cloning a session is cheap; clones share all state.
//!
//! ```no_run
//! use std::sync::Arc;
//! use firebase_bridge::app::BridgeSettings;
//! use firebase_bridge::relay::ChannelRelay;
//! use firebase_bridge::session::Session;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (relay, events) = ChannelRelay::new();
//! let session = Session::builder()
//!     .with_settings(BridgeSettings::default())
//!     .with_relay(Arc::new(relay))
//!     .build()?;
//! session.initialize(None);
//!
//! session.auth().sign_in_anonymously(Some("AUTH_1"));
//! let event = events.recv().await;
//! println!("{event:?}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::app::{AppError, AppResult, BridgeSettings};
use crate::auth::{Auth, AuthBackend, AuthError, AuthResult, CurrentUser, InMemoryAuthBackend, RestAuthBackend};
use crate::database::error::{disabled, not_initialized, DatabaseResult};
use crate::database::{Database, InMemoryStoreBackend, RestStoreBackend, StoreBackend, StoreState, TokenFetcher};
use crate::logger::{self, LogLevel, Logger};
use crate::relay::{CallbackRelay, NullRelay};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/session"));

/// ID tokens closer than this to expiry are refreshed before store requests.
const TOKEN_REFRESH_TOLERANCE: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    settings: BridgeSettings,
    relay: Arc<dyn CallbackRelay>,
    runtime: Handle,
    injected_auth: Option<Arc<dyn AuthBackend>>,
    injected_store: Option<Arc<dyn StoreBackend>>,
    state: Mutex<SessionState>,
    store: StoreState,
}

#[derive(Default)]
pub(crate) struct SessionState {
    initialized: bool,
    current_user: Option<CurrentUser>,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    store_backend: Option<Arc<dyn StoreBackend>>,
}

impl SessionInner {
    fn cached_id_token(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .current_user
            .as_ref()
            .map(CurrentUser::id_token)
            .filter(|token| !token.is_empty())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("project_id", &self.inner.settings.project_id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.inner.settings
    }

    pub fn auth(&self) -> Auth {
        Auth::new(self.clone())
    }

    pub fn database(&self) -> Database {
        Database::new(self.clone())
    }

    /// Connects the session to its backends. Calling it again is a no-op.
    ///
    /// `database_url` overrides the URL derived from the settings. REST
    /// backends are used when the settings carry an API key (auth) or a
    /// database URL is known (store); otherwise the session runs on the
    /// in-memory backends. Backends injected through the builder always win.
    pub fn initialize(&self, database_url: Option<&str>) {
        if self.is_initialized() {
            LOGGER.warn("Firebase already initialized");
            return;
        }

        let settings = &self.inner.settings;
        if settings.enable_verbose_logging {
            if let Err(err) = logger::set_log_level(LogLevel::Verbose) {
                LOGGER.warn(format!("Failed to enable verbose logging: {err}"));
            }
        }
        if let Err(err) = settings.validate() {
            LOGGER.debug(format!("Settings incomplete for a hosted project: {err}"));
        }

        let auth_backend = self.select_auth_backend();
        let store_backend = self.select_store_backend(database_url);

        let mut state = self.inner.state.lock().unwrap();
        if state.initialized {
            LOGGER.warn("Firebase already initialized");
            return;
        }
        state.auth_backend = Some(auth_backend);
        state.store_backend = Some(store_backend);
        state.initialized = true;
        LOGGER.info("Firebase initialized successfully");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().unwrap().initialized
    }

    fn select_auth_backend(&self) -> Arc<dyn AuthBackend> {
        if let Some(backend) = &self.inner.injected_auth {
            return backend.clone();
        }
        let settings = &self.inner.settings;
        if settings.api_key.is_empty() {
            LOGGER.debug("No API key configured, using the in-memory auth backend");
            return Arc::new(InMemoryAuthBackend::new());
        }
        match RestAuthBackend::from_settings(settings) {
            Ok(backend) => Arc::new(backend),
            Err(err) => {
                LOGGER.warn(format!(
                    "Falling back to the in-memory auth backend: {err}"
                ));
                Arc::new(InMemoryAuthBackend::new())
            }
        }
    }

    fn select_store_backend(&self, database_url: Option<&str>) -> Arc<dyn StoreBackend> {
        if let Some(backend) = &self.inner.injected_store {
            return backend.clone();
        }
        let settings = &self.inner.settings;
        let url = database_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| settings.full_database_url());
        if url.is_empty() {
            LOGGER.debug("No database URL configured, using the in-memory store backend");
            return Arc::new(InMemoryStoreBackend::new());
        }

        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let fetcher: TokenFetcher =
            Arc::new(move || Ok(weak.upgrade().and_then(|inner| inner.cached_id_token())));
        match RestStoreBackend::new(
            &url,
            fetcher,
            self.inner.runtime.clone(),
            settings.network_timeout(),
        ) {
            Ok(backend) => Arc::new(backend),
            Err(err) => {
                LOGGER.warn(format!(
                    "Falling back to the in-memory store backend: {}",
                    err.message()
                ));
                Arc::new(InMemoryStoreBackend::new())
            }
        }
    }

    pub(crate) fn relay(&self) -> &dyn CallbackRelay {
        self.inner.relay.as_ref()
    }

    pub(crate) fn relay_handle(&self) -> Arc<dyn CallbackRelay> {
        self.inner.relay.clone()
    }

    pub(crate) fn store(&self) -> &StoreState {
        &self.inner.store
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.runtime.spawn(task);
    }

    pub(crate) fn auth_backend(&self) -> AuthResult<Arc<dyn AuthBackend>> {
        let state = self.inner.state.lock().unwrap();
        if !state.initialized {
            return Err(AuthError::NotInitialized);
        }
        if !self.inner.settings.enable_authentication {
            return Err(AuthError::Disabled);
        }
        state.auth_backend.clone().ok_or(AuthError::NotInitialized)
    }

    pub(crate) fn store_backend(&self) -> DatabaseResult<Arc<dyn StoreBackend>> {
        let state = self.inner.state.lock().unwrap();
        if !state.initialized {
            return Err(not_initialized());
        }
        if !self.inner.settings.enable_realtime_database {
            return Err(disabled());
        }
        state.store_backend.clone().ok_or_else(not_initialized)
    }

    pub(crate) fn current_user(&self) -> Option<CurrentUser> {
        self.inner.state.lock().unwrap().current_user.clone()
    }

    pub(crate) fn set_current_user(&self, user: Option<CurrentUser>) {
        self.inner.state.lock().unwrap().current_user = user;
    }

    /// Applies `update` to the signed-in user if it is still `uid`. Returns
    /// the updated user.
    pub(crate) fn update_current_user<F>(&self, uid: &str, update: F) -> Option<CurrentUser>
    where
        F: FnOnce(&mut CurrentUser),
    {
        let mut state = self.inner.state.lock().unwrap();
        let user = state.current_user.as_mut().filter(|user| user.uid() == uid)?;
        update(user);
        Some(user.clone())
    }

    /// Clears the signed-in user if it is still `uid`.
    pub(crate) fn clear_current_user(&self, uid: &str) {
        let mut state = self.inner.state.lock().unwrap();
        if state.current_user.as_ref().is_some_and(|user| user.uid() == uid) {
            state.current_user = None;
        }
    }

    /// Exchanges the refresh token when the cached ID token is missing or
    /// about to expire. Failures are logged and leave the old token in place.
    pub(crate) async fn refresh_token_if_needed(&self) {
        let Some(user) = self.current_user() else {
            return;
        };
        if !user.token_manager().should_refresh(TOKEN_REFRESH_TOLERANCE) {
            return;
        }
        let Some(refresh_token) = user.refresh_token() else {
            return;
        };
        let backend = match self.auth_backend() {
            Ok(backend) => backend,
            Err(_) => return,
        };
        match backend.refresh_id_token(&refresh_token).await {
            Ok(grant) => {
                self.update_current_user(user.uid(), |current| {
                    current.token_manager().apply(&grant)
                });
                LOGGER.debug("Refreshed ID token");
            }
            Err(err) => LOGGER.warn(format!("Failed to refresh ID token: {err}")),
        }
    }
}

/// Configures and builds a [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    settings: Option<BridgeSettings>,
    relay: Option<Arc<dyn CallbackRelay>>,
    runtime: Option<Handle>,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    store_backend: Option<Arc<dyn StoreBackend>>,
}

impl SessionBuilder {
    pub fn with_settings(mut self, settings: BridgeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Destination of every operation result. Defaults to [`NullRelay`].
    pub fn with_relay(mut self, relay: Arc<dyn CallbackRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Executor operations are spawned on. Defaults to the runtime the
    /// builder is called from.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth_backend = Some(backend);
        self
    }

    pub fn with_store_backend(mut self, backend: Arc<dyn StoreBackend>) -> Self {
        self.store_backend = Some(backend);
        self
    }

    pub fn build(self) -> AppResult<Session> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| AppError::NoRuntime)?,
        };
        let settings = self.settings.unwrap_or_default().clamped();
        let store = StoreState::new(&settings);
        Ok(Session {
            inner: Arc::new(SessionInner {
                settings,
                relay: self.relay.unwrap_or_else(|| Arc::new(NullRelay)),
                runtime,
                injected_auth: self.auth_backend,
                injected_store: self.store_backend,
                state: Mutex::new(SessionState::default()),
                store,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::model::{SignedInUser, TokenGrant};

    fn signed_in(uid: &str, id_token: &str) -> CurrentUser {
        CurrentUser::from_sign_in(&SignedInUser {
            uid: uid.into(),
            tokens: TokenGrant {
                id_token: id_token.into(),
                refresh_token: "refresh".into(),
                expires_in: Some(Duration::from_secs(3600)),
            },
            ..Default::default()
        })
    }

    #[test]
    fn build_without_runtime_fails() {
        let err = Session::builder().build().unwrap_err();
        assert_eq!(err, AppError::NoRuntime);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initialize_is_idempotent() {
        let session = Session::builder().build().unwrap();
        assert!(!session.is_initialized());
        assert!(matches!(session.auth_backend(), Err(AuthError::NotInitialized)));

        session.initialize(None);
        assert!(session.is_initialized());
        let first = session.store_backend().unwrap();

        session.initialize(None);
        let second = session.store_backend().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn disabled_features_fail_their_guards() {
        let settings = BridgeSettings {
            enable_authentication: false,
            enable_realtime_database: false,
            ..Default::default()
        };
        let session = Session::builder().with_settings(settings).build().unwrap();
        session.initialize(None);

        assert!(matches!(session.auth_backend(), Err(AuthError::Disabled)));
        let err = session.store_backend().err().unwrap();
        assert_eq!(err.message(), "Realtime Database is not enabled");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn user_updates_only_apply_to_the_same_uid() {
        let session = Session::builder().build().unwrap();
        session.set_current_user(Some(signed_in("uid-1", "id-1")));
        assert_eq!(session.inner.cached_id_token().as_deref(), Some("id-1"));

        assert!(session.update_current_user("uid-2", |_| {}).is_none());
        session.clear_current_user("uid-2");
        assert!(session.current_user().is_some());

        session.clear_current_user("uid-1");
        assert!(session.current_user().is_none());
        assert!(session.inner.cached_id_token().is_none());
    }
}
