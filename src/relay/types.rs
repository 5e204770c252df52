/// Outcome of an authentication operation.
///
/// On success `error_message` may still carry an informational message such
/// as `"Password updated"`; hosts display it as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthOperationResult {
    pub success: bool,
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub error_message: String,
    pub auth_token: String,
}

impl AuthOperationResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            ..Default::default()
        }
    }

    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseOperationResult {
    pub success: bool,
    pub path: String,
    pub data: String,
    pub error_message: String,
}

impl DatabaseOperationResult {
    pub fn success(path: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            success: true,
            path: path.into(),
            data: data.into(),
            error_message: String::new(),
        }
    }

    pub fn failure(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            path: path.into(),
            data: String::new(),
            error_message: message.into(),
        }
    }
}

/// A relay call captured as data, as queued by [`ChannelRelay`](super::ChannelRelay).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    Auth {
        op_id: Option<String>,
        result: AuthOperationResult,
    },
    Database {
        op_id: Option<String>,
        result: DatabaseOperationResult,
    },
    ValueChanged {
        path: String,
        data: String,
    },
}

impl RelayEvent {
    pub fn deliver(self, relay: &dyn super::CallbackRelay) {
        match self {
            RelayEvent::Auth { op_id, result } => relay.auth_result(op_id.as_deref(), result),
            RelayEvent::Database { op_id, result } => {
                relay.database_result(op_id.as_deref(), result)
            }
            RelayEvent::ValueChanged { path, data } => relay.value_changed(&path, &data),
        }
    }
}
