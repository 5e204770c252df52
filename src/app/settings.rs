use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::errors::{AppError, AppResult};

pub(crate) const DEFAULT_IDENTITY_TOOLKIT_ENDPOINT: &str =
    "https://identitytoolkit.googleapis.com/v1";
pub(crate) const DEFAULT_SECURE_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";

const MIN_CACHE_SIZE_MB: u32 = 1;
const MAX_CACHE_SIZE_MB: u32 = 100;
const MIN_NETWORK_TIMEOUT_SECS: u64 = 5;
const MAX_NETWORK_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProviderKind {
    #[default]
    Email,
    Google,
    Facebook,
    Anonymous,
    Phone,
}

/// Hosting region of the Realtime Database instance, used when no explicit
/// database URL is configured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseRegion {
    #[default]
    UsCentral,
    EuropeWest,
    AsiaSoutheast,
}

impl DatabaseRegion {
    pub fn host_suffix(self) -> &'static str {
        match self {
            DatabaseRegion::UsCentral => "",
            DatabaseRegion::EuropeWest => "-europe-west1",
            DatabaseRegion::AsiaSoutheast => "-asia-southeast1",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeSettings {
    pub project_id: String,
    pub app_id: String,
    pub api_key: String,
    pub database_url: String,
    pub storage_bucket: String,

    pub enable_authentication: bool,
    pub enabled_auth_providers: Vec<AuthProviderKind>,
    pub google_client_id: String,
    pub facebook_app_id: String,
    pub require_email_verification: bool,
    pub auto_sign_in: bool,

    pub enable_realtime_database: bool,
    pub database_region: DatabaseRegion,
    pub enable_offline_persistence: bool,
    pub cache_size_mb: u32,
    pub auto_reconnect: bool,

    pub network_timeout_seconds: u64,
    pub enable_verbose_logging: bool,

    /// Overrides the Identity Toolkit base URL (emulators, tests).
    pub identity_toolkit_endpoint: Option<String>,
    /// Overrides the Secure Token refresh URL.
    pub secure_token_endpoint: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            app_id: String::new(),
            api_key: String::new(),
            database_url: String::new(),
            storage_bucket: String::new(),
            enable_authentication: true,
            enabled_auth_providers: vec![AuthProviderKind::Email, AuthProviderKind::Anonymous],
            google_client_id: String::new(),
            facebook_app_id: String::new(),
            require_email_verification: false,
            auto_sign_in: true,
            enable_realtime_database: true,
            database_region: DatabaseRegion::UsCentral,
            enable_offline_persistence: true,
            cache_size_mb: 10,
            auto_reconnect: true,
            network_timeout_seconds: 15,
            enable_verbose_logging: false,
            identity_toolkit_endpoint: None,
            secure_token_endpoint: None,
        }
    }
}

impl BridgeSettings {
    pub fn from_json_str(text: &str) -> AppResult<Self> {
        let settings: BridgeSettings =
            serde_json::from_str(text).map_err(|err| AppError::SettingsParse {
                message: err.to_string(),
            })?;
        Ok(settings.clamped())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| AppError::SettingsIo {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Pulls the tunables back into their supported ranges.
    pub fn clamped(mut self) -> Self {
        self.cache_size_mb = self.cache_size_mb.clamp(MIN_CACHE_SIZE_MB, MAX_CACHE_SIZE_MB);
        self.network_timeout_seconds = self
            .network_timeout_seconds
            .clamp(MIN_NETWORK_TIMEOUT_SECS, MAX_NETWORK_TIMEOUT_SECS);
        self
    }

    /// The configured database URL, or one derived from the project id and
    /// region. Empty when neither is available.
    pub fn full_database_url(&self) -> String {
        if !self.database_url.is_empty() {
            return self.database_url.clone();
        }
        if self.project_id.is_empty() {
            return String::new();
        }
        format!(
            "https://{}{}.firebaseio.com",
            self.project_id,
            self.database_region.host_suffix()
        )
    }

    pub fn is_authentication_configured(&self) -> bool {
        self.enable_authentication
            && !self.project_id.is_empty()
            && !self.api_key.is_empty()
            && !self.enabled_auth_providers.is_empty()
    }

    pub fn is_database_configured(&self) -> bool {
        self.enable_realtime_database
            && !self.project_id.is_empty()
            && !self.full_database_url().is_empty()
    }

    pub fn is_provider_enabled(&self, provider: AuthProviderKind) -> bool {
        self.enabled_auth_providers.contains(&provider)
    }

    /// Checks the settings a deployed project needs, reporting the first gap.
    pub fn validate(&self) -> AppResult<()> {
        if self.project_id.is_empty() {
            return Err(AppError::invalid_settings("Project ID is required"));
        }
        if self.app_id.is_empty() {
            return Err(AppError::invalid_settings("App ID is required"));
        }
        if self.api_key.is_empty() {
            return Err(AppError::invalid_settings("API Key is required"));
        }
        if self.enable_authentication && self.enabled_auth_providers.is_empty() {
            return Err(AppError::invalid_settings(
                "At least one authentication provider must be enabled",
            ));
        }
        if self.enable_realtime_database && self.full_database_url().is_empty() {
            return Err(AppError::invalid_settings(
                "Database URL is required when Realtime Database is enabled",
            ));
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(
            self.network_timeout_seconds
                .clamp(MIN_NETWORK_TIMEOUT_SECS, MAX_NETWORK_TIMEOUT_SECS),
        )
    }

    pub fn cache_size_bytes(&self) -> u64 {
        u64::from(self.cache_size_mb.clamp(MIN_CACHE_SIZE_MB, MAX_CACHE_SIZE_MB)) * 1024 * 1024
    }

    pub fn identity_toolkit_endpoint(&self) -> &str {
        self.identity_toolkit_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_IDENTITY_TOOLKIT_ENDPOINT)
    }

    pub fn secure_token_endpoint(&self) -> &str {
        self.secure_token_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_SECURE_TOKEN_ENDPOINT)
    }
}
