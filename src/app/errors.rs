use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    InvalidSettings { message: String },
    SettingsParse { message: String },
    SettingsIo { path: String, message: String },
    NoRuntime,
}

impl AppError {
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        AppError::InvalidSettings {
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidSettings { message } => f.write_str(message),
            AppError::SettingsParse { message } => {
                write!(f, "Failed to parse bridge settings: {message}")
            }
            AppError::SettingsIo { path, message } => {
                write!(f, "Failed to read bridge settings from '{path}': {message}")
            }
            AppError::NoRuntime => write!(
                f,
                "No tokio runtime available - pass a handle to SessionBuilder::runtime()"
            ),
        }
    }
}

impl std::error::Error for AppError {}
