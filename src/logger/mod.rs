use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INSTANCES: LazyLock<Mutex<Vec<Weak<LoggerInner>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));
/// Handler installed through [`set_user_log_handler`], picked up by loggers
/// created later.
static GLOBAL_USER_HANDLER: RwLock<Option<(LogCallback, Option<LogLevel>)>> = RwLock::new(None);

type SharedLogHandler = Arc<dyn Fn(&Logger, LogLevel, &str) + Send + Sync + 'static>;

/// Named component logger.
///
/// Every bridge component owns one instance (`@firebase-bridge/auth`,
/// `@firebase-bridge/database`, ...). Levels can be adjusted per instance or
/// globally through [`set_log_level`]; records at or above the level are
/// forwarded to the `log` facade by the default handler.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Arc::new(LoggerInner::new(name.into()));
        track_instance(&inner);
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level<L>(&self, level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &str) + Send + Sync + 'static,
    {
        *self.inner.log_handler.write().unwrap() = Arc::new(handler);
    }

    pub fn has_user_log_handler(&self) -> bool {
        self.inner.user_log_handler.read().unwrap().is_some()
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Debug, message.as_ref());
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Verbose, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Error, message.as_ref());
    }

    fn dispatch(&self, level: LogLevel, message: &str) {
        let user_handler = self.inner.user_log_handler.read().unwrap().clone();
        if let Some(handler) = user_handler {
            handler(self, level, message);
        }
        let handler = self.inner.log_handler.read().unwrap().clone();
        handler(self, level, message);
    }

    fn from_inner(inner: Arc<LoggerInner>) -> Self {
        Self { inner }
    }

    fn set_user_log_handler(&self, handler: Option<SharedLogHandler>) {
        *self.inner.user_log_handler.write().unwrap() = handler;
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("level", &self.log_level())
            .finish()
    }
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    log_handler: RwLock<SharedLogHandler>,
    user_log_handler: RwLock<Option<SharedLogHandler>>,
}

impl LoggerInner {
    fn new(name: String) -> Self {
        let level = GLOBAL_LOG_LEVEL.load(Ordering::SeqCst);
        let user_handler = GLOBAL_USER_HANDLER
            .read()
            .unwrap()
            .as_ref()
            .map(|(callback, min_level)| user_log_handler(Arc::clone(callback), *min_level));
        Self {
            name,
            log_level: AtomicU8::new(level),
            log_handler: RwLock::new(default_log_handler_arc()),
            user_log_handler: RwLock::new(user_handler),
        }
    }
}

fn track_instance(inner: &Arc<LoggerInner>) {
    INSTANCES.lock().unwrap().push(Arc::downgrade(inner));
}

fn default_log_handler_arc() -> SharedLogHandler {
    Arc::new(default_log_handler)
}

fn default_log_handler(logger: &Logger, level: LogLevel, message: &str) {
    if level < logger.log_level() {
        return;
    }
    let Some(target_level) = level.as_log_level() else {
        return;
    };
    log::log!(
        target: logger.name(),
        target_level,
        "[{}]  {}: {message}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        logger.name()
    );
}

fn user_log_handler(callback: LogCallback, min_level: Option<LogLevel>) -> SharedLogHandler {
    Arc::new(move |instance: &Logger, level, message: &str| {
        let threshold = min_level.unwrap_or_else(|| instance.log_level());
        if level < threshold || level == LogLevel::Silent {
            return;
        }
        callback(LogRecord {
            level,
            message: message.to_owned(),
            logger_name: instance.name().to_owned(),
            timestamp: Utc::now(),
        });
    })
}

fn with_instances<F>(mut f: F)
where
    F: FnMut(Logger),
{
    let mut instances = INSTANCES.lock().unwrap();
    let mut i = 0;
    while i < instances.len() {
        match instances[i].upgrade() {
            Some(inner) => {
                f(Logger::from_inner(inner));
                i += 1;
            }
            None => {
                instances.swap_remove(i);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }

    fn as_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::Debug => Some(log::Level::Trace),
            LogLevel::Verbose => Some(log::Level::Debug),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Warn => Some(log::Level::Warn),
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Silent => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Silent => "SILENT",
        };
        f.write_str(label)
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

/// A single record handed to a user log handler.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub logger_name: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn level_label(&self) -> &'static str {
        self.level.as_str()
    }

    /// Formats the record the way host consoles print plugin output.
    pub fn to_line(&self) -> String {
        format!(
            "[{}]  {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.logger_name,
            self.message
        )
    }
}

pub type LogCallback = Arc<dyn Fn(LogRecord) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => {
                write!(f, "Invalid value \"{level}\" assigned to `logLevel`")
            }
        }
    }
}

impl std::error::Error for LogError {}

/// Sets the level of every live logger and of loggers created afterwards.
pub fn set_log_level<L>(level: L) -> Result<(), LogError>
where
    L: IntoLogLevel,
{
    let level = level.into_log_level()?;
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    with_instances(|logger| {
        let _ = logger.set_log_level(level);
    });
    Ok(())
}

/// Installs (or clears, with `None`) a handler that receives every record at or
/// above `min_level` (defaults to each logger's own level), from live loggers
/// and from loggers created afterwards.
pub fn set_user_log_handler(callback: Option<LogCallback>, min_level: Option<LogLevel>) {
    *GLOBAL_USER_HANDLER.write().unwrap() = callback
        .as_ref()
        .map(|callback| (Arc::clone(callback), min_level));
    with_instances(|logger| {
        let handler = callback
            .as_ref()
            .map(|callback| user_log_handler(Arc::clone(callback), min_level));
        logger.set_user_log_handler(handler);
    });
}

pub fn set_user_log_handler_fn<F>(callback: Option<F>, min_level: Option<LogLevel>)
where
    F: Fn(LogRecord) + Send + Sync + 'static,
{
    let wrapped = callback.map(|cb| Arc::new(cb) as LogCallback);
    set_user_log_handler(wrapped, min_level);
}

#[cfg(test)]
pub(crate) static TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn reset_logging() {
        set_log_level(LogLevel::Info).unwrap();
        set_user_log_handler(None, None);
    }

    #[test]
    fn log_methods_respect_global_level() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        reset_logging();
        let logger = Logger::new("@firebase-bridge/logger-level-test");

        set_log_level(LogLevel::Debug).unwrap();

        let records = Arc::new(Mutex::new(Vec::new()));
        let handler_records = Arc::clone(&records);

        logger.set_log_handler(move |instance, level, message| {
            if level < instance.log_level() {
                return;
            }
            handler_records
                .lock()
                .unwrap()
                .push((level, message.to_owned()));
        });

        logger.debug("debug message");
        logger.log("verbose message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");

        let stored = records.lock().unwrap();
        let levels: Vec<_> = stored.iter().map(|(level, _)| *level).collect();
        assert_eq!(
            levels,
            [
                LogLevel::Debug,
                LogLevel::Verbose,
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error,
            ]
        );
        assert_eq!(stored[0].1, "debug message");
        reset_logging();
    }

    #[test]
    fn string_levels_filter_records() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        reset_logging();
        let logger = Logger::new("@firebase-bridge/logger-string-level");
        set_log_level("warn").unwrap();

        let records = Arc::new(Mutex::new(Vec::new()));
        let handler_records = Arc::clone(&records);
        logger.set_log_handler(move |instance, level, _message| {
            if level < instance.log_level() {
                return;
            }
            handler_records.lock().unwrap().push(level);
        });

        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");

        assert_eq!(
            records.lock().unwrap().as_slice(),
            &[LogLevel::Warn, LogLevel::Error]
        );
        assert!(set_log_level("loud").is_err());
        reset_logging();
    }

    #[test]
    fn user_handler_receives_records_above_custom_level() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        reset_logging();
        let logger = Logger::new("@firebase-bridge/user-handler");
        let logger_name = logger.name().to_owned();

        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_cb = Arc::clone(&captured);

        set_user_log_handler_fn(
            Some({
                let logger_name = logger_name.clone();
                move |record: LogRecord| {
                    if record.logger_name == logger_name {
                        captured_cb.lock().unwrap().push(record);
                    }
                }
            }),
            Some(LogLevel::Warn),
        );

        assert!(logger.has_user_log_handler());

        logger.info("info message");
        logger.warn("warn message");

        let records = captured.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level_label(), "warn");
        assert!(records[0]
            .to_line()
            .ends_with("@firebase-bridge/user-handler: warn message"));
        reset_logging();
    }

    #[test]
    fn user_handler_reaches_loggers_created_later() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        reset_logging();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_cb = Arc::clone(&captured);
        set_user_log_handler_fn(
            Some(move |record: LogRecord| {
                if record.logger_name == "@firebase-bridge/late-logger" {
                    captured_cb.lock().unwrap().push(record.message);
                }
            }),
            None,
        );

        let logger = Logger::new("@firebase-bridge/late-logger");
        assert!(logger.has_user_log_handler());
        logger.debug("below level");
        logger.info("created after install");

        assert_eq!(
            captured.lock().unwrap().as_slice(),
            &["created after install".to_string()]
        );
        reset_logging();
        assert!(!Logger::new("@firebase-bridge/late-logger").has_user_log_handler());
    }
}
