use std::sync::{Arc, Mutex};

use firebase_bridge::logger::{set_user_log_handler_fn, LogLevel, LogRecord};
use firebase_bridge::session::Session;

#[tokio::test(flavor = "current_thread")]
async fn handler_installed_at_startup_sees_session_records() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    set_user_log_handler_fn(
        Some(move |record: LogRecord| {
            sink.lock()
                .unwrap()
                .push((record.logger_name, record.message));
        }),
        Some(LogLevel::Info),
    );

    let session = Session::builder().build().expect("session");
    session.initialize(None);
    session.initialize(None);

    let records = records.lock().unwrap();
    assert!(records.contains(&(
        "@firebase-bridge/session".to_string(),
        "Firebase initialized successfully".to_string()
    )));
    assert!(records.contains(&(
        "@firebase-bridge/session".to_string(),
        "Firebase already initialized".to_string()
    )));
}
