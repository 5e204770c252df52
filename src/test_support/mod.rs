//! Test utilities shared across crate-level unit tests.

pub mod http;
pub mod session;

pub use http::start_mock_server;
pub use session::{memory_session, TestSession};
