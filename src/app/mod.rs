//! Bridge configuration.
//!
//! [`BridgeSettings`] mirrors the project settings a host ships with its
//! build: project identifiers, which services are enabled, and the tuning
//! knobs applied when a [`Session`](crate::session::Session) initializes.

mod errors;
mod settings;

pub use errors::{AppError, AppResult};
pub use settings::{AuthProviderKind, BridgeSettings, DatabaseRegion};
