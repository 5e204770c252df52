//! # Realtime Database façade
//!
//! JSON-in, JSON-out access to a Realtime Database tree over a pluggable
//! [`StoreBackend`].
//!
//! ## Features
//!
//! - Set, update, push and delete with chronologically ordered push ids
//! - One-shot reads and ordered range queries
//! - Value listeners, one per path, relayed as JSON snapshots
//! - Compare-and-set transactions with retry on contention
//! - Offline mode with a size-bounded cache of known nodes
//! - Server value placeholders (`server_timestamp`, `increment`)
//! - In-memory backend and a REST backend with event-stream listeners
//!
//! ## References
//!
//! - REST API: <https://firebase.google.com/docs/reference/rest/database>
//! - Streaming: <https://firebase.google.com/docs/database/rest/retrieve-data#section-rest-streaming>
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use firebase_bridge::session::Session;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::builder().build()?;
//! session.initialize(None);
//!
//! let db = session.database();
//! db.set_value_async("scores/ada", r#"{"points":10}"#).await?;
//! let pushed = db.push_value_async("log", r#"{"event":"scored"}"#).await?;
//! println!("new entry at {}", pushed.path);
//!
//! let top = db.query_values_async("scores", "points", 3, "", "").await?;
//! println!("{}", top.data);
//! # Ok(())
//! # }
//! ```

mod api;
mod backend;
mod cache;
pub(crate) mod error;
mod listeners;
mod memory;
mod push_id;
mod query;
mod rest;
mod server_value;
mod tree;

#[doc(inline)]
pub use api::{Database, MAX_TRANSACTION_RETRIES};

pub(crate) use api::StoreState;

#[doc(inline)]
pub use backend::{StoreBackend, Versioned};

#[doc(inline)]
pub use cache::OfflineCache;

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

#[doc(inline)]
pub use listeners::{ListenerHub, ListenerId, ValueCallback};

#[doc(inline)]
pub use memory::InMemoryStoreBackend;

#[doc(inline)]
pub use push_id::PushIdGenerator;

#[doc(inline)]
pub use query::{QueryIndex, QueryParams};

#[doc(inline)]
pub use rest::{RestStoreBackend, TokenFetcher};

#[doc(inline)]
pub use server_value::{increment, server_timestamp};

#[doc(inline)]
pub use tree::{normalize_path, split_path};
