//! # Authentication façade
//!
//! Email/password, anonymous and account-management operations over a
//! pluggable [`AuthBackend`].
//!
//! ## Features
//!
//! - Sign up, sign in (email/password and anonymous) and sign out
//! - Email verification, password reset, password and display name updates
//! - Account deletion and profile reload
//! - Cached ID token with refresh through the Secure Token API
//! - In-memory backend for tests and offline tools, REST backend for the
//!   hosted Identity Toolkit API
//!
//! ## References
//!
//! - Identity Toolkit REST API: <https://firebase.google.com/docs/reference/rest/auth>
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
//! let auth = session.auth();
//! let result = auth.sign_up_with_email_async("ada@example.com", "secret1").await?;
//! println!("signed up {} with token {}", result.user_id, result.auth_token);
//! assert_eq!(auth.current_user_id(), result.user_id);
//! # Ok(())
//! # }
//! ```

mod api;
mod backend;
mod error;
mod memory;
pub(crate) mod model;
mod rest;
mod token_manager;

#[doc(inline)]
pub use api::Auth;

#[doc(inline)]
pub use backend::AuthBackend;

#[doc(inline)]
pub use error::{AuthError, AuthResult};

#[doc(inline)]
pub use memory::{EmailKind, InMemoryAuthBackend, SentEmail};

#[doc(inline)]
pub use model::{AccountUpdate, CurrentUser, SignedInUser, TokenGrant, UserProfile};

#[doc(inline)]
pub use rest::RestAuthBackend;

#[doc(inline)]
pub use token_manager::TokenManager;
