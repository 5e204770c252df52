use async_trait::async_trait;

use crate::auth::error::AuthResult;
use crate::auth::model::{AccountUpdate, SignedInUser, TokenGrant, UserProfile};

/// Identity provider behind the [`Auth`](crate::auth::Auth) façade.
///
/// Errors carry the backend's own message, which is what hosts display.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignedInUser>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignedInUser>;

    async fn sign_in_anonymously(&self) -> AuthResult<SignedInUser>;

    /// Exchanges a refresh token for a fresh ID token.
    async fn refresh_id_token(&self, refresh_token: &str) -> AuthResult<TokenGrant>;

    async fn lookup(&self, id_token: &str) -> AuthResult<UserProfile>;

    async fn send_email_verification(&self, id_token: &str) -> AuthResult<()>;

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()>;

    async fn update_password(&self, id_token: &str, new_password: &str) -> AuthResult<AccountUpdate>;

    async fn update_display_name(&self, id_token: &str, display_name: &str) -> AuthResult<AccountUpdate>;

    async fn delete_account(&self, id_token: &str) -> AuthResult<()>;
}
