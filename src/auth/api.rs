use std::future::Future;
use std::sync::{Arc, LazyLock};

use crate::auth::backend::AuthBackend;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{CurrentUser, SignedInUser};
use crate::logger::Logger;
use crate::relay::AuthOperationResult;
use crate::session::Session;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/auth"));

const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Guard {
    Initialized,
    SignedIn,
}

/// Authentication façade bound to a [`Session`].
///
/// Each operation comes in two forms. The plain form checks its
/// preconditions, spawns the work on the session's executor and reports
/// exactly one [`AuthOperationResult`] through the session's relay, tagged
/// with the caller's `op_id`. Precondition failures are reported before the
/// call returns. The `_async` form performs the same work inline and returns
/// the result to the caller instead.
#[derive(Clone, Debug)]
pub struct Auth {
    session: Session,
}

impl Auth {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn sign_up_with_email(&self, email: &str, password: &str, op_id: Option<&str>) {
        let (email, password) = (email.to_owned(), password.to_owned());
        self.dispatch(op_id, Guard::Initialized, move |auth| async move {
            auth.sign_up_with_email_async(&email, &password).await
        });
    }

    pub async fn sign_up_with_email_async(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthOperationResult> {
        let backend = self.session.auth_backend()?;
        let user = backend.sign_up(email, password).await.inspect_err(|err| {
            LOGGER.error(format!("Sign up failed: {err}"));
        })?;
        LOGGER.info("User signed up successfully");
        Ok(self.complete_sign_in(&backend, user).await)
    }

    pub fn sign_in_with_email(&self, email: &str, password: &str, op_id: Option<&str>) {
        let (email, password) = (email.to_owned(), password.to_owned());
        self.dispatch(op_id, Guard::Initialized, move |auth| async move {
            auth.sign_in_with_email_async(&email, &password).await
        });
    }

    pub async fn sign_in_with_email_async(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthOperationResult> {
        let backend = self.session.auth_backend()?;
        let user = backend
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|err| LOGGER.error(format!("Sign in failed: {err}")))?;
        LOGGER.info("User signed in successfully");
        Ok(self.complete_sign_in(&backend, user).await)
    }

    pub fn sign_in_anonymously(&self, op_id: Option<&str>) {
        self.dispatch(op_id, Guard::Initialized, |auth| async move {
            auth.sign_in_anonymously_async().await
        });
    }

    pub async fn sign_in_anonymously_async(&self) -> AuthResult<AuthOperationResult> {
        let backend = self.session.auth_backend()?;
        let user = backend
            .sign_in_anonymously()
            .await
            .inspect_err(|err| LOGGER.error(format!("Anonymous sign in failed: {err}")))?;
        LOGGER.info("Anonymous sign in successful");
        let mut result = self.complete_sign_in(&backend, user).await;
        result.display_name = ANONYMOUS_DISPLAY_NAME.to_string();
        Ok(result)
    }

    /// Google sign-in has no native flow here; the result is always a
    /// failure, reported before the call returns.
    pub fn sign_in_with_google(&self, op_id: Option<&str>) {
        let err = AuthError::NotImplemented("Google Sign-In");
        LOGGER.warn(err.to_string());
        self.session
            .relay()
            .auth_result(op_id, AuthOperationResult::failure(err.to_string()));
    }

    pub async fn sign_in_with_google_async(&self) -> AuthResult<AuthOperationResult> {
        Err(AuthError::NotImplemented("Google Sign-In"))
    }

    pub fn send_email_verification(&self, op_id: Option<&str>) {
        self.dispatch(op_id, Guard::SignedIn, |auth| async move {
            auth.send_email_verification_async().await
        });
    }

    pub async fn send_email_verification_async(&self) -> AuthResult<AuthOperationResult> {
        let (backend, user) = self.signed_in_user().await?;
        backend
            .send_email_verification(&user.id_token())
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to send verification email: {err}")))?;
        LOGGER.info("Verification email sent");
        Ok(AuthOperationResult {
            user_id: user.uid().to_string(),
            email: user.email().to_string(),
            ..AuthOperationResult::succeeded()
        }
        .with_message("Verification email sent"))
    }

    pub fn send_password_reset_email(&self, email: &str, op_id: Option<&str>) {
        let email = email.to_owned();
        self.dispatch(op_id, Guard::Initialized, move |auth| async move {
            auth.send_password_reset_email_async(&email).await
        });
    }

    pub async fn send_password_reset_email_async(
        &self,
        email: &str,
    ) -> AuthResult<AuthOperationResult> {
        let backend = self.session.auth_backend()?;
        backend
            .send_password_reset_email(email)
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to send password reset email: {err}")))?;
        LOGGER.info("Password reset email sent");
        Ok(AuthOperationResult {
            email: email.to_string(),
            ..AuthOperationResult::succeeded()
        }
        .with_message("Password reset email sent"))
    }

    pub fn update_password(&self, new_password: &str, op_id: Option<&str>) {
        let new_password = new_password.to_owned();
        self.dispatch(op_id, Guard::SignedIn, move |auth| async move {
            auth.update_password_async(&new_password).await
        });
    }

    pub async fn update_password_async(
        &self,
        new_password: &str,
    ) -> AuthResult<AuthOperationResult> {
        let (backend, user) = self.signed_in_user().await?;
        let update = backend
            .update_password(&user.id_token(), new_password)
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to update password: {err}")))?;
        let user = self
            .session
            .update_current_user(user.uid(), |current| current.apply_update(&update))
            .unwrap_or(user);
        LOGGER.info("Password updated");
        Ok(AuthOperationResult {
            user_id: user.uid().to_string(),
            email: user.email().to_string(),
            ..AuthOperationResult::succeeded()
        }
        .with_message("Password updated"))
    }

    pub fn update_display_name(&self, display_name: &str, op_id: Option<&str>) {
        let display_name = display_name.to_owned();
        self.dispatch(op_id, Guard::SignedIn, move |auth| async move {
            auth.update_display_name_async(&display_name).await
        });
    }

    pub async fn update_display_name_async(
        &self,
        display_name: &str,
    ) -> AuthResult<AuthOperationResult> {
        let (backend, user) = self.signed_in_user().await?;
        let mut update = backend
            .update_display_name(&user.id_token(), display_name)
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to update display name: {err}")))?;
        update.display_name = Some(display_name.to_string());
        let user = self
            .session
            .update_current_user(user.uid(), |current| current.apply_update(&update))
            .unwrap_or(user);
        LOGGER.info("Display name updated");
        Ok(AuthOperationResult {
            user_id: user.uid().to_string(),
            email: user.email().to_string(),
            display_name: display_name.to_string(),
            ..AuthOperationResult::succeeded()
        })
    }

    pub fn delete_user_account(&self, op_id: Option<&str>) {
        self.dispatch(op_id, Guard::SignedIn, |auth| async move {
            auth.delete_user_account_async().await
        });
    }

    pub async fn delete_user_account_async(&self) -> AuthResult<AuthOperationResult> {
        let (backend, user) = self.signed_in_user().await?;
        backend
            .delete_account(&user.id_token())
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to delete account: {err}")))?;
        self.session.clear_current_user(user.uid());
        LOGGER.info("User account deleted");
        Ok(AuthOperationResult::succeeded().with_message("Account deleted"))
    }

    /// Re-reads the signed-in user's profile, picking up changes such as a
    /// verified email address.
    pub fn reload_user(&self, op_id: Option<&str>) {
        self.dispatch(op_id, Guard::SignedIn, |auth| async move {
            auth.reload_user_async().await
        });
    }

    pub async fn reload_user_async(&self) -> AuthResult<AuthOperationResult> {
        let (backend, user) = self.signed_in_user().await?;
        let profile = backend
            .lookup(&user.id_token())
            .await
            .inspect_err(|err| LOGGER.error(format!("Failed to reload user: {err}")))?;
        let user = self
            .session
            .update_current_user(user.uid(), |current| current.apply_profile(&profile))
            .unwrap_or(user);
        Ok(AuthOperationResult {
            user_id: user.uid().to_string(),
            email: user.email().to_string(),
            display_name: user.display_name().to_string(),
            auth_token: user.id_token(),
            ..AuthOperationResult::succeeded()
        })
    }

    pub fn sign_out(&self) {
        if !self.session.is_initialized() {
            return;
        }
        self.session.set_current_user(None);
        LOGGER.info("User signed out");
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.session.current_user()
    }

    pub fn is_user_signed_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn current_user_id(&self) -> String {
        self.current_user()
            .map(|user| user.uid().to_string())
            .unwrap_or_default()
    }

    pub fn current_user_email(&self) -> String {
        self.current_user()
            .map(|user| user.email().to_string())
            .unwrap_or_default()
    }

    pub fn current_user_display_name(&self) -> String {
        self.current_user()
            .map(|user| user.display_name().to_string())
            .unwrap_or_default()
    }

    /// Cached ID token of the signed-in user; empty when signed out.
    pub fn auth_token(&self) -> String {
        self.current_user()
            .map(|user| user.id_token())
            .unwrap_or_default()
    }

    pub fn is_email_verified(&self) -> bool {
        self.current_user()
            .is_some_and(|user| user.email_verified())
    }

    fn check(&self, guard: Guard) -> AuthResult<()> {
        self.session.auth_backend()?;
        if guard == Guard::SignedIn && self.session.current_user().is_none() {
            return Err(AuthError::NoCurrentUser);
        }
        Ok(())
    }

    fn dispatch<F, Fut>(&self, op_id: Option<&str>, guard: Guard, operation: F)
    where
        F: FnOnce(Auth) -> Fut,
        Fut: Future<Output = AuthResult<AuthOperationResult>> + Send + 'static,
    {
        if let Err(err) = self.check(guard) {
            LOGGER.warn(err.to_string());
            self.session
                .relay()
                .auth_result(op_id, AuthOperationResult::failure(err.to_string()));
            return;
        }

        let relay = self.session.relay_handle();
        let op_id = op_id.map(str::to_owned);
        let task = operation(self.clone());
        self.session.spawn(async move {
            let result = task
                .await
                .unwrap_or_else(|err| AuthOperationResult::failure(err.to_string()));
            relay.auth_result(op_id.as_deref(), result);
        });
    }

    async fn signed_in_user(&self) -> AuthResult<(Arc<dyn AuthBackend>, CurrentUser)> {
        let backend = self.session.auth_backend()?;
        self.session.refresh_token_if_needed().await;
        let user = self
            .session
            .current_user()
            .ok_or(AuthError::NoCurrentUser)?;
        Ok((backend, user))
    }

    /// Stores the new user and fetches its ID token. A failed token fetch
    /// still reports success, with an empty token.
    async fn complete_sign_in(
        &self,
        backend: &Arc<dyn AuthBackend>,
        user: SignedInUser,
    ) -> AuthOperationResult {
        let current = CurrentUser::from_sign_in(&user);
        let token = if !current.id_token().is_empty() {
            current.id_token()
        } else if let Some(refresh_token) = current.refresh_token() {
            match backend.refresh_id_token(&refresh_token).await {
                Ok(grant) => {
                    current.token_manager().apply(&grant);
                    current.id_token()
                }
                Err(err) => {
                    LOGGER.warn(format!("Signed in but failed to fetch ID token: {err}"));
                    String::new()
                }
            }
        } else {
            LOGGER.warn("Signed in without a refresh token; no ID token available");
            String::new()
        };

        let result = AuthOperationResult {
            user_id: current.uid().to_string(),
            email: current.email().to_string(),
            display_name: current.display_name().to_string(),
            auth_token: token,
            ..AuthOperationResult::succeeded()
        };
        self.session.set_current_user(Some(current));
        result
    }
}
