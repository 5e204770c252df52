//! Identity Toolkit and Secure Token REST clients.

mod account;
mod token;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::app::BridgeSettings;
use crate::auth::backend::AuthBackend;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{AccountUpdate, SignedInUser, TokenGrant, UserProfile};

use account::UpdateAccountRequest;

/// [`AuthBackend`] that talks to the hosted Firebase Auth REST API.
pub struct RestAuthBackend {
    client: Client,
    api_key: String,
    identity_toolkit_endpoint: String,
    secure_token_endpoint: String,
}

impl RestAuthBackend {
    pub fn new(
        api_key: impl Into<String>,
        identity_toolkit_endpoint: impl Into<String>,
        secure_token_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            identity_toolkit_endpoint: identity_toolkit_endpoint.into(),
            secure_token_endpoint: secure_token_endpoint.into(),
        })
    }

    pub fn from_settings(settings: &BridgeSettings) -> AuthResult<Self> {
        Self::new(
            settings.api_key.clone(),
            settings.identity_toolkit_endpoint(),
            settings.secure_token_endpoint(),
            settings.network_timeout(),
        )
    }

    fn endpoint(&self) -> &str {
        &self.identity_toolkit_endpoint
    }
}

#[async_trait]
impl AuthBackend for RestAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignedInUser> {
        let response = account::sign_up(
            &self.client,
            self.endpoint(),
            &self.api_key,
            Some(email),
            Some(password),
        )
        .await?;
        Ok(response.into_user(false))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignedInUser> {
        let response = account::sign_in_with_password(
            &self.client,
            self.endpoint(),
            &self.api_key,
            email,
            password,
        )
        .await?;
        Ok(response.into_user(false))
    }

    async fn sign_in_anonymously(&self) -> AuthResult<SignedInUser> {
        let response =
            account::sign_up(&self.client, self.endpoint(), &self.api_key, None, None).await?;
        Ok(response.into_user(true))
    }

    async fn refresh_id_token(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let response = token::refresh_id_token(
            &self.client,
            &self.secure_token_endpoint,
            &self.api_key,
            refresh_token,
        )
        .await?;
        Ok(response.into())
    }

    async fn lookup(&self, id_token: &str) -> AuthResult<UserProfile> {
        account::get_account_info(&self.client, self.endpoint(), &self.api_key, id_token).await
    }

    async fn send_email_verification(&self, id_token: &str) -> AuthResult<()> {
        account::send_email_verification(&self.client, self.endpoint(), &self.api_key, id_token)
            .await
    }

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        account::send_password_reset_email(&self.client, self.endpoint(), &self.api_key, email)
            .await
    }

    async fn update_password(&self, id_token: &str, new_password: &str) -> AuthResult<AccountUpdate> {
        let request = UpdateAccountRequest {
            id_token,
            password: Some(new_password),
            ..Default::default()
        };
        let response =
            account::update_account(&self.client, self.endpoint(), &self.api_key, &request).await?;
        Ok(response.into())
    }

    async fn update_display_name(&self, id_token: &str, display_name: &str) -> AuthResult<AccountUpdate> {
        let request = UpdateAccountRequest {
            id_token,
            display_name: Some(display_name),
            ..Default::default()
        };
        let response =
            account::update_account(&self.client, self.endpoint(), &self.api_key, &request).await?;
        Ok(response.into())
    }

    async fn delete_account(&self, id_token: &str) -> AuthResult<()> {
        account::delete_account(&self.client, self.endpoint(), &self.api_key, id_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;

    const TEST_API_KEY: &str = "test-api-key";

    fn backend(server: &MockServer) -> RestAuthBackend {
        RestAuthBackend::new(
            TEST_API_KEY,
            server.url("/v1"),
            server.url("/token"),
            Duration::from_secs(5),
        )
        .expect("rest auth backend")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_in_with_password_parses_user() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:signInWithPassword")
                .query_param("key", TEST_API_KEY)
                .json_body(json!({
                    "email": "user@example.com",
                    "password": "secret",
                    "returnSecureToken": true
                }));
            then.status(200).json_body(json!({
                "localId": "uid-123",
                "email": "user@example.com",
                "displayName": "User",
                "idToken": "id-token",
                "refreshToken": "refresh-token",
                "expiresIn": "3600"
            }));
        });

        let user = backend(&server)
            .sign_in_with_password("user@example.com", "secret")
            .await
            .expect("sign-in should succeed");

        mock.assert();
        assert_eq!(user.uid, "uid-123");
        assert_eq!(user.display_name, "User");
        assert_eq!(user.tokens.id_token, "id-token");
        assert_eq!(user.tokens.expires_in, Some(Duration::from_secs(3600)));
        assert!(!user.is_anonymous);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn anonymous_sign_up_sends_no_credentials() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:signUp")
                .json_body(json!({ "returnSecureToken": true }));
            then.status(200).json_body(json!({
                "localId": "anon-uid",
                "idToken": "anon-token",
                "refreshToken": "anon-refresh",
                "expiresIn": "3600"
            }));
        });

        let user = backend(&server).sign_in_anonymously().await.unwrap();

        mock.assert();
        assert!(user.is_anonymous);
        assert_eq!(user.uid, "anon-uid");
        assert_eq!(user.email, "");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn backend_error_message_is_passed_through() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/accounts:signUp");
            then.status(400)
                .json_body(json!({ "error": { "code": 400, "message": "EMAIL_EXISTS" } }));
        });

        let err = backend(&server)
            .sign_up("user@example.com", "secret")
            .await
            .unwrap_err();

        mock.assert();
        assert_eq!(err.to_string(), "EMAIL_EXISTS");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn oob_codes_use_request_types() {
        let server = start_mock_server();
        let verify = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:sendOobCode")
                .json_body(json!({ "requestType": "VERIFY_EMAIL", "idToken": "id-token" }));
            then.status(200).json_body(json!({ "email": "user@example.com" }));
        });
        let reset = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:sendOobCode")
                .json_body(json!({ "requestType": "PASSWORD_RESET", "email": "user@example.com" }));
            then.status(200).json_body(json!({ "email": "user@example.com" }));
        });

        let backend = backend(&server);
        backend.send_email_verification("id-token").await.unwrap();
        backend
            .send_password_reset_email("user@example.com")
            .await
            .unwrap();

        verify.assert();
        reset.assert();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_password_returns_new_tokens() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:update")
                .json_body(json!({
                    "idToken": "id-token",
                    "password": "new-secret",
                    "returnSecureToken": true
                }));
            then.status(200).json_body(json!({
                "localId": "uid-123",
                "email": "user@example.com",
                "idToken": "updated-id-token",
                "refreshToken": "updated-refresh-token",
                "expiresIn": "3600"
            }));
        });

        let update = backend(&server)
            .update_password("id-token", "new-secret")
            .await
            .unwrap();

        mock.assert();
        let tokens = update.tokens.expect("tokens");
        assert_eq!(tokens.id_token, "updated-id-token");
        assert_eq!(tokens.refresh_token, "updated-refresh-token");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn clearing_display_name_deletes_attribute() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:update")
                .json_body(json!({
                    "idToken": "id-token",
                    "deleteAttribute": ["DISPLAY_NAME"],
                    "returnSecureToken": true
                }));
            then.status(200).json_body(json!({ "localId": "uid-123" }));
        });

        let update = backend(&server)
            .update_display_name("id-token", "")
            .await
            .unwrap();

        mock.assert();
        assert!(update.tokens.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lookup_reads_first_user() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:lookup")
                .json_body(json!({ "idToken": "id-token" }));
            then.status(200).json_body(json!({
                "users": [{
                    "localId": "uid-123",
                    "email": "user@example.com",
                    "displayName": "User",
                    "emailVerified": true
                }]
            }));
        });

        let profile = backend(&server).lookup("id-token").await.unwrap();

        mock.assert();
        assert_eq!(profile.uid, "uid-123");
        assert!(profile.email_verified);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn delete_account_posts_id_token() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/accounts:delete")
                .json_body(json!({ "idToken": "id-token" }));
            then.status(200).json_body(json!({}));
        });

        backend(&server).delete_account("id-token").await.unwrap();
        mock.assert();
    }
}
