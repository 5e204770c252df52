use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{AccountUpdate, SignedInUser, TokenGrant, UserProfile};

pub(crate) fn identity_toolkit_url(base: &str, path: &str, api_key: &str) -> String {
    format!("{}/{}?key={}", base.trim_end_matches('/'), path, api_key)
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    #[serde(rename = "email", skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct SignInWithPasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignInResponse {
    #[serde(rename = "localId")]
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "idToken", default)]
    pub id_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "expiresIn", default)]
    pub expires_in: Option<String>,
}

impl SignInResponse {
    pub(crate) fn into_user(self, is_anonymous: bool) -> SignedInUser {
        SignedInUser {
            uid: self.local_id,
            email: self.email.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
            email_verified: false,
            is_anonymous,
            tokens: TokenGrant {
                id_token: self.id_token.unwrap_or_default(),
                refresh_token: self.refresh_token.unwrap_or_default(),
                expires_in: TokenGrant::parse_expires_in(self.expires_in.as_deref()),
            },
        }
    }
}

/// Creates an email/password account, or an anonymous one when no
/// credentials are given.
pub(crate) async fn sign_up(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    email: Option<&str>,
    password: Option<&str>,
) -> AuthResult<SignInResponse> {
    let request = SignUpRequest {
        email,
        password,
        return_secure_token: true,
    };
    post_json(client, &identity_toolkit_url(endpoint, "accounts:signUp", api_key), &request).await
}

pub(crate) async fn sign_in_with_password(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    email: &str,
    password: &str,
) -> AuthResult<SignInResponse> {
    let request = SignInWithPasswordRequest {
        email,
        password,
        return_secure_token: true,
    };
    let url = identity_toolkit_url(endpoint, "accounts:signInWithPassword", api_key);
    post_json(client, &url, &request).await
}

#[derive(Debug, Serialize)]
struct SendOobCodeRequest<'a> {
    #[serde(rename = "requestType")]
    request_type: &'static str,
    #[serde(rename = "email", skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(rename = "idToken", skip_serializing_if = "Option::is_none")]
    id_token: Option<&'a str>,
}

pub(crate) async fn send_password_reset_email(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    email: &str,
) -> AuthResult<()> {
    let request = SendOobCodeRequest {
        request_type: "PASSWORD_RESET",
        email: Some(email),
        id_token: None,
    };
    send_oob_code(client, endpoint, api_key, &request).await
}

pub(crate) async fn send_email_verification(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    id_token: &str,
) -> AuthResult<()> {
    let request = SendOobCodeRequest {
        request_type: "VERIFY_EMAIL",
        email: None,
        id_token: Some(id_token),
    };
    send_oob_code(client, endpoint, api_key, &request).await
}

async fn send_oob_code(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    request: &SendOobCodeRequest<'_>,
) -> AuthResult<()> {
    let url = identity_toolkit_url(endpoint, "accounts:sendOobCode", api_key);
    post_unit(client, &url, request).await
}

#[derive(Debug, Default)]
pub(crate) struct UpdateAccountRequest<'a> {
    pub id_token: &'a str,
    pub password: Option<&'a str>,
    pub display_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateAccountRequestBody<'a> {
    #[serde(rename = "idToken")]
    id_token: &'a str,
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(rename = "deleteAttribute", skip_serializing_if = "Vec::is_empty")]
    delete_attribute: Vec<&'static str>,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateAccountResponse {
    #[serde(rename = "idToken", default)]
    pub id_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "expiresIn", default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

impl From<UpdateAccountResponse> for AccountUpdate {
    fn from(response: UpdateAccountResponse) -> Self {
        let tokens = response.id_token.filter(|token| !token.is_empty()).map(|id_token| {
            TokenGrant {
                id_token,
                refresh_token: response.refresh_token.unwrap_or_default(),
                expires_in: TokenGrant::parse_expires_in(response.expires_in.as_deref()),
            }
        });
        AccountUpdate {
            email: response.email,
            display_name: response.display_name,
            tokens,
        }
    }
}

pub(crate) async fn update_account(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    params: &UpdateAccountRequest<'_>,
) -> AuthResult<UpdateAccountResponse> {
    // An empty display name clears the attribute rather than storing "".
    let mut delete_attribute = Vec::new();
    let display_name = match params.display_name {
        Some("") => {
            delete_attribute.push("DISPLAY_NAME");
            None
        }
        other => other,
    };
    let request = UpdateAccountRequestBody {
        id_token: params.id_token,
        password: params.password,
        display_name,
        delete_attribute,
        return_secure_token: true,
    };
    post_json(client, &identity_toolkit_url(endpoint, "accounts:update", api_key), &request).await
}

#[derive(Debug, Serialize)]
struct IdTokenRequest<'a> {
    #[serde(rename = "idToken")]
    id_token: &'a str,
}

pub(crate) async fn delete_account(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    id_token: &str,
) -> AuthResult<()> {
    let url = identity_toolkit_url(endpoint, "accounts:delete", api_key);
    post_unit(client, &url, &IdTokenRequest { id_token }).await
}

#[derive(Debug, Deserialize)]
struct GetAccountInfoResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "emailVerified", default)]
    email_verified: bool,
}

pub(crate) async fn get_account_info(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    id_token: &str,
) -> AuthResult<UserProfile> {
    let url = identity_toolkit_url(endpoint, "accounts:lookup", api_key);
    let response: GetAccountInfoResponse = post_json(client, &url, &IdTokenRequest { id_token }).await?;
    let info = response
        .users
        .into_iter()
        .next()
        .ok_or_else(|| AuthError::Backend("USER_NOT_FOUND".into()))?;
    Ok(UserProfile {
        uid: info.local_id,
        email: info.email.unwrap_or_default(),
        display_name: info.display_name.unwrap_or_default(),
        email_verified: info.email_verified,
    })
}

async fn post_json<B, T>(client: &Client, url: &str, body: &B) -> AuthResult<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| AuthError::Network(err.to_string()))?;

    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, body))
    }
}

async fn post_unit<B>(client: &Client, url: &str, body: &B) -> AuthResult<()>
where
    B: Serialize + ?Sized,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| AuthError::Network(err.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, body))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|error| error.message)
}

fn map_error(status: StatusCode, body: String) -> AuthError {
    match extract_error_message(&body) {
        Some(message) => AuthError::Backend(message),
        None => AuthError::Backend(format!("Request failed with status {status}: {body}")),
    }
}
