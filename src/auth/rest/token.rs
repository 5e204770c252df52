use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::TokenGrant;
use crate::auth::rest::account::extract_error_message;

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshTokenResponse {
    #[serde(rename = "id_token")]
    pub id_token: String,
    #[serde(rename = "refresh_token")]
    pub refresh_token: String,
    #[serde(rename = "expires_in", default)]
    pub expires_in: Option<String>,
}

impl From<RefreshTokenResponse> for TokenGrant {
    fn from(response: RefreshTokenResponse) -> Self {
        TokenGrant {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_in: TokenGrant::parse_expires_in(response.expires_in.as_deref()),
        }
    }
}

/// Exchanges a refresh token for a fresh ID token at the Secure Token API.
pub(crate) async fn refresh_id_token(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    refresh_token: &str,
) -> AuthResult<RefreshTokenResponse> {
    let url = format!("{}?key={}", endpoint.trim_end_matches('/'), api_key);
    let request = RefreshTokenRequest {
        grant_type: "refresh_token",
        refresh_token,
    };

    let response = client
        .post(url)
        .form(&request)
        .send()
        .await
        .map_err(|err| AuthError::Network(err.to_string()))?;

    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))
    } else {
        let body = response.text().await.unwrap_or_else(|_| "{}".to_string());
        Err(map_refresh_error(status, &body))
    }
}

fn map_refresh_error(status: StatusCode, body: &str) -> AuthError {
    match extract_error_message(body) {
        Some(message) => AuthError::Backend(message),
        None => AuthError::Network(format!("Token refresh failed with status {status}")),
    }
}
