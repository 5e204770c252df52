use std::time::Duration;

use crate::auth::token_manager::TokenManager;

/// Tokens issued by a sign-in, refresh or credential change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenGrant {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<Duration>,
}

impl TokenGrant {
    pub(crate) fn parse_expires_in(raw: Option<&str>) -> Option<Duration> {
        raw.and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Account returned by a successful sign-in or sign-up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignedInUser {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub email_verified: bool,
    pub is_anonymous: bool,
    pub tokens: TokenGrant,
}

/// Profile fields reported by an account lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub email_verified: bool,
}

/// Result of a profile or credential change. Fields left `None` were not
/// reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub tokens: Option<TokenGrant>,
}

/// The user held by a session between sign-in and sign-out.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    uid: String,
    email: String,
    display_name: String,
    email_verified: bool,
    is_anonymous: bool,
    token_manager: TokenManager,
}

impl CurrentUser {
    pub(crate) fn from_sign_in(user: &SignedInUser) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            email_verified: user.email_verified,
            is_anonymous: user.is_anonymous,
            token_manager: TokenManager::from_grant(&user.tokens),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn is_anonymous(&self) -> bool {
        self.is_anonymous
    }

    /// Cached ID token, empty when none has been issued.
    pub fn id_token(&self) -> String {
        self.token_manager.access_token().unwrap_or_default()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.token_manager.refresh_token()
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    pub(crate) fn apply_profile(&mut self, profile: &UserProfile) {
        if !profile.email.is_empty() {
            self.email = profile.email.clone();
        }
        self.display_name = profile.display_name.clone();
        self.email_verified = profile.email_verified;
    }

    pub(crate) fn apply_update(&mut self, update: &AccountUpdate) {
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(display_name) = &update.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(tokens) = &update.tokens {
            self.token_manager.apply(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_parses_seconds() {
        assert_eq!(
            TokenGrant::parse_expires_in(Some("3600")),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(TokenGrant::parse_expires_in(Some("soon")), None);
        assert_eq!(TokenGrant::parse_expires_in(None), None);
    }

    #[test]
    fn updates_merge_into_current_user() {
        let mut user = CurrentUser::from_sign_in(&SignedInUser {
            uid: "uid-1".into(),
            email: "ada@example.com".into(),
            tokens: TokenGrant {
                id_token: "id-1".into(),
                refresh_token: "r-1".into(),
                expires_in: None,
            },
            ..Default::default()
        });

        user.apply_update(&AccountUpdate {
            display_name: Some("Ada".into()),
            tokens: Some(TokenGrant {
                id_token: "id-2".into(),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(user.display_name(), "Ada");
        assert_eq!(user.id_token(), "id-2");
        assert_eq!(user.refresh_token().as_deref(), Some("r-1"));
        assert_eq!(user.email(), "ada@example.com");
    }
}
