use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::auth::backend::AuthBackend;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{AccountUpdate, SignedInUser, TokenGrant, UserProfile};

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

const INVALID_EMAIL: &str = "The email address is badly formatted.";
const WEAK_PASSWORD: &str =
    "The given password is invalid. [ Password should be at least 6 characters ]";
const EMAIL_EXISTS: &str = "The email address is already in use by another account.";
const WRONG_PASSWORD: &str = "The password is invalid or the user does not have a password.";
const USER_NOT_FOUND: &str =
    "There is no user record corresponding to this identifier. The user may have been deleted.";
const INVALID_TOKEN: &str =
    "The user's credential is no longer valid. The user must sign in again.";
const TOKEN_SERVICE_DOWN: &str = "Token service unavailable";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

/// An email the in-memory backend would have sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentEmail {
    pub kind: EmailKind,
    pub to: String,
}

#[derive(Clone, Debug)]
struct Account {
    uid: String,
    email: String,
    password: String,
    display_name: String,
    email_verified: bool,
    is_anonymous: bool,
}

struct State {
    accounts: HashMap<String, Account>,
    uids_by_email: HashMap<String, String>,
    id_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    outbox: Vec<SentEmail>,
    token_service_available: bool,
}

/// Process-local identity provider with Firebase-style validation messages.
pub struct InMemoryAuthBackend {
    state: Mutex<State>,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                uids_by_email: HashMap::new(),
                id_tokens: HashMap::new(),
                refresh_tokens: HashMap::new(),
                outbox: Vec::new(),
                token_service_available: true,
            }),
        }
    }

    /// Emails queued by verification and password-reset requests.
    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.state.lock().unwrap().outbox.clone()
    }

    /// Marks an account's address as verified, as clicking the emailed link would.
    pub fn mark_email_verified(&self, email: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(uid) = state.uids_by_email.get(&normalize_email(email)).cloned() else {
            return false;
        };
        match state.accounts.get_mut(&uid) {
            Some(account) => {
                account.email_verified = true;
                true
            }
            None => false,
        }
    }

    /// While unavailable, sign-ins issue only refresh tokens and refreshes fail.
    pub fn set_token_service_available(&self, available: bool) {
        self.state.lock().unwrap().token_service_available = available;
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }

    fn issue(state: &mut State, account: &Account) -> SignedInUser {
        let refresh_token = random_token("refresh");
        state
            .refresh_tokens
            .insert(refresh_token.clone(), account.uid.clone());
        let tokens = if state.token_service_available {
            let id_token = random_token("id");
            state.id_tokens.insert(id_token.clone(), account.uid.clone());
            TokenGrant {
                id_token,
                refresh_token,
                expires_in: Some(TOKEN_LIFETIME),
            }
        } else {
            TokenGrant {
                refresh_token,
                ..Default::default()
            }
        };
        SignedInUser {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            email_verified: account.email_verified,
            is_anonymous: account.is_anonymous,
            tokens,
        }
    }

    fn account_for_token<'a>(state: &'a mut State, id_token: &str) -> AuthResult<&'a mut Account> {
        let uid = state
            .id_tokens
            .get(id_token)
            .cloned()
            .ok_or_else(|| AuthError::Backend(INVALID_TOKEN.into()))?;
        state
            .accounts
            .get_mut(&uid)
            .ok_or_else(|| AuthError::Backend(USER_NOT_FOUND.into()))
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignedInUser> {
        validate_email(email)?;
        validate_password(password)?;
        let mut state = self.state.lock().unwrap();
        let key = normalize_email(email);
        if state.uids_by_email.contains_key(&key) {
            return Err(AuthError::Backend(EMAIL_EXISTS.into()));
        }
        let account = Account {
            uid: random_uid(),
            email: email.trim().to_string(),
            password: password.to_string(),
            display_name: String::new(),
            email_verified: false,
            is_anonymous: false,
        };
        state.uids_by_email.insert(key, account.uid.clone());
        state.accounts.insert(account.uid.clone(), account.clone());
        Ok(Self::issue(&mut state, &account))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignedInUser> {
        validate_email(email)?;
        let mut state = self.state.lock().unwrap();
        let account = state
            .uids_by_email
            .get(&normalize_email(email))
            .and_then(|uid| state.accounts.get(uid))
            .cloned()
            .ok_or_else(|| AuthError::Backend(USER_NOT_FOUND.into()))?;
        if account.password != password {
            return Err(AuthError::Backend(WRONG_PASSWORD.into()));
        }
        Ok(Self::issue(&mut state, &account))
    }

    async fn sign_in_anonymously(&self) -> AuthResult<SignedInUser> {
        let mut state = self.state.lock().unwrap();
        let account = Account {
            uid: random_uid(),
            email: String::new(),
            password: String::new(),
            display_name: String::new(),
            email_verified: false,
            is_anonymous: true,
        };
        state.accounts.insert(account.uid.clone(), account.clone());
        Ok(Self::issue(&mut state, &account))
    }

    async fn refresh_id_token(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let mut state = self.state.lock().unwrap();
        if !state.token_service_available {
            return Err(AuthError::Network(TOKEN_SERVICE_DOWN.into()));
        }
        let uid = state
            .refresh_tokens
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| AuthError::Backend(INVALID_TOKEN.into()))?;
        if !state.accounts.contains_key(&uid) {
            return Err(AuthError::Backend(USER_NOT_FOUND.into()));
        }
        let id_token = random_token("id");
        state.id_tokens.insert(id_token.clone(), uid);
        Ok(TokenGrant {
            id_token,
            refresh_token: refresh_token.to_string(),
            expires_in: Some(TOKEN_LIFETIME),
        })
    }

    async fn lookup(&self, id_token: &str) -> AuthResult<UserProfile> {
        let mut state = self.state.lock().unwrap();
        let account = Self::account_for_token(&mut state, id_token)?;
        Ok(UserProfile {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            email_verified: account.email_verified,
        })
    }

    async fn send_email_verification(&self, id_token: &str) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        let email = Self::account_for_token(&mut state, id_token)?.email.clone();
        if email.is_empty() {
            return Err(AuthError::Backend(INVALID_EMAIL.into()));
        }
        state.outbox.push(SentEmail {
            kind: EmailKind::Verification,
            to: email,
        });
        Ok(())
    }

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        validate_email(email)?;
        let mut state = self.state.lock().unwrap();
        if !state.uids_by_email.contains_key(&normalize_email(email)) {
            return Err(AuthError::Backend(USER_NOT_FOUND.into()));
        }
        state.outbox.push(SentEmail {
            kind: EmailKind::PasswordReset,
            to: email.trim().to_string(),
        });
        Ok(())
    }

    async fn update_password(&self, id_token: &str, new_password: &str) -> AuthResult<AccountUpdate> {
        validate_password(new_password)?;
        let mut state = self.state.lock().unwrap();
        let account = Self::account_for_token(&mut state, id_token)?;
        account.password = new_password.to_string();
        let account = account.clone();
        // Credential changes revoke every outstanding token for the account.
        state.id_tokens.retain(|_, uid| *uid != account.uid);
        state.refresh_tokens.retain(|_, uid| *uid != account.uid);
        let issued = Self::issue(&mut state, &account);
        Ok(AccountUpdate {
            email: Some(issued.email),
            display_name: None,
            tokens: Some(issued.tokens),
        })
    }

    async fn update_display_name(&self, id_token: &str, display_name: &str) -> AuthResult<AccountUpdate> {
        let mut state = self.state.lock().unwrap();
        let account = Self::account_for_token(&mut state, id_token)?;
        account.display_name = display_name.to_string();
        Ok(AccountUpdate {
            email: Some(account.email.clone()),
            display_name: Some(account.display_name.clone()),
            tokens: None,
        })
    }

    async fn delete_account(&self, id_token: &str) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        let uid = Self::account_for_token(&mut state, id_token)?.uid.clone();
        if let Some(account) = state.accounts.remove(&uid) {
            state.uids_by_email.remove(&normalize_email(&account.email));
        }
        state.id_tokens.retain(|_, owner| *owner != uid);
        state.refresh_tokens.retain(|_, owner| *owner != uid);
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AuthError::Backend(INVALID_EMAIL.into()))
    }
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Backend(WEAK_PASSWORD.into()));
    }
    Ok(())
}

fn random_uid() -> String {
    random_string(28)
}

fn random_token(prefix: &str) -> String {
    format!("{prefix}.{}", random_string(40))
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
