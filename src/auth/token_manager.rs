use std::cmp::Ordering;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::auth::model::TokenGrant;

#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiration_time: Option<SystemTime>,
}

/// ID and refresh tokens of the signed-in user.
#[derive(Debug, Default)]
pub struct TokenManager {
    state: Mutex<TokenState>,
}

impl Clone for TokenManager {
    fn clone(&self) -> Self {
        let state = self.state.lock().unwrap().clone();
        Self {
            state: Mutex::new(state),
        }
    }
}

impl TokenManager {
    pub fn from_grant(grant: &TokenGrant) -> Self {
        let manager = Self::default();
        manager.apply(grant);
        manager
    }

    /// Stores the non-empty parts of `grant`.
    pub fn apply(&self, grant: &TokenGrant) {
        let mut state = self.state.lock().unwrap();
        if !grant.id_token.is_empty() {
            state.access_token = Some(grant.id_token.clone());
            state.expiration_time = grant
                .expires_in
                .and_then(|expires_in| SystemTime::now().checked_add(expires_in));
        }
        if !grant.refresh_token.is_empty() {
            state.refresh_token = Some(grant.refresh_token.clone());
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = TokenState::default();
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.lock().unwrap().refresh_token.clone()
    }

    pub fn expiration_time(&self) -> Option<SystemTime> {
        self.state.lock().unwrap().expiration_time
    }

    /// True when there is no ID token or it expires within `tolerance`.
    pub fn should_refresh(&self, tolerance: Duration) -> bool {
        let state = self.state.lock().unwrap();
        if state.access_token.is_none() {
            return true;
        }
        match state.expiration_time {
            None => false,
            Some(expiration) => {
                let now = SystemTime::now();
                let threshold = now.checked_add(tolerance).unwrap_or(now);
                matches!(expiration.cmp(&threshold), Ordering::Less | Ordering::Equal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(id: &str, refresh: &str, expires: Option<u64>) -> TokenGrant {
        TokenGrant {
            id_token: id.into(),
            refresh_token: refresh.into(),
            expires_in: expires.map(Duration::from_secs),
        }
    }

    #[test]
    fn empty_parts_do_not_overwrite() {
        let manager = TokenManager::from_grant(&grant("id-1", "refresh-1", Some(3600)));
        manager.apply(&grant("", "refresh-2", None));
        assert_eq!(manager.access_token().as_deref(), Some("id-1"));
        assert_eq!(manager.refresh_token().as_deref(), Some("refresh-2"));
    }

    #[test]
    fn refresh_needed_when_missing_or_expiring() {
        assert!(TokenManager::default().should_refresh(Duration::ZERO));

        let fresh = TokenManager::from_grant(&grant("id", "r", Some(3600)));
        assert!(!fresh.should_refresh(Duration::from_secs(300)));

        let expiring = TokenManager::from_grant(&grant("id", "r", Some(60)));
        assert!(expiring.should_refresh(Duration::from_secs(300)));

        let no_expiry = TokenManager::from_grant(&grant("id", "r", None));
        assert!(!no_expiry.should_refresh(Duration::from_secs(300)));

        fresh.clear();
        assert!(fresh.access_token().is_none());
    }
}
