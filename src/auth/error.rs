use std::fmt;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Message reported by the identity backend, passed through verbatim.
    Backend(String),
    Network(String),
    InvalidResponse(String),
    NotInitialized,
    Disabled,
    NoCurrentUser,
    NotImplemented(&'static str),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Backend(message) => f.write_str(message),
            AuthError::Network(message) => write!(f, "Network error: {message}"),
            AuthError::InvalidResponse(message) => write!(f, "Invalid auth response: {message}"),
            AuthError::NotInitialized => f.write_str("Firebase not initialized"),
            AuthError::Disabled => f.write_str("Authentication is not enabled"),
            AuthError::NoCurrentUser => f.write_str("No user signed in"),
            AuthError::NotImplemented(feature) => write!(f, "{feature} not yet implemented"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_errors_use_host_facing_text() {
        assert_eq!(AuthError::NotInitialized.to_string(), "Firebase not initialized");
        assert_eq!(AuthError::NoCurrentUser.to_string(), "No user signed in");
        assert_eq!(
            AuthError::NotImplemented("Google Sign-In").to_string(),
            "Google Sign-In not yet implemented"
        );
        assert_eq!(
            AuthError::Backend("EMAIL_EXISTS".into()).to_string(),
            "EMAIL_EXISTS"
        );
    }
}
