//! Platform administrator authentication.
//!
//! Admin routes present `Authorization: Bearer <key>`; keys are configured
//! under `admin.api_keys` and compared by SHA-256 hash.

mod authenticator;

pub use authenticator::AdminAuthenticator;

/// Identity of an authenticated administrator, recorded as the audit actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    /// Configured name of the key that authenticated the request
    pub key_name: String,
}

/// Authentication error with HTTP status code
#[derive(Debug, Clone)]
pub struct AuthError {
    /// HTTP status code (400, 401)
    pub status_code: u16,
    /// Error message for client
    pub message: String,
}

impl AuthError {
    /// Create a 400 Bad Request error (malformed Authorization header)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status_code: 400,
            message: message.into(),
        }
    }

    /// Create a 401 Unauthorized error (missing/invalid API key)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status_code: 401,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status_code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Extract the token of a `Bearer` Authorization header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::bad_request("Authorization header must use the Bearer scheme"))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::unauthorized("Empty API key"));
    }
    Ok(token)
}
