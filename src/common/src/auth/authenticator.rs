use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::{AdminContext, AuthError};
use crate::config::AdminConfig;

/// Validates platform administrator API keys.
#[derive(Debug, Clone, Default)]
pub struct AdminAuthenticator {
    /// key_hash -> key name
    keys: HashMap<String, String>,
}

impl AdminAuthenticator {
    pub fn new(config: &AdminConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .map(|api_key| (Self::hash_api_key(&api_key.key), api_key.name.clone()))
            .collect();
        Self { keys }
    }

    /// Number of configured keys; zero means every admin request is rejected.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Authenticate a raw Authorization header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AdminContext, AuthError> {
        let token = super::bearer_token(authorization)?;
        let key_hash = Self::hash_api_key(token);
        let key_name = self
            .keys
            .get(&key_hash)
            .ok_or_else(|| AuthError::unauthorized("Invalid API key"))?;

        Ok(AdminContext {
            key_name: key_name.clone(),
        })
    }

    /// Hash an API key using SHA-256
    fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminApiKeyConfig;

    fn authenticator() -> AdminAuthenticator {
        AdminAuthenticator::new(&AdminConfig {
            api_keys: vec![AdminApiKeyConfig {
                key: "ops-secret".to_string(),
                name: "ops".to_string(),
            }],
        })
    }

    #[test]
    fn test_hash_api_key() {
        let hash1 = AdminAuthenticator::hash_api_key("test-key-123");
        let hash2 = AdminAuthenticator::hash_api_key("test-key-123");
        let hash3 = AdminAuthenticator::hash_api_key("different-key");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_valid_key_yields_key_name() {
        let ctx = authenticator()
            .authenticate(Some("Bearer ops-secret"))
            .unwrap();
        assert_eq!(ctx.key_name, "ops");
    }

    #[test]
    fn test_invalid_api_key() {
        let err = authenticator()
            .authenticate(Some("Bearer wrong"))
            .unwrap_err();
        assert_eq!(err.status_code, 401);
        assert!(err.message.contains("Invalid API key"));
    }

    #[test]
    fn test_no_keys_configured_rejects_everything() {
        let auth = AdminAuthenticator::default();
        assert_eq!(auth.key_count(), 0);
        assert!(auth.authenticate(Some("Bearer anything")).is_err());
    }
}
