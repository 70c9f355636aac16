//! Storage credentials
//!
//! Resolves the static access/secret key pair for the S3 backend. When no
//! static pair is configured the S3 gateway falls back to the default AWS
//! credential chain instead.
//!
//! # Example
//!
//! ```
//! use filelink::storage::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::StorageConfig;
use thiserror::Error;

/// Name reported to the AWS SDK for statically configured keys
const PROVIDER_NAME: &str = "filelink-static";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Access key pair for the object store
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

impl From<Credentials> for aws_credential_types::Credentials {
    fn from(creds: Credentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            None,
            None,
            PROVIDER_NAME,
        )
    }
}

/// Factory for credentials from the supported sources
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Static credentials from the storage configuration
    ///
    /// Returns `Ok(None)` when neither key is configured.
    pub fn from_config(config: &StorageConfig) -> Result<Option<Credentials>, CredentialsError> {
        match (&config.access_key, &config.secret_key) {
            (None, None) => Ok(None),
            (Some(access), Some(secret)) => {
                if access.is_empty() || secret.is_empty() {
                    return Err(CredentialsError::InvalidCredentials(
                        "access_key and secret_key must not be empty".into(),
                    ));
                }
                Ok(Some(Credentials::new(access.clone(), secret.clone())))
            }
            (None, Some(_)) => Err(CredentialsError::MissingCredentials(
                "access_key not set in config".into(),
            )),
            (Some(_), None) => Err(CredentialsError::MissingCredentials(
                "secret_key not set in config".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;

    fn storage_config(access: Option<&str>, secret: Option<&str>) -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::S3,
            endpoint: None,
            use_ssl: false,
            region: "us-east-1".into(),
            bucket: "files".into(),
            access_key: access.map(Into::into),
            secret_key: secret.map(Into::into),
            link_expiration_hours: 24,
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("access", "super-secret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("access"));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn test_from_config_absent_uses_default_chain() {
        let result = CredentialsProvider::from_config(&storage_config(None, None)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_from_config_missing_secret_key() {
        let result = CredentialsProvider::from_config(&storage_config(Some("access"), None));
        assert!(matches!(result, Err(CredentialsError::MissingCredentials(_))));
    }

    #[test]
    fn test_from_config_empty_key_rejected() {
        let result = CredentialsProvider::from_config(&storage_config(Some(""), Some("secret")));
        assert!(matches!(result, Err(CredentialsError::InvalidCredentials(_))));
    }

    #[test]
    fn test_from_config_success() {
        let creds = CredentialsProvider::from_config(&storage_config(
            Some("config-access"),
            Some("config-secret"),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
    }
}
