//! Authentication Module
//!
//! Owns the access/refresh credential pair and its persisted copy.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::{Storage, StorageError};

const CREDENTIALS_KEY: &str = "auth";

/// Credential pair issued by the token endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    access: String,
    refresh: Option<String>,
}

impl Credentials {
    /// Build a pair; the access token must be non-empty
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Result<Self, AuthError> {
        let access = access.into();
        if access.trim().is_empty() {
            return Err(AuthError::EmptyAccessToken);
        }
        Ok(Self { access, refresh })
    }

    pub fn access_token(&self) -> &str {
        &self.access
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_deref()
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &"<redacted>")
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Process-wide holder of the current credentials.
///
/// Reads are served from memory; every write goes through to storage so the
/// pair survives restarts until [`TokenStore::clear`].
pub struct TokenStore {
    credentials: RwLock<Option<Credentials>>,
    storage: Storage,
}

impl TokenStore {
    /// Open the store, restoring any previously persisted pair
    pub fn open(storage: Storage) -> Result<Self, AuthError> {
        let restored = match storage.load::<Credentials>(CREDENTIALS_KEY)? {
            Some(creds) if !creds.access.trim().is_empty() => {
                debug!("Restored stored credentials");
                Some(creds)
            }
            Some(_) => {
                warn!("Discarding stored credentials with empty access token");
                storage.delete(CREDENTIALS_KEY)?;
                None
            }
            None => None,
        };

        Ok(Self {
            credentials: RwLock::new(restored),
            storage,
        })
    }

    /// Replace the current pair, in memory and on disk
    pub fn save(&self, credentials: Credentials) -> Result<(), AuthError> {
        self.storage.save(CREDENTIALS_KEY, &credentials)?;

        let mut guard = self
            .credentials
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(credentials);

        info!("Credentials stored");
        Ok(())
    }

    /// Current access token, if authenticated
    pub fn access_token(&self) -> Option<String> {
        self.credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|c| c.access.clone())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Forget the pair (logout)
    pub fn clear(&self) -> Result<(), AuthError> {
        {
            let mut guard = self
                .credentials
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = None;
        }
        self.storage.delete(CREDENTIALS_KEY)?;

        info!("Credentials cleared");
        Ok(())
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Access token is empty")]
    EmptyAccessToken,

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &std::path::Path) -> TokenStore {
        TokenStore::open(Storage::open(dir).unwrap()).unwrap()
    }

    #[test]
    fn empty_access_token_is_rejected() {
        assert!(matches!(
            Credentials::new("  ", None),
            Err(AuthError::EmptyAccessToken)
        ));
    }

    #[test]
    fn credentials_survive_reopen_until_cleared() {
        let dir = tempfile::tempdir().unwrap();

        let store = store_in(dir.path());
        assert!(!store.is_authenticated());
        store
            .save(Credentials::new("acc-1", Some("ref-1".into())).unwrap())
            .unwrap();

        let reopened = store_in(dir.path());
        assert_eq!(reopened.access_token().as_deref(), Some("acc-1"));
        assert_eq!(
            reopened.credentials().unwrap().refresh_token(),
            Some("ref-1")
        );

        reopened.clear().unwrap();
        assert!(!reopened.is_authenticated());
        assert!(!store_in(dir.path()).is_authenticated());
    }

    #[test]
    fn reauthentication_overwrites_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(Credentials::new("old", Some("old-refresh".into())).unwrap())
            .unwrap();
        store.save(Credentials::new("new", None).unwrap()).unwrap();

        let creds = store.credentials().unwrap();
        assert_eq!(creds.access_token(), "new");
        assert_eq!(creds.refresh_token(), None);
    }

    #[test]
    fn persisted_empty_token_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("auth.json"),
            br#"{"access":"","refresh":null}"#,
        )
        .unwrap();

        let store = store_in(dir.path());
        assert!(!store.is_authenticated());
        assert!(!dir.path().join("auth.json").exists());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let creds = Credentials::new("secret-access", Some("secret-refresh".into())).unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
    }
}
