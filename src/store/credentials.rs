// src/store/credentials.rs

//! Repository credentials. Keychain integration lives outside this crate;
//! the engine only sees the trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::errors::{BackupError, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Key/value credential storage keyed by repository id.
pub trait CredentialStore: Send + Sync {
    fn save(&self, repository_id: &str, username: &str, password: &str) -> Result<()>;
    fn load(&self, repository_id: &str) -> Result<Option<Credentials>>;
    /// Deleting an unknown repository is not an error.
    fn delete(&self, repository_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, repository_id: &str, username: &str, password: &str) -> Result<()> {
        if repository_id.trim().is_empty() {
            return Err(BackupError::Validation(
                "repository id must not be empty".to_string(),
            ));
        }
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repository_id.to_string(), credentials);
        info!(repository = %repository_id, "stored credentials (memory)");
        Ok(())
    }

    fn load(&self, repository_id: &str) -> Result<Option<Credentials>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repository_id)
            .cloned())
    }

    fn delete(&self, repository_id: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(repository_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let store = MemoryCredentialStore::new();
        store.save("nas", "me", "hunter2").unwrap();

        let creds = store.load("nas").unwrap().unwrap();
        assert_eq!(creds.username, "me");
        assert!(!format!("{creds:?}").contains("hunter2"));

        store.delete("nas").unwrap();
        store.delete("nas").unwrap();
        assert!(store.load("nas").unwrap().is_none());
    }

    #[test]
    fn empty_repository_id_is_rejected() {
        assert!(MemoryCredentialStore::new().save(" ", "u", "p").is_err());
    }
}
