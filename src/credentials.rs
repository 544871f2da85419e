//! Credential stores.
//!
//! The manager reads the bearer token synchronously at every connect
//! attempt, so a token written between attempts is picked up by the next
//! reconnect.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ChatError;

/// Source of the bearer token used to authenticate the STOMP session.
pub trait CredentialStore: Debug + Send + Sync {
    /// Returns the current token, or `None` if no usable token is stored.
    fn token(&self) -> Option<String>;
}

/// Token persisted in a JSON object file, e.g. `{"token": "eyJ..."}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    key: String,
}

impl FileCredentialStore {
    /// Creates a store reading entry `key` of the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `token` under this store's key, keeping other entries.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Credential`] if the file cannot be read,
    /// parsed, or written.
    pub fn store_token(&self, token: &str) -> Result<(), ChatError> {
        let mut entries = self.read_entries()?.unwrap_or_default();
        entries.insert(
            self.key.clone(),
            serde_json::Value::String(token.to_string()),
        );
        let content = serde_json::to_string_pretty(&entries)
            .map_err(|e| ChatError::Credential(format!("failed to serialize store: {e}")))?;
        std::fs::write(&self.path, content).map_err(|e| {
            ChatError::Credential(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    fn read_entries(&self) -> Result<Option<HashMap<String, serde_json::Value>>, ChatError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ChatError::Credential(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ChatError::Credential(format!("failed to parse store: {e}")))
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        let entries = match self.read_entries() {
            Ok(entries) => entries?,
            Err(e) => {
                tracing::warn!(error = %e, "credential store unreadable");
                return None;
            }
        };
        entries
            .get(&self.key)
            .and_then(serde_json::Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// In-process token holder.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    /// Creates a store holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    /// Replaces the held token; `None` clears it.
    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }
}
