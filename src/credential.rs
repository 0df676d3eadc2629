//! Durable credential storage.
//!
//! The [`CredentialStore`] is the single holder of the operator's bearer
//! token and display name. It mirrors every change into a
//! [`KeyValueStore`] under the keys [`TOKEN_KEY`] and [`USERNAME_KEY`], so a
//! session survives a restart of the client. No expiry is enforced here;
//! the server's validation endpoint is the authority.
//!
//! Components other than the session controller only get a
//! [`CredentialReader`], which cannot mutate the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::protocol::Credential;

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "authToken";
/// Storage key of the display name.
pub const USERNAME_KEY: &str = "username";

/// Application directory under the platform config dir.
const APP_DIR: &str = "mmsession";
const STATE_FILE: &str = "session.json";

// ── Key/value backends ──────────────────────────────────────────────

/// A durable string key/value store.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] or [`SessionError::Io`] if the
    /// backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal could not be persisted.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store for tests and `--ephemeral` sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON object persisted to a single file.
///
/// Every mutation rewrites the whole file; the map only ever holds two keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// `<config_dir>/mmsession/session.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                SessionError::Storage(format!("{} is not valid JSON: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map().unwrap_or_default();
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ── Credential store ────────────────────────────────────────────────

/// Process-wide holder of the active [`Credential`].
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Open the store, restoring a credential persisted by an earlier process.
    ///
    /// A half-written pair (token without name or the reverse) or an
    /// unreadable backend yields an empty store rather than an error, since
    /// the credential would fail validation anyway.
    pub fn load(backend: impl KeyValueStore + 'static) -> Self {
        let restored = match (backend.get(TOKEN_KEY), backend.get(USERNAME_KEY)) {
            (Ok(Some(token)), Ok(Some(name))) if !token.is_empty() => {
                debug!(display_name = %name, "restored stored credential");
                Some(Credential::new(token, name))
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("could not read stored credential: {e}");
                None
            }
            _ => None,
        };
        Self {
            backend: Box::new(backend),
            current: RwLock::new(restored),
        }
    }

    /// Persist and activate a credential.
    ///
    /// # Errors
    ///
    /// Returns the backend error if either key could not be written. The
    /// in-memory credential is only replaced once both writes succeed.
    pub fn set(&self, token: &str, display_name: &str) -> Result<()> {
        self.backend.set(TOKEN_KEY, token)?;
        self.backend.set(USERNAME_KEY, display_name)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Credential::new(token, display_name));
        Ok(())
    }

    /// Returns the active credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget the credential.
    ///
    /// The in-memory credential is dropped first, so even when the durable
    /// delete fails no further request will carry the token.
    ///
    /// # Errors
    ///
    /// Returns the first backend error encountered.
    pub fn clear(&self) -> Result<()> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let token = self.backend.remove(TOKEN_KEY);
        let name = self.backend.remove(USERNAME_KEY);
        token.and(name)
    }

    /// A read-only view for components that must not mutate the store.
    pub fn reader(self: &Arc<Self>) -> CredentialReader {
        CredentialReader {
            store: Arc::clone(self),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.is_present())
            .finish()
    }
}

/// Read-only handle onto a [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct CredentialReader {
    store: Arc<CredentialStore>,
}

impl CredentialReader {
    pub fn get(&self) -> Option<Credential> {
        self.store.get()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    /// Backend whose writes always fail.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SessionError::Storage("unreadable".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(SessionError::Storage("read-only".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(SessionError::Storage("read-only".into()))
        }
    }

    #[test]
    fn set_get_clear() {
        let store = CredentialStore::load(MemoryStore::new());
        assert!(store.get().is_none());

        store.set("t1", "alice").unwrap();
        assert_eq!(store.get(), Some(Credential::new("t1", "alice")));

        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!store.is_present());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = CredentialStore::load(FileStore::new(&path));
            store.set("t1", "alice").unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"authToken\""));
        assert!(raw.contains("\"username\""));

        let reopened = CredentialStore::load(FileStore::new(&path));
        assert_eq!(reopened.get(), Some(Credential::new("t1", "alice")));

        reopened.clear().unwrap();
        let again = CredentialStore::load(FileStore::new(&path));
        assert!(again.get().is_none());
    }

    #[test]
    fn half_written_pair_is_ignored() {
        let backend = MemoryStore::new();
        backend.set(TOKEN_KEY, "t1").unwrap();
        let store = CredentialStore::load(backend);
        assert!(store.get().is_none());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::load(FileStore::new(&path));
        assert!(store.get().is_none());
    }

    #[test]
    fn failed_set_leaves_store_empty() {
        let store = CredentialStore::load(BrokenStore);
        assert!(store.set("t1", "alice").is_err());
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_drops_memory_even_if_backend_fails() {
        let store = CredentialStore::load(BrokenStore);
        *store.current.write().unwrap() = Some(Credential::new("t1", "alice"));

        assert!(store.clear().is_err());
        assert!(store.get().is_none());
    }

    #[test]
    fn reader_sees_updates() {
        let store = Arc::new(CredentialStore::load(MemoryStore::new()));
        let reader = store.reader();
        assert!(reader.get().is_none());
        store.set("t2", "bob").unwrap();
        assert_eq!(reader.get().map(|c| c.display_name), Some("bob".into()));
    }

    #[test]
    fn default_path_is_under_app_dir() {
        if let Some(path) = FileStore::default_path() {
            assert!(path.ends_with("mmsession/session.json"));
        }
    }
}
