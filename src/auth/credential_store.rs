//! Persistent credential storage
//!
//! This module defines the [`CredentialStore`] trait, a minimal key-value
//! contract for the three credentials the client persists between runs, and
//! three backends:
//!
//! - [`KeyringCredentialStore`] -- the operating system's native credential
//!   store (Keychain on macOS, Secret Service on Linux, Windows Credential
//!   Manager on Windows).
//! - [`FileCredentialStore`] -- a JSON object on disk, for hosts without a
//!   keyring daemon.
//! - [`MemoryCredentialStore`] -- process-local, used by tests and by the
//!   `memory` backend.
//!
//! All methods are synchronous and may block: the file backend does disk
//! I/O and the keyring backend makes a round-trip to the platform secret
//! service. Each call touches at most one small entry, so async callers
//! invoke them inline rather than through `spawn_blocking`.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;

use crate::config::CredentialsConfig;
use crate::error::{Result, ReportlineError};

// ---------------------------------------------------------------------------
// CredentialKey
// ---------------------------------------------------------------------------

/// The keys a [`CredentialStore`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Short-lived access token attached to API calls.
    AccessToken,
    /// Long-lived token used only to obtain a new access token.
    RefreshToken,
    /// JSON-serialized [`crate::auth::session::UserProfile`].
    UserProfile,
}

impl CredentialKey {
    /// All keys, in the order they are cleared on logout.
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::UserProfile,
    ];

    /// Stable storage name for the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use reportline::auth::credential_store::CredentialKey;
    ///
    /// assert_eq!(CredentialKey::AccessToken.as_str(), "access-token");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access-token",
            Self::RefreshToken => "refresh-token",
            Self::UserProfile => "user-profile",
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Abstract persistent holder for the client's credentials.
///
/// Values survive process restarts for every backend except
/// [`MemoryCredentialStore`].
///
/// Calls block the current thread until the backend answers.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Returns the stored value, or `Ok(None)` when the key is absent.
    fn get(&self, key: CredentialKey) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: CredentialKey, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: CredentialKey) -> Result<()>;

    /// Removes every key the client persists.
    fn clear(&self) -> Result<()> {
        for key in CredentialKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Builds the credential store selected by configuration.
///
/// # Errors
///
/// Returns [`ReportlineError::Config`] for an unknown backend name, or any
/// error raised while opening the file backend.
pub fn open_store(config: &CredentialsConfig) -> Result<Arc<dyn CredentialStore>> {
    match config.backend.as_str() {
        "keyring" => Ok(Arc::new(KeyringCredentialStore::new(&config.service_name))),
        "memory" => Ok(Arc::new(MemoryCredentialStore::new())),
        "file" => {
            let store = match &config.path {
                Some(path) => FileCredentialStore::new(path),
                None => FileCredentialStore::in_data_dir()?,
            };
            Ok(Arc::new(store))
        }
        other => Err(ReportlineError::Config(format!(
            "Unknown credential backend: {other}. Must be one of: keyring, file, memory"
        ))
        .into()),
    }
}

// ---------------------------------------------------------------------------
// KeyringCredentialStore
// ---------------------------------------------------------------------------

/// Credential store backed by the OS keyring.
///
/// Each key is stored as a separate keyring entry whose service is the
/// configured service name and whose user is the key's storage name.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    /// Creates a store that namespaces its entries under `service`.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: CredentialKey) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key.as_str())
            .map_err(|e| ReportlineError::Keyring(e).into())
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ReportlineError::Keyring(e).into()),
        }
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(ReportlineError::Keyring)?;
        Ok(())
    }

    fn remove(&self, key: CredentialKey) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ReportlineError::Keyring(e).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// Credential store persisted as a flat JSON object on disk.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so a crash never leaves a half-written file behind. A process-wide
/// mutex serializes read-modify-write cycles.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Creates a store that reads and writes `path`.
    ///
    /// The file is created lazily on the first `set`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store at `credentials.json` in the user's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::CredentialStore`] if the platform data
    /// directory cannot be determined.
    pub fn in_data_dir() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "reportline", "reportline").ok_or_else(|| {
            ReportlineError::CredentialStore("Could not determine data directory".into())
        })?;
        Ok(Self::new(dirs.data_dir().join("credentials.json")))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ReportlineError::Io(e).into()),
        }
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = Self::create_private(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(values)?)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Creates (or truncates) `path` readable and writable by the owner only.
    fn create_private(path: &Path) -> Result<std::fs::File> {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(path)?;
        // `mode` only applies to newly created files; a leftover temp file
        // keeps its old permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(file)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| ReportlineError::CredentialStore("credential file lock poisoned".into()).into())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.remove(key.as_str()))
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut values = self.read_all()?;
        values.insert(key.as_str().to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: CredentialKey) -> Result<()> {
        let _guard = self.guard()?;
        let mut values = self.read_all()?;
        if values.remove(key.as_str()).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<CredentialKey, String>>> {
        self.values
            .lock()
            .map_err(|_| ReportlineError::CredentialStore("memory store lock poisoned".into()).into())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        Ok(self.values()?.get(&key).cloned())
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        self.values()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: CredentialKey) -> Result<()> {
        self.values()?.remove(&key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_storage_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            CredentialKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_memory_store_get_set_remove() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get(CredentialKey::AccessToken).unwrap(), None);

        store.set(CredentialKey::AccessToken, "T1").unwrap();
        assert_eq!(
            store.get(CredentialKey::AccessToken).unwrap().as_deref(),
            Some("T1")
        );

        store.remove(CredentialKey::AccessToken).unwrap();
        assert_eq!(store.get(CredentialKey::AccessToken).unwrap(), None);
    }

    #[test]
    fn test_remove_absent_key_is_ok() {
        let store = MemoryCredentialStore::new();
        assert!(store.remove(CredentialKey::RefreshToken).is_ok());
    }

    #[test]
    fn test_clear_removes_every_key() {
        let store = MemoryCredentialStore::new();
        for key in CredentialKey::ALL {
            store.set(key, "value").unwrap();
        }
        store.clear().unwrap();
        for key in CredentialKey::ALL {
            assert_eq!(store.get(key).unwrap(), None, "{key} should be cleared");
        }
    }

    #[test]
    fn test_file_store_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds.json"));
        assert_eq!(store.get(CredentialKey::UserProfile).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("creds.json");

        let store = FileCredentialStore::new(&path);
        store.set(CredentialKey::RefreshToken, "R1").unwrap();
        drop(store);

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(
            reopened.get(CredentialKey::RefreshToken).unwrap().as_deref(),
            Some("R1")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::new(&path);
        store.set(CredentialKey::AccessToken, "T1").unwrap();
        store.set(CredentialKey::RefreshToken, "R1").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_tightens_leftover_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let leftover = path.with_extension("json.tmp");
        std::fs::write(&leftover, "{}").unwrap();
        std::fs::set_permissions(&leftover, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileCredentialStore::new(&path)
            .set(CredentialKey::AccessToken, "T1")
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(store.get(CredentialKey::AccessToken).is_err());
    }

    #[test]
    fn test_open_store_rejects_unknown_backend() {
        let config = CredentialsConfig {
            backend: "floppy".to_string(),
            ..CredentialsConfig::default()
        };
        let err = open_store(&config).unwrap_err();
        assert!(err.to_string().contains("floppy"));
    }

    #[test]
    fn test_open_store_memory_backend() {
        let config = CredentialsConfig {
            backend: "memory".to_string(),
            ..CredentialsConfig::default()
        };
        let store = open_store(&config).unwrap();
        store.set(CredentialKey::AccessToken, "T").unwrap();
        assert_eq!(store.get(CredentialKey::AccessToken).unwrap().as_deref(), Some("T"));
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_store_round_trip() {
        let store = KeyringCredentialStore::new("reportline-test");
        store.set(CredentialKey::AccessToken, "kr-token").unwrap();
        assert_eq!(
            store.get(CredentialKey::AccessToken).unwrap().as_deref(),
            Some("kr-token")
        );
        store.clear().unwrap();
        assert_eq!(store.get(CredentialKey::AccessToken).unwrap(), None);
    }
}
