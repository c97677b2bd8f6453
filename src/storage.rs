use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ExecutionContext;
use crate::types::{AccessToken, CredentialPair, RefreshToken};
use crate::user::{Language, Theme, User};

/// Fixed storage keys.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER: &str = "current_user";
    pub const THEME: &str = "theme";
    pub const LANGUAGE: &str = "language";
    pub const RECENT_SEARCHES: &str = "recent_searches";
}

const MAX_RECENT_SEARCHES: usize = 10;

/// Key-value medium holding serialized client state.
///
/// Implementations never fail: a medium that cannot read returns `None`,
/// and one that cannot write drops the value.
pub trait CredentialStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    fn clear(&self);
}

/// In-process store. Contents live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Store for contexts without a persistent medium (server-side rendering).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl CredentialStore for NullStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String) {}

    fn remove(&self, _key: &str) {}

    fn clear(&self) {}
}

/// Store persisted as a single JSON object file.
///
/// The file is read once on open and rewritten on every change. A missing
/// or corrupt file opens as empty.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt credential file ignored");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Credential file unreadable");
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        let result = serde_json::to_vec_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, bytes)
            });
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist credential file");
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_owned(), value);
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries);
    }
}

/// Typed facade over a [`CredentialStore`].
///
/// Values are stored as JSON. A value that does not deserialize is
/// logged and read as absent.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    #[must_use]
    pub fn new(backend: impl CredentialStore) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Storage for the given context; server-side rendering always gets [`NullStore`].
    #[must_use]
    pub fn for_context(context: ExecutionContext, backend: impl CredentialStore) -> Self {
        match context {
            ExecutionContext::Interactive => Self::new(backend),
            ExecutionContext::Server => Self::new(NullStore),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    #[must_use]
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.backend.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable stored value");
                None
            }
        }
    }

    pub fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.set(key, raw),
            Err(e) => tracing::warn!(key, error = %e, "Failed to serialize value for storage"),
        }
    }

    pub fn remove_item(&self, key: &str) {
        self.backend.remove(key);
    }

    pub fn clear(&self) {
        self.backend.clear();
    }

    // ── Credentials ───────────────────────────────────────────────────

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.get_item(keys::ACCESS_TOKEN)
    }

    pub fn set_access_token(&self, token: &AccessToken) {
        self.set_item(keys::ACCESS_TOKEN, token);
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.get_item(keys::REFRESH_TOKEN)
    }

    pub fn set_refresh_token(&self, token: &RefreshToken) {
        self.set_item(keys::REFRESH_TOKEN, token);
    }

    pub fn set_credentials(&self, pair: &CredentialPair) {
        self.set_access_token(&pair.access);
        self.set_refresh_token(&pair.refresh);
    }

    pub fn remove_tokens(&self) {
        self.remove_item(keys::ACCESS_TOKEN);
        self.remove_item(keys::REFRESH_TOKEN);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.get_item(keys::USER)
    }

    pub fn set_current_user(&self, user: &User) {
        self.set_item(keys::USER, user);
    }

    pub fn remove_current_user(&self) {
        self.remove_item(keys::USER);
    }

    // ── Preferences ───────────────────────────────────────────────────

    #[must_use]
    pub fn theme(&self) -> Option<Theme> {
        self.get_item(keys::THEME)
    }

    pub fn set_theme(&self, theme: Theme) {
        self.set_item(keys::THEME, &theme);
    }

    #[must_use]
    pub fn language(&self) -> Option<Language> {
        self.get_item(keys::LANGUAGE)
    }

    pub fn set_language(&self, language: Language) {
        self.set_item(keys::LANGUAGE, &language);
    }

    /// Recent search queries, most recent first.
    #[must_use]
    pub fn recent_searches(&self) -> Vec<String> {
        self.get_item(keys::RECENT_SEARCHES).unwrap_or_default()
    }

    pub fn add_recent_search(&self, query: &str) {
        let mut searches = self.recent_searches();
        searches.retain(|s| s != query);
        searches.insert(0, query.to_owned());
        searches.truncate(MAX_RECENT_SEARCHES);
        self.set_item(keys::RECENT_SEARCHES, &searches);
    }

    pub fn clear_recent_searches(&self) {
        self.remove_item(keys::RECENT_SEARCHES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, UserId};

    #[test]
    fn tokens_roundtrip_through_memory() {
        let storage = Storage::in_memory();
        storage.set_credentials(&CredentialPair {
            access: "T1".into(),
            refresh: "R1".into(),
        });

        assert_eq!(storage.access_token(), Some(AccessToken::from("T1")));
        assert_eq!(storage.refresh_token(), Some(RefreshToken::from("R1")));

        storage.remove_tokens();
        assert_eq!(storage.access_token(), None);
        assert_eq!(storage.refresh_token(), None);
    }

    #[test]
    fn corrupt_value_reads_as_absent() {
        let store = MemoryStore::new();
        store.set(keys::USER, "{not json".into());
        store.set(keys::ACCESS_TOKEN, "T1".into());
        let storage = Storage::new(store);

        assert!(storage.current_user().is_none());
        // Raw, unquoted value is not valid JSON either.
        assert!(storage.access_token().is_none());
    }

    #[test]
    fn null_store_ignores_writes() {
        let storage = Storage::for_context(ExecutionContext::Server, MemoryStore::new());
        storage.set_access_token(&"T1".into());
        storage.set_current_user(&User::new(UserId(1), "a", Role::Reader));

        assert!(storage.access_token().is_none());
        assert!(storage.current_user().is_none());
        storage.remove_tokens();
        storage.clear();
    }

    #[test]
    fn recent_searches_dedupe_and_cap() {
        let storage = Storage::in_memory();
        for i in 0..12 {
            storage.add_recent_search(&format!("q{i}"));
        }
        storage.add_recent_search("q5");

        let searches = storage.recent_searches();
        assert_eq!(searches.len(), MAX_RECENT_SEARCHES);
        assert_eq!(searches[0], "q5");
        assert_eq!(searches[1], "q11");
        assert_eq!(searches.iter().filter(|s| *s == "q5").count(), 1);

        storage.clear_recent_searches();
        assert!(storage.recent_searches().is_empty());
    }

    #[test]
    fn theme_and_language() {
        let storage = Storage::in_memory();
        assert_eq!(storage.theme(), None);
        storage.set_theme(Theme::Dark);
        storage.set_language(Language::En);
        assert_eq!(storage.theme(), Some(Theme::Dark));
        assert_eq!(storage.language(), Some(Language::En));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = Storage::new(FileStore::open(&path));
        storage.set_access_token(&"T1".into());
        storage.set_current_user(&User::new(UserId(9), "nine", Role::Author));

        let reopened = Storage::new(FileStore::open(&path));
        assert_eq!(reopened.access_token(), Some(AccessToken::from("T1")));
        assert_eq!(reopened.current_user().map(|u| u.id), Some(UserId(9)));

        reopened.remove_tokens();
        let again = Storage::new(FileStore::open(&path));
        assert!(again.access_token().is_none());
    }

    #[test]
    fn file_store_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"garbage").unwrap();

        let store = FileStore::open(&path);
        assert!(store.get(keys::ACCESS_TOKEN).is_none());
        store.set(keys::ACCESS_TOKEN, "\"T9\"".into());
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("\"T9\""));
    }
}
