use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// The pieces of client state that survive between runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// Short-lived bearer credential.
    AccessToken,
    /// Long-lived credential used only to mint access tokens.
    RefreshToken,
    /// Cached profile of the logged-in user, as JSON.
    User,
    /// Display theme preference.
    Theme,
    /// The most recently created election, as JSON.
    LastElection,
}

impl StoreKey {
    /// Stable name of the key on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "bg_jwt",
            Self::RefreshToken => "bg_refresh",
            Self::User => "bg_user",
            Self::Theme => "bg_theme",
            Self::LastElection => "bg_last_election",
        }
    }
}

/// Durable key-value storage for session state.
pub trait SessionStore: Send + 'static {
    fn get(&self, key: StoreKey) -> Option<String>;

    fn set(&mut self, key: StoreKey, value: String) -> io::Result<()>;

    fn remove(&mut self, key: StoreKey) -> io::Result<()>;
}

/// Session state that lives as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<StoreKey, String>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.get(&key).cloned()
    }

    fn set(&mut self, key: StoreKey, value: String) -> io::Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: StoreKey) -> io::Result<()> {
        self.entries.remove(&key);
        Ok(())
    }
}

/// Session state persisted as a flat JSON object in a file.
///
/// Every mutation rewrites the whole file via a temporary sibling, so a crash
/// leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> io::Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.get(key.as_str()).cloned()
    }

    fn set(&mut self, key: StoreKey, value: String) -> io::Result<()> {
        self.entries.insert(key.as_str().to_string(), value);
        self.persist()
    }

    fn remove(&mut self, key: StoreKey) -> io::Result<()> {
        if self.entries.remove(key.as_str()).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        std::env::temp_dir().join(format!("election-client-{name}-{nanos}.json"))
    }

    #[test]
    fn memory_store() {
        let mut store = MemoryStore::default();
        assert_eq!(store.get(StoreKey::AccessToken), None);
        store.set(StoreKey::AccessToken, "jwt".into()).unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("jwt"));
        store.remove(StoreKey::AccessToken).unwrap();
        assert_eq!(store.get(StoreKey::AccessToken), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = scratch_path("reopen");
        {
            let mut store = FileStore::open(&path).unwrap();
            store.set(StoreKey::RefreshToken, "refresh".into()).unwrap();
            store.set(StoreKey::Theme, "dark".into()).unwrap();
            store.remove(StoreKey::Theme).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("refresh"));
        assert_eq!(store.get(StoreKey::Theme), None);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("bg_refresh"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_empty() {
        let store = FileStore::open(scratch_path("missing")).unwrap();
        assert_eq!(store.get(StoreKey::AccessToken), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = scratch_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        fs::remove_file(path).unwrap();
    }
}
