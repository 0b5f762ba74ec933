use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::Error;
use crate::traits::KeyValueStore;

type Entries = BTreeMap<String, String>;

/// [`KeyValueStore`] kept as one JSON object on disk.
///
/// Every write replaces the file through a sibling temp file and a rename, so
/// a crash mid-write leaves the previous contents intact. An unreadable file
/// reads as empty and is overwritten by the next write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Entries, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(Error::Store(format!("{}: {e}", self.path.display()))),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Store file is corrupt; starting empty");
                Ok(Entries::new())
            }
        }
    }

    async fn write(&self, entries: &Entries) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Store(format!("{}: {e}", dir.display())))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Store(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Store(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.write(&entries).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.write(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::new(&path);
        store.set("token", "abc").await.unwrap();
        store.set("user", "{}").await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("token").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("user").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/none.json"));
        assert_eq!(store.get("token").await.unwrap(), None);
        store.set("token", "abc").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"\x00garbage").await.unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("token").await.unwrap(), None);

        store.set("token", "abc").await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Entries = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get("token").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn remove_drops_listed_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("kv.json"));
        store.set("token", "abc").await.unwrap();
        store.set("user", "{}").await.unwrap();
        store.set("forceUpdateDismissed_2.1.0", "1").await.unwrap();

        store.remove(&["token", "user"]).await.unwrap();

        assert_eq!(store.get("token").await.unwrap(), None);
        assert_eq!(store.get("user").await.unwrap(), None);
        assert_eq!(
            store.get("forceUpdateDismissed_2.1.0").await.unwrap().as_deref(),
            Some("1")
        );
    }
}
