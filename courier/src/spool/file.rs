use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::traits::EntryStore;
use crate::error::SpoolError;

const EXTENSION: &str = "json";
const UNREADABLE_EXTENSION: &str = "unreadable";

/// Directory-backed [`EntryStore`]: one `<id>.json` file per entry.
///
/// Writes go to a temporary file that is renamed into place. `take` claims
/// an entry by renaming its file to a unique name first; the rename succeeds
/// for exactly one caller, even across processes sharing the directory.
/// Entries that fail to decode are kept as `<id>.unreadable`.
pub struct FileStore<T> {
    dir: Arc<PathBuf>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FileStore<T> {
    fn clone(&self) -> Self {
        Self {
            dir: Arc::clone(&self.dir),
            _marker: PhantomData,
        }
    }
}

impl<T> FileStore<T> {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SpoolError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir: Arc::new(dir),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    async fn write(&self, id: Uuid, path: &Path, bytes: &[u8]) -> Result<(), SpoolError> {
        let tmp = self.dir.join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl<T> EntryStore<T> for FileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn put(&self, id: Uuid, entry: &T) -> Result<(), SpoolError> {
        let json = serde_json::to_vec_pretty(entry)?;
        self.write(id, &self.path(id), &json).await
    }

    async fn keys(&self) -> Result<Vec<Uuid>, SpoolError> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(self.dir.as_path()).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok());
            match id {
                Some(id) => keys.push(id),
                None => tracing::debug!(path = %path.display(), "ignoring foreign file in spool directory"),
            }
        }
        Ok(keys)
    }

    async fn get(&self, id: Uuid) -> Result<Option<T>, SpoolError> {
        match tokio::fs::read(self.path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn take(&self, id: Uuid) -> Result<Option<T>, SpoolError> {
        let claimed = self
            .dir
            .join(format!(".{id}.{}.claimed", Uuid::new_v4().simple()));
        match tokio::fs::rename(self.path(id), &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let bytes = tokio::fs::read(&claimed).await?;
        let entry = serde_json::from_slice(&bytes);
        tokio::fs::remove_file(&claimed).await?;
        match entry {
            Ok(entry) => Ok(Some(entry)),
            Err(source) => Err(SpoolError::Unreadable {
                id,
                raw: bytes,
                source,
            }),
        }
    }

    async fn put_unreadable(&self, id: Uuid, raw: &[u8]) -> Result<(), SpoolError> {
        let path = self.dir.join(format!("{id}.{UNREADABLE_EXTENSION}"));
        self.write(id, &path, raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store: FileStore<Vec<u32>> = FileStore::open(dir.path().join("unsent")).await.unwrap();
        let id = Uuid::new_v4();

        store.put(id, &vec![1, 2, 3]).await.unwrap();
        assert!(store.dir().join(format!("{id}.json")).exists());
        assert_eq!(store.keys().await.unwrap(), vec![id]);
        assert_eq!(store.get(id).await.unwrap(), Some(vec![1, 2, 3]));

        assert_eq!(store.take(id).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.take(id).await.unwrap(), None);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.txt"), "not an entry").unwrap();
        std::fs::write(dir.path().join("bogus.json"), "{}").unwrap();

        let store: FileStore<u32> = FileStore::open(dir.path()).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_removed_and_returned_raw() {
        let dir = tempfile::tempdir().unwrap();
        let store: FileStore<Vec<u32>> = FileStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        std::fs::write(store.path(id), b"{ not json").unwrap();

        match store.take(id).await {
            Err(SpoolError::Unreadable { id: failed, raw, .. }) => {
                assert_eq!(failed, id);
                assert_eq!(raw, b"{ not json");
            }
            other => panic!("expected an unreadable entry, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        store.put_unreadable(id, b"{ not json").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(
            std::fs::read(dir.path().join(format!("{id}.unreadable"))).unwrap(),
            b"{ not json"
        );
    }

    #[tokio::test]
    async fn two_stores_on_one_directory_take_once() {
        let dir = tempfile::tempdir().unwrap();
        let a: FileStore<String> = FileStore::open(dir.path()).await.unwrap();
        let b: FileStore<String> = FileStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        a.put(id, &"once".to_string()).await.unwrap();

        let (first, second) = tokio::join!(a.take(id), b.take(id));
        let taken = [first.unwrap(), second.unwrap()];
        assert_eq!(taken.iter().filter(|t| t.is_some()).count(), 1);
    }
}
