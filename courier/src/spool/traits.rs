use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::SpoolError;

/// Backend-agnostic keyed storage for spool and bounce entries.
///
/// The [`SpoolManager`](super::SpoolManager) snapshots the keys, then takes
/// each entry. `take` is the only removal path and must be atomic per key:
/// when two callers race on the same id, exactly one of them receives the
/// entry. No global lock is implied.
#[async_trait]
pub trait EntryStore<T>: Send + Sync + Clone + 'static
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Store `entry` under `id`, replacing any previous value.
    async fn put(&self, id: Uuid, entry: &T) -> Result<(), SpoolError>;

    /// Snapshot of the ids currently stored.
    async fn keys(&self) -> Result<Vec<Uuid>, SpoolError>;

    /// Read an entry without removing it.
    async fn get(&self, id: Uuid) -> Result<Option<T>, SpoolError>;

    /// Remove and return the entry. `None` if it is absent or already taken.
    ///
    /// An entry that cannot be decoded is still removed, and reported as
    /// [`SpoolError::Unreadable`] with its bytes.
    async fn take(&self, id: Uuid) -> Result<Option<T>, SpoolError>;

    /// Keep the bytes of an entry that could not be decoded, out of reach of
    /// `keys` and `get`. Stores without a serialised form have nothing to keep.
    async fn put_unreadable(&self, id: Uuid, raw: &[u8]) -> Result<(), SpoolError> {
        tracing::debug!(%id, bytes = raw.len(), "store keeps no unreadable entries");
        Ok(())
    }

    async fn len(&self) -> Result<usize, SpoolError> {
        Ok(self.keys().await?.len())
    }

    async fn is_empty(&self) -> Result<bool, SpoolError> {
        Ok(self.len().await? == 0)
    }

    /// All entries, in key order.
    async fn list(&self) -> Result<Vec<T>, SpoolError> {
        let mut keys = self.keys().await?;
        keys.sort();
        let mut entries = Vec::with_capacity(keys.len());
        for id in keys {
            if let Some(entry) = self.get(id).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
