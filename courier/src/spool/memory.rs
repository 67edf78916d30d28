use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::traits::EntryStore;
use crate::error::SpoolError;

/// In-memory [`EntryStore`] for development and testing.
///
/// Entries live in a sharded map, so a `take` only locks the shard holding
/// its key. Not durable: everything is lost on restart.
pub struct MemoryStore<T> {
    entries: Arc<DashMap<Uuid, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

#[async_trait]
impl<T> EntryStore<T> for MemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn put(&self, id: Uuid, entry: &T) -> Result<(), SpoolError> {
        self.entries.insert(id, entry.clone());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Uuid>, SpoolError> {
        Ok(self.entries.iter().map(|e| *e.key()).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<T>, SpoolError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn take(&self, id: Uuid) -> Result<Option<T>, SpoolError> {
        Ok(self.entries.remove(&id).map(|(_, entry)| entry))
    }

    async fn len(&self) -> Result<usize, SpoolError> {
        Ok(self.entries.len())
    }
}
