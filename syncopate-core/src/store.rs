use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::QueueEntry;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Stored data exists but could not be decoded
    #[error("Stored data for room {code} could not be decoded: {reason}")]
    Malformed { code: String, reason: String },
}

/// What a room persists between restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRoom {
    /// Pending queue entries in their ranked order
    pub entries: Vec<QueueEntry>,
    /// The last known playback position, kept for observability.
    /// A restored room starts idle regardless, since stream handles go
    /// stale across restarts.
    pub playback: Option<PersistedPlayback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPlayback {
    pub entry: QueueEntry,
    pub position_millis: u64,
}

/// Represents a backend that can persist and restore room state.
///
/// Failures at this boundary are never fatal to a room; callers log them and
/// carry on with the in-memory state.
#[async_trait]
pub trait RoomStore
where
    Self: 'static + Sync + Send,
{
    async fn load(&self, code: &str) -> StoreResult<Option<PersistedRoom>>;
    async fn save(&self, code: &str, data: &PersistedRoom) -> StoreResult<()>;
    async fn clear(&self, code: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T> RoomStore for std::sync::Arc<T>
where
    T: RoomStore,
{
    async fn load(&self, code: &str) -> StoreResult<Option<PersistedRoom>> {
        self.as_ref().load(code).await
    }

    async fn save(&self, code: &str, data: &PersistedRoom) -> StoreResult<()> {
        self.as_ref().save(code, data).await
    }

    async fn clear(&self, code: &str) -> StoreResult<()> {
        self.as_ref().clear(code).await
    }
}

/// Built-in store keeping persisted rooms in process memory.
///
/// Used by tests, and as the backing store when persistence is disabled for
/// a deployment.
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, PersistedRoom>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn load(&self, code: &str) -> StoreResult<Option<PersistedRoom>> {
        Ok(self.rooms.get(code).map(|r| r.clone()))
    }

    async fn save(&self, code: &str, data: &PersistedRoom) -> StoreResult<()> {
        self.rooms.insert(code.to_string(), data.clone());
        Ok(())
    }

    async fn clear(&self, code: &str) -> StoreResult<()> {
        self.rooms.remove(code);
        Ok(())
    }
}
