use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use syncopate_core::{PersistedRoom, RoomStore, StoreError, StoreResult};

/// Persists each room as a JSON document under a data directory.
///
/// Good enough for a single-node deployment; the engine treats every failure
/// here as a logged warning, so a broken disk degrades to in-memory rooms.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into() }
    }

    fn path(&self, code: &str) -> PathBuf {
        // Room codes are alphanumeric, but never trust a string that ends up
        // in a filesystem path
        let safe: String = code
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        self.root.join(format!("{safe}.json"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl RoomStore for JsonFileStore {
    async fn load(&self, code: &str) -> StoreResult<Option<PersistedRoom>> {
        let bytes = match fs::read(self.path(code)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let persisted =
            serde_json::from_slice(&bytes).map_err(|error| StoreError::Malformed {
                code: code.to_string(),
                reason: error.to_string(),
            })?;

        Ok(Some(persisted))
    }

    async fn save(&self, code: &str, data: &PersistedRoom) -> StoreResult<()> {
        fs::create_dir_all(&self.root).await?;

        let bytes = serde_json::to_vec_pretty(data).map_err(|error| StoreError::Malformed {
            code: code.to_string(),
            reason: error.to_string(),
        })?;

        fs::write(self.path(code), bytes).await?;
        Ok(())
    }

    async fn clear(&self, code: &str) -> StoreResult<()> {
        match fs::remove_file(self.path(code)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use syncopate_core::{NewEntry, PersistedRoom, ProviderKind, QueueEntry, RoomStore, StoreError};

    use super::JsonFileStore;

    fn entry(title: &str) -> QueueEntry {
        QueueEntry::new(NewEntry {
            title: title.to_string(),
            artist: "artist".to_string(),
            provider: ProviderKind::YouTube,
            provider_ref: None,
            added_by: 1,
        })
    }

    #[tokio::test]
    async fn round_trips_a_room() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let data = PersistedRoom {
            entries: vec![entry("a"), entry("b")],
            playback: None,
        };

        store.save("R1", &data).await.unwrap();
        let loaded = store.load("R1").await.unwrap().unwrap();

        let titles: Vec<_> = loaded.entries.iter().map(|e| e.title.clone()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(loaded.entries[0].id, data.entries[0].id);
    }

    #[tokio::test]
    async fn missing_rooms_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_the_room_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save("R1", &PersistedRoom::default()).await.unwrap();
        store.clear("R1").await.unwrap();

        assert!(store.load("R1").await.unwrap().is_none());

        // Clearing twice is fine
        store.clear("R1").await.unwrap();
    }

    #[tokio::test]
    async fn garbage_on_disk_is_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("R1.json"), b"not json")
            .await
            .unwrap();

        let result = store.load("R1").await;
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[tokio::test]
    async fn path_traversal_is_neutralized() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store
            .save("../../etc/passwd", &PersistedRoom::default())
            .await
            .unwrap();

        // The write landed inside the data dir, under a sanitized name
        assert!(store.load("../../etc/passwd").await.unwrap().is_some());
        assert!(dir.path().join("etcpasswd.json").exists());
    }
}
