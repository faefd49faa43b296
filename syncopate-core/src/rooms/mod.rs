mod room;

pub use room::*;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::{info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{ProviderKind, QueueError, SyncopateContext};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room is not active")]
    Inactive,
    #[error("Room {0} does not exist")]
    NotFound(String),
    #[error("Room is at capacity")]
    AtCapacity,
    #[error("No provider is registered for {0}")]
    ProviderNotFound(ProviderKind),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Creates and looks up room sessions by room code, and owns their lifecycle.
pub struct RoomRegistry {
    context: SyncopateContext,
}

impl RoomRegistry {
    pub fn new(context: &SyncopateContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the room for `code`, creating it when it doesn't exist yet.
    ///
    /// A newly created room restores its persisted queue, when there is one.
    pub async fn get_or_create(&self, code: &str, params: RoomParams) -> Arc<Room> {
        if let Some(existing) = self.context.rooms.get(code) {
            return existing.clone();
        }

        let restored = self.restore(code).await;
        let room = Arc::new(Room::new(&self.context, code.to_string(), params, restored));

        match self.context.rooms.entry(code.to_string()) {
            // Another caller won the race while we were loading
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                info!("Created room {}", code);

                vacant.insert(room.clone());
                room.start();
                room
            }
        }
    }

    pub fn room_by_code(&self, code: &str) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(code)
            .map(|r| r.clone())
            .ok_or_else(|| RoomError::NotFound(code.to_string()))
    }

    /// All rooms currently in memory.
    pub fn list_all(&self) -> Vec<Arc<Room>> {
        self.context.rooms.iter().map(|r| r.clone()).collect()
    }

    /// Explicitly closes a room and wipes its persisted state.
    pub fn close(&self, code: &str) -> Result<(), RoomError> {
        let (_, room) = self
            .context
            .rooms
            .remove(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;

        room.shutdown(true);
        Ok(())
    }

    async fn restore(&self, code: &str) -> Vec<crate::QueueEntry> {
        if !self.context.config.persistence_enabled {
            return vec![];
        }

        match self.context.store.load(code).await {
            Ok(Some(persisted)) => persisted.entries,
            Ok(None) => vec![],
            Err(error) => {
                warn!("Failed to restore room {}: {}", code, error);
                vec![]
            }
        }
    }
}

/// Closes rooms that have sat without a single subscriber past the idle
/// timeout. The persisted queue survives, so re-creating the room picks it
/// back up.
pub(crate) fn spawn_idle_sweeper(context: &SyncopateContext) -> JoinHandle<()> {
    let context = context.clone();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(context.config.tick_interval);

        loop {
            timer.tick().await;

            let timeout = context.config.idle_timeout;

            let expired: Vec<_> = context
                .rooms
                .iter()
                .filter(|room| room.idle_timed_out(timeout))
                .map(|room| room.code().to_string())
                .collect();

            for code in expired {
                if let Some((_, room)) = context.rooms.remove(&code) {
                    info!("Room {} idled out with no subscribers", code);
                    room.shutdown(false);
                }
            }
        }
    })
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use crossbeam::atomic::AtomicCell;
    use futures_util::StreamExt;
    use tokio::time::{sleep, timeout};

    use super::{RoomError, RoomParams};
    use crate::{
        Config, Member, MemoryStore, MusicProvider, NewEntry, PlaybackPhase, ProviderError,
        ProviderKind, ProviderRegistry, ProviderResult, QueueEntry, RoomEvent, RoomStore,
        StreamHandle, SubscriptionHandle, Syncopate,
    };

    /// A provider that fails its first `failures` resolutions, then succeeds.
    struct FlakyProvider {
        failures: AtomicCell<u32>,
        duration_millis: Option<u64>,
    }

    impl FlakyProvider {
        fn reliable(duration_millis: Option<u64>) -> Self {
            Self {
                failures: AtomicCell::new(0),
                duration_millis,
            }
        }

        fn failing(failures: u32, duration_millis: Option<u64>) -> Self {
            Self {
                failures: AtomicCell::new(failures),
                duration_millis,
            }
        }
    }

    #[async_trait]
    impl MusicProvider for FlakyProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::YouTube
        }

        async fn resolve(&self, title: &str, _artist: &str) -> ProviderResult<StreamHandle> {
            if self.failures.load() > 0 {
                self.failures.fetch_sub(1);
                return Err(ProviderError::Unavailable("flaky".to_string()));
            }

            Ok(StreamHandle {
                url: format!("https://streams.example/{title}"),
                duration_millis: self.duration_millis,
            })
        }
    }

    fn test_config() -> Config {
        Config {
            max_queue_size: 10,
            retry_limit: 3,
            retry_backoff: Duration::from_millis(1),
            resolve_timeout: Duration::from_secs(1),
            tick_interval: Duration::from_millis(10),
            keepalive_interval: Duration::from_secs(10),
            missed_keepalive_limit: 3,
            idle_timeout: Duration::from_secs(60),
            persistence_enabled: true,
        }
    }

    fn syncopate_with(provider: FlakyProvider, config: Config) -> Syncopate {
        let providers = ProviderRegistry::new();
        providers.register(provider);

        Syncopate::new(config, providers, MemoryStore::new())
    }

    fn params() -> RoomParams {
        RoomParams {
            name: "listening party".to_string(),
            capacity: None,
            host_id: 1,
        }
    }

    fn member(id: u64) -> Member {
        Member {
            id,
            display_name: format!("member-{id}"),
            joined_at: Utc::now(),
        }
    }

    fn suggestion(title: &str, artist: &str) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            artist: artist.to_string(),
            provider: ProviderKind::YouTube,
            provider_ref: None,
            added_by: 1,
        }
    }

    async fn wait_until<F>(what: &str, condition: F)
    where
        F: Fn() -> bool,
    {
        for _ in 0..500 {
            if condition() {
                return;
            }

            sleep(Duration::from_millis(10)).await;
        }

        panic!("timed out waiting for {what}");
    }

    /// Consumes events until a queue update with exactly these titles shows
    /// up. Subscribers also see initial sync and earlier updates, so tests
    /// wait for the ordering they care about.
    async fn wait_for_queue(handle: &mut SubscriptionHandle, titles: &[&str]) -> Vec<QueueEntry> {
        timeout(Duration::from_secs(2), async {
            loop {
                match handle.next().await {
                    Some(RoomEvent::QueueUpdate { entries }) => {
                        let seen: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();

                        if seen == titles {
                            return entries;
                        }
                    }
                    Some(_) => continue,
                    None => panic!("subscription ended before the queue update arrived"),
                }
            }
        })
        .await
        .expect("queue update arrives in time")
    }

    #[tokio::test]
    async fn play_dequeues_the_highest_voted_entry() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(300_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let _a = room.add_track(suggestion("A", "X")).unwrap();
        let b = room.add_track(suggestion("B", "Y")).unwrap();
        room.vote(b.id, 1).unwrap();

        let titles: Vec<_> = room.queue().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["B", "A"]);

        room.play().unwrap();

        wait_until("the track to start playing", || {
            room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        let playback = room.playback();
        let current = playback.current.unwrap();

        assert_eq!(current.id, b.id);
        assert!(playback.is_playing);
        assert!(playback.position_millis < 100);

        // The dequeued entry left the queue behind
        let titles: Vec<_> = room.queue().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["A"]);
    }

    #[tokio::test]
    async fn flaky_provider_recovers_within_the_retry_ceiling() {
        let syncopate = syncopate_with(FlakyProvider::failing(2, Some(300_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let a = room.add_track(suggestion("A", "X")).unwrap();
        room.play().unwrap();

        wait_until("the track to survive its retries", || {
            room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        assert_eq!(room.playback().current.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn exhausted_retries_skip_to_the_next_entry() {
        // Three failures exhaust A's ceiling of three; B resolves first try
        let syncopate = syncopate_with(FlakyProvider::failing(3, Some(300_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let a = room.add_track(suggestion("A", "X")).unwrap();
        let b = room.add_track(suggestion("B", "Y")).unwrap();
        room.vote(a.id, 1).unwrap();

        let mut handle = room.subscribe(member(1)).unwrap();

        room.play().unwrap();

        wait_until("playback to move past the failing track", || {
            room.playback()
                .current
                .map(|c| c.id == b.id)
                .unwrap_or_default()
                && room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        // Subscribers were told about the skipped track
        let failed = timeout(Duration::from_secs(2), async {
            loop {
                match handle.next().await {
                    Some(RoomEvent::TrackFailed { entry, .. }) => return entry,
                    Some(_) => continue,
                    None => panic!("subscription ended before the failure notification"),
                }
            }
        })
        .await
        .expect("failure notification arrives");

        assert_eq!(failed.id, a.id);
    }

    #[tokio::test]
    async fn votes_are_broadcast_to_every_subscriber() {
        let syncopate = syncopate_with(FlakyProvider::reliable(None), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let mut first = room.subscribe(member(1)).unwrap();
        let mut second = room.subscribe(member(2)).unwrap();

        room.add_track(suggestion("A", "X")).unwrap();
        let b = room.add_track(suggestion("B", "Y")).unwrap();

        room.vote(b.id, 1).unwrap();

        // Both observe the re-ranked queue, vote broadcasts included
        for handle in [&mut first, &mut second] {
            let entries = wait_for_queue(handle, &["B", "A"]).await;
            assert_eq!(entries[0].id, b.id);
            assert_eq!(entries[0].votes, 1);
        }
    }

    #[tokio::test]
    async fn skip_moves_straight_to_the_next_entry() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(300_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let a = room.add_track(suggestion("A", "X")).unwrap();
        let b = room.add_track(suggestion("B", "Y")).unwrap();
        room.vote(a.id, 1).unwrap();

        room.play().unwrap();
        wait_until("the first track to play", || {
            room.playback()
                .current
                .map(|c| c.id == a.id)
                .unwrap_or_default()
                && room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        room.skip().unwrap();

        wait_until("the next track to take over", || {
            room.playback()
                .current
                .map(|c| c.id == b.id)
                .unwrap_or_default()
                && room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        assert!(room.queue().is_empty());
    }

    #[tokio::test]
    async fn a_finished_track_advances_automatically() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(30)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let a = room.add_track(suggestion("A", "X")).unwrap();
        let b = room.add_track(suggestion("B", "Y")).unwrap();
        room.vote(a.id, 1).unwrap();

        room.play().unwrap();

        // With a 30ms duration the engine should end A and pull in B on its own
        wait_until("the engine to advance past the first track", || {
            room.playback()
                .current
                .map(|c| c.id == b.id)
                .unwrap_or_default()
        })
        .await;
    }

    #[tokio::test]
    async fn playback_goes_idle_when_the_queue_runs_dry() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(30)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        room.add_track(suggestion("A", "X")).unwrap();
        room.play().unwrap();

        wait_until("playback to settle into idle", || {
            let playback = room.playback();
            playback.phase == PlaybackPhase::Idle && playback.current.is_none()
        })
        .await;
    }

    #[tokio::test]
    async fn seek_clamps_to_the_track_duration() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(10_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        room.add_track(suggestion("A", "X")).unwrap();
        room.play().unwrap();

        wait_until("the track to start playing", || {
            room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        let after_seek = room.seek(999_999).unwrap();
        assert_eq!(after_seek.position_millis, 10_000);
    }

    #[tokio::test]
    async fn pause_freezes_the_reported_position() {
        let syncopate = syncopate_with(FlakyProvider::reliable(Some(300_000)), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        room.add_track(suggestion("A", "X")).unwrap();
        room.play().unwrap();

        wait_until("the track to start playing", || {
            room.playback().phase == PlaybackPhase::Playing
        })
        .await;

        let paused = room.pause().unwrap();
        assert_eq!(paused.phase, PlaybackPhase::Paused);

        let first = room.playback().position_millis;
        sleep(Duration::from_millis(50)).await;
        let second = room.playback().position_millis;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn restored_rooms_keep_their_queue_order() {
        let store = Arc::new(MemoryStore::new());
        let code = "R1";

        let expected: Vec<String> = {
            let providers = ProviderRegistry::new();
            providers.register(FlakyProvider::reliable(None));
            let syncopate = Syncopate::new(test_config(), providers, store.clone());

            let room = syncopate.rooms.get_or_create(code, params()).await;

            room.add_track(suggestion("A", "X")).unwrap();
            let b = room.add_track(suggestion("B", "Y")).unwrap();
            room.add_track(suggestion("C", "Z")).unwrap();
            room.vote(b.id, 2).unwrap();

            let expected: Vec<_> = room.queue().into_iter().map(|e| e.title).collect();
            assert_eq!(expected, vec!["B", "A", "C"]);

            // Persistence runs out of line; wait for the final write to land
            let mut persisted_titles = vec![];
            for _ in 0..500 {
                persisted_titles = store
                    .load(code)
                    .await
                    .ok()
                    .flatten()
                    .map(|p| p.entries.into_iter().map(|e| e.title).collect())
                    .unwrap_or_default();

                if persisted_titles == expected {
                    break;
                }

                sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(persisted_titles, expected);

            expected
        };

        // A fresh engine instance restores the same ordering
        let providers = ProviderRegistry::new();
        providers.register(FlakyProvider::reliable(None));
        let syncopate = Syncopate::new(test_config(), providers, store);

        let room = syncopate.rooms.get_or_create(code, params()).await;
        let restored: Vec<_> = room.queue().into_iter().map(|e| e.title).collect();

        assert_eq!(restored, expected);
    }

    #[tokio::test]
    async fn closed_rooms_reject_mutations() {
        let syncopate = syncopate_with(FlakyProvider::reliable(None), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        syncopate.rooms.close("R1").unwrap();

        assert!(matches!(
            room.add_track(suggestion("A", "X")),
            Err(RoomError::Inactive)
        ));
        assert!(matches!(room.play(), Err(RoomError::Inactive)));
        assert!(matches!(
            syncopate.rooms.room_by_code("R1"),
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn closing_a_room_ends_its_subscriptions() {
        let syncopate = syncopate_with(FlakyProvider::reliable(None), test_config());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        let mut handle = room.subscribe(member(1)).unwrap();

        syncopate.rooms.close("R1").unwrap();

        let outcome = timeout(Duration::from_secs(2), async {
            loop {
                match handle.next().await {
                    Some(RoomEvent::RoomClosed) => return true,
                    Some(_) => continue,
                    None => return false,
                }
            }
        })
        .await
        .expect("subscription drains in time");

        assert!(outcome, "subscribers hear about the close before the end");
    }

    #[tokio::test]
    async fn capacity_bounds_concurrent_subscribers() {
        let syncopate = syncopate_with(FlakyProvider::reliable(None), test_config());

        let room = syncopate
            .rooms
            .get_or_create(
                "R1",
                RoomParams {
                    capacity: Some(1),
                    ..params()
                },
            )
            .await;

        let first = room.subscribe(member(1)).unwrap();
        assert!(matches!(
            room.subscribe(member(2)),
            Err(RoomError::AtCapacity)
        ));

        // Freeing the slot lets the next member in
        drop(first);
        room.subscribe(member(2)).unwrap();
    }

    #[tokio::test]
    async fn unknown_providers_are_rejected_up_front() {
        let syncopate = Syncopate::new(test_config(), ProviderRegistry::new(), MemoryStore::new());
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        assert!(matches!(
            room.add_track(suggestion("A", "X")),
            Err(RoomError::ProviderNotFound(ProviderKind::YouTube))
        ));
    }

    #[tokio::test]
    async fn empty_rooms_idle_out_and_release_their_code() {
        let config = Config {
            idle_timeout: Duration::from_millis(50),
            ..test_config()
        };

        let syncopate = syncopate_with(FlakyProvider::reliable(None), config);
        let room = syncopate.rooms.get_or_create("R1", params()).await;

        // A subscriber keeps the room alive past the timeout
        let handle = room.subscribe(member(1)).unwrap();
        sleep(Duration::from_millis(120)).await;
        assert!(syncopate.rooms.room_by_code("R1").is_ok());

        // The last one leaving starts the countdown
        drop(handle);

        wait_until("the room to idle out", || {
            syncopate.rooms.room_by_code("R1").is_err()
        })
        .await;

        assert!(!room.is_active());
    }
}
