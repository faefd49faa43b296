use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use log::{info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    EntryId, Member, NewEntry, PersistedPlayback, PersistedRoom, PlayAction, PlaybackEngine,
    PlaybackState, ProviderError, QueueEntry, QueueManager, ResolveDirective, RetryDecision,
    RoomEvent, StreamHandle, SubscriptionHandle, SubscriptionId, SyncopateContext,
};

use super::RoomError;

/// Creation parameters, supplied by the external room management layer.
#[derive(Debug, Clone)]
pub struct RoomParams {
    pub name: String,
    pub capacity: Option<usize>,
    pub host_id: u64,
}

/// Descriptive data about a room.
#[derive(Debug, Clone)]
pub struct RoomData {
    pub code: String,
    pub name: String,
    pub capacity: Option<usize>,
    pub host_id: u64,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// A syncopate room: one queue, one playback engine, and the subscribers
/// listening along.
///
/// Every state mutation goes through the single `state` mutex, which is the
/// room's serialization point. Provider resolution and persistence writes
/// run out of line and re-enter the mutex to integrate their results, so a
/// slow network call never stalls queue or vote operations.
pub struct Room {
    context: SyncopateContext,

    code: String,
    name: String,
    capacity: Option<usize>,
    host_id: u64,
    created_at: DateTime<Utc>,

    active: AtomicCell<bool>,
    state: Mutex<RoomState>,
    idle_since: Mutex<Option<Instant>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

struct RoomState {
    queue: QueueManager,
    engine: PlaybackEngine,
}

impl Room {
    pub fn new(
        context: &SyncopateContext,
        code: String,
        params: RoomParams,
        restored: Vec<QueueEntry>,
    ) -> Self {
        let config = &context.config;

        let queue = if restored.is_empty() {
            QueueManager::new(config.max_queue_size)
        } else {
            info!("Restoring {} queued tracks for room {}", restored.len(), code);
            QueueManager::with_entries(config.max_queue_size, restored)
        };

        Self {
            context: context.clone(),
            code,
            name: params.name,
            capacity: params.capacity,
            host_id: params.host_id,
            created_at: Utc::now(),
            active: AtomicCell::new(true),
            state: Mutex::new(RoomState {
                queue,
                engine: PlaybackEngine::new(config.retry_limit),
            }),
            idle_since: Default::default(),
            tick_task: Default::default(),
        }
    }

    /// Starts the room's periodic clock tick.
    pub fn start(&self) {
        let context = self.context.clone();
        let code = self.code.clone();
        let interval = self.context.config.tick_interval;

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);

            loop {
                timer.tick().await;

                match context.rooms.get(&code) {
                    Some(room) => room.tick(),
                    None => break,
                }
            }
        });

        *self.tick_task.lock() = Some(task);
    }

    /// Suggests a track for the queue.
    pub fn add_track(&self, suggestion: NewEntry) -> Result<QueueEntry, RoomError> {
        self.ensure_active()?;

        if !self.context.providers.contains(suggestion.provider) {
            return Err(RoomError::ProviderNotFound(suggestion.provider));
        }

        let mut state = self.state.lock();
        let entry = state.queue.add(suggestion)?;

        info!(
            "\"{}\" by \"{}\" was added to room {}",
            entry.title, entry.artist, self.code
        );

        self.publish_queue(&state);
        self.persist(&state);

        Ok(entry)
    }

    /// Applies a vote delta to a queue entry.
    pub fn vote(&self, entry_id: EntryId, delta: i32) -> Result<QueueEntry, RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();
        let entry = state.queue.vote(entry_id, delta)?;

        self.publish_queue(&state);
        self.persist(&state);

        Ok(entry)
    }

    /// Removes a pending entry from the queue.
    pub fn remove_track(&self, entry_id: EntryId) -> Result<(), RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();
        state.queue.remove(entry_id)?;

        self.publish_queue(&state);
        self.persist(&state);

        Ok(())
    }

    /// Starts or resumes playback.
    pub fn play(&self) -> Result<PlaybackState, RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();

        match state.engine.play() {
            PlayAction::Resumed => self.publish_playback(&state),
            PlayAction::NeedsTrack => self.advance(&mut state),
            PlayAction::Pending => {}
        }

        Ok(state.engine.snapshot())
    }

    pub fn pause(&self) -> Result<PlaybackState, RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();
        state.engine.pause();

        self.publish_playback(&state);
        Ok(state.engine.snapshot())
    }

    /// Drops the current track and immediately moves on to the next entry.
    pub fn skip(&self) -> Result<PlaybackState, RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();

        if let Some(dropped) = state.engine.skip() {
            info!("\"{}\" was skipped in room {}", dropped.title, self.code);
        }

        self.advance(&mut state);
        Ok(state.engine.snapshot())
    }

    /// Seeks within the current track.
    pub fn seek(&self, position_millis: u64) -> Result<PlaybackState, RoomError> {
        self.ensure_active()?;

        let mut state = self.state.lock();
        state.engine.seek(position_millis);

        self.publish_playback(&state);
        Ok(state.engine.snapshot())
    }

    /// The current playback snapshot.
    pub fn playback(&self) -> PlaybackState {
        self.state.lock().engine.snapshot()
    }

    /// The current ranked queue.
    pub fn queue(&self) -> Vec<QueueEntry> {
        self.state.lock().queue.snapshot()
    }

    /// Subscribes a member's connection to this room's events.
    ///
    /// The new subscriber immediately receives the current playback and
    /// queue snapshots, so clients are in sync from the first message.
    pub fn subscribe(&self, member: Member) -> Result<SubscriptionHandle, RoomError> {
        self.ensure_active()?;

        let hub = &self.context.hub;

        if let Some(capacity) = self.capacity {
            if hub.subscriber_count(&self.code) >= capacity {
                return Err(RoomError::AtCapacity);
            }
        }

        let handle = hub.subscribe(&self.code, member);
        *self.idle_since.lock() = None;

        let state = self.state.lock();
        hub.send(
            &self.code,
            handle.id(),
            RoomEvent::PlaybackUpdate {
                playback: state.engine.snapshot(),
            },
        );
        hub.send(
            &self.code,
            handle.id(),
            RoomEvent::QueueUpdate {
                entries: state.queue.snapshot(),
            },
        );

        Ok(handle)
    }

    /// Stamps a subscriber of this room as alive.
    /// Returns false for unknown subscriptions.
    pub fn heartbeat(&self, subscription: SubscriptionId) -> bool {
        self.context.hub.heartbeat(&self.code, subscription)
    }

    /// One clock advancement. Submitted on the room's schedule, serialized
    /// with every other mutation.
    pub fn tick(&self) {
        if !self.active.load() {
            return;
        }

        let mut state = self.state.lock();

        if state.engine.tick(Instant::now()) {
            info!("Track ended in room {}, moving on", self.code);
            self.advance(&mut state);
        } else if state.engine.is_playing() {
            self.context.hub.broadcast(
                &self.code,
                RoomEvent::PositionUpdate {
                    position_millis: state.engine.position_millis(),
                },
            );
        }
    }

    /// Integrates an out-of-line resolution result.
    pub fn complete_resolution(
        &self,
        directive: ResolveDirective,
        result: Result<StreamHandle, ProviderError>,
    ) {
        if !self.active.load() {
            return;
        }

        let mut state = self.state.lock();

        match result {
            Ok(stream) => {
                if state.engine.resolution_succeeded(directive.generation, stream) {
                    info!(
                        "Now playing \"{}\" by \"{}\" in room {}",
                        directive.entry.title, directive.entry.artist, self.code
                    );

                    self.publish_playback(&state);
                    self.persist(&state);
                }
            }
            Err(error) => match state.engine.resolution_failed(directive.generation) {
                RetryDecision::Retry(retry) => {
                    warn!(
                        "Resolution attempt {} for \"{}\" in room {} failed: {}",
                        directive.attempt, directive.entry.title, self.code, error
                    );

                    self.spawn_resolution(retry);
                }
                RetryDecision::Exhausted(entry) => {
                    warn!(
                        "Giving up on \"{}\" in room {} after {} attempts: {}",
                        entry.title, self.code, directive.attempt, error
                    );

                    self.context.hub.broadcast(
                        &self.code,
                        RoomEvent::TrackFailed {
                            entry,
                            error: error.to_string(),
                        },
                    );

                    self.advance(&mut state);
                }
                RetryDecision::Stale => {}
            },
        }
    }

    /// Marks idle time and reports whether the idle timeout has lapsed.
    /// Any live subscriber resets the countdown.
    pub fn idle_timed_out(&self, timeout: Duration) -> bool {
        if self.context.hub.subscriber_count(&self.code) > 0 {
            *self.idle_since.lock() = None;
            return false;
        }

        let mut idle = self.idle_since.lock();

        match *idle {
            Some(since) => since.elapsed() > timeout,
            None => {
                *idle = Some(Instant::now());
                false
            }
        }
    }

    /// Shuts the room down. The only fatal path a room has.
    ///
    /// Cancels the tick schedule, invalidates any in-flight resolution, and
    /// drops every subscription. With `wipe_store`, the persisted queue is
    /// removed as well; an idle-timeout shutdown keeps it so a re-created
    /// room picks its queue back up.
    pub fn shutdown(&self, wipe_store: bool) {
        if !self.active.swap(false) {
            return;
        }

        info!("Closing room {}", self.code);

        {
            // Invalidates any in-flight resolution
            let mut state = self.state.lock();
            let _ = state.engine.skip();
        }

        if let Some(task) = self.tick_task.lock().take() {
            task.abort();
        }

        let hub = &self.context.hub;
        hub.broadcast(&self.code, RoomEvent::RoomClosed);
        hub.drop_room(&self.code);

        if wipe_store && self.context.config.persistence_enabled {
            let store = self.context.store.clone();
            let code = self.code.clone();

            tokio::spawn(async move {
                if let Err(error) = store.clear(&code).await {
                    warn!("Failed to clear persisted state for room {}: {}", code, error);
                }
            });
        }
    }

    pub fn data(&self) -> RoomData {
        RoomData {
            code: self.code.clone(),
            name: self.name.clone(),
            capacity: self.capacity,
            host_id: self.host_id,
            created_at: self.created_at,
            active: self.active.load(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_active(&self) -> bool {
        self.active.load()
    }

    fn ensure_active(&self) -> Result<(), RoomError> {
        if self.active.load() {
            Ok(())
        } else {
            Err(RoomError::Inactive)
        }
    }

    /// Dequeues the next entry and starts resolving it, settling into idle
    /// when the queue is empty. Callers hold the state lock.
    fn advance(&self, state: &mut RoomState) {
        let next = state.queue.pop_next();

        if let Some(directive) = state.engine.begin(next) {
            self.spawn_resolution(directive);
        }

        self.publish_playback(state);
        self.publish_queue(state);
        self.persist(state);
    }

    /// Runs provider resolution as an out-of-line task, so the room's
    /// serialization point is free while the network call is in flight.
    fn spawn_resolution(&self, directive: ResolveDirective) {
        let context = self.context.clone();
        let code = self.code.clone();

        tokio::spawn(async move {
            let config = &context.config;

            if directive.attempt > 1 {
                tokio::time::sleep(config.retry_backoff).await;
            }

            let provider = context.providers.get(directive.entry.provider);

            let result = match provider {
                Some(provider) => {
                    let resolution =
                        provider.resolve(&directive.entry.title, &directive.entry.artist);

                    match tokio::time::timeout(config.resolve_timeout, resolution).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Unavailable(
                            "resolution timed out".to_string(),
                        )),
                    }
                }
                None => Err(ProviderError::Unavailable(format!(
                    "no provider registered for {}",
                    directive.entry.provider
                ))),
            };

            // The room may have been closed while we were resolving; a
            // missing room discards the result.
            if let Some(room) = context.rooms.get(&code) {
                room.complete_resolution(directive, result);
            }
        });
    }

    fn publish_playback(&self, state: &RoomState) {
        self.context.hub.broadcast(
            &self.code,
            RoomEvent::PlaybackUpdate {
                playback: state.engine.snapshot(),
            },
        );
    }

    fn publish_queue(&self, state: &RoomState) {
        self.context.hub.broadcast(
            &self.code,
            RoomEvent::QueueUpdate {
                entries: state.queue.snapshot(),
            },
        );
    }

    /// Best-effort persistence. Failures are logged and never surfaced to
    /// the caller of the mutation that triggered the write.
    fn persist(&self, state: &RoomState) {
        if !self.context.config.persistence_enabled {
            return;
        }

        let data = PersistedRoom {
            entries: state.queue.snapshot(),
            playback: state.engine.current().map(|entry| PersistedPlayback {
                entry: entry.clone(),
                position_millis: state.engine.position_millis(),
            }),
        };

        let store = self.context.store.clone();
        let code = self.code.clone();

        tokio::spawn(async move {
            if let Err(error) = store.save(&code, &data).await {
                warn!("Failed to persist state for room {}: {}", code, error);
            }
        });
    }
}
