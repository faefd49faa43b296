mod clock;

pub use clock::*;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{QueueEntry, StreamHandle};

/// The phase of a room's playback state machine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackPhase {
    /// Nothing is playing and nothing is being resolved
    #[default]
    Idle,
    /// A dequeued entry is waiting on provider resolution
    Resolving,
    Playing,
    Paused,
    /// The current track played through its full duration
    Ended,
}

/// An immutable point-in-time copy of a room's playback, suitable for broadcast.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub current: Option<QueueEntry>,
    pub position_millis: u64,
    pub is_playing: bool,
    /// When this snapshot was computed
    pub updated_at: DateTime<Utc>,
    pub stream: Option<StreamHandle>,
}

/// Tells a room session to resolve an entry out of line.
///
/// The generation guards against stale results: a skip or close bumps it,
/// and a result carrying an older generation is discarded on arrival.
#[derive(Debug, Clone)]
pub struct ResolveDirective {
    pub entry: QueueEntry,
    pub attempt: u32,
    pub generation: u64,
}

/// What `play` decided.
#[derive(Debug, PartialEq, Eq)]
pub enum PlayAction {
    /// Playback resumed from a pause, or was already running
    Resumed,
    /// There is no current track; the caller should dequeue one
    NeedsTrack,
    /// A resolution is already in flight, nothing to do
    Pending,
}

/// What a failed resolution attempt leads to.
#[derive(Debug)]
pub enum RetryDecision {
    /// The result belonged to a previous generation and was discarded
    Stale,
    Retry(ResolveDirective),
    /// The retry ceiling is exhausted; the entry is dropped for good
    Exhausted(QueueEntry),
}

/// Decides what plays next and drives the clock through the state machine.
///
/// The engine itself is synchronous; it runs under the owning room's
/// serialization point and hands out [ResolveDirective]s for the async work.
#[derive(Debug, Default)]
pub struct PlaybackEngine {
    phase: PlaybackPhase,
    current: Option<QueueEntry>,
    stream: Option<StreamHandle>,
    clock: PlaybackClock,
    attempts: u32,
    generation: u64,
    retry_limit: u32,
}

impl PlaybackEngine {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            ..Default::default()
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    /// Takes the next entry (or none) as the current track.
    ///
    /// With an entry this enters `Resolving` and returns the directive for
    /// the caller to spawn. Without one the engine settles into `Idle`.
    pub fn begin(&mut self, entry: Option<QueueEntry>) -> Option<ResolveDirective> {
        self.generation += 1;
        self.stream = None;
        self.clock.stop();

        match entry {
            Some(entry) => {
                self.phase = PlaybackPhase::Resolving;
                self.current = Some(entry.clone());
                self.attempts = 1;

                Some(ResolveDirective {
                    entry,
                    attempt: 1,
                    generation: self.generation,
                })
            }
            None => {
                self.phase = PlaybackPhase::Idle;
                self.current = None;
                None
            }
        }
    }

    /// Integrates a successful resolution. Returns false for stale results.
    pub fn resolution_succeeded(&mut self, generation: u64, stream: StreamHandle) -> bool {
        if generation != self.generation || self.phase != PlaybackPhase::Resolving {
            return false;
        }

        self.clock.start(stream.duration_millis);
        self.stream = Some(stream);
        self.phase = PlaybackPhase::Playing;

        true
    }

    /// Integrates a failed resolution attempt.
    pub fn resolution_failed(&mut self, generation: u64) -> RetryDecision {
        if generation != self.generation || self.phase != PlaybackPhase::Resolving {
            return RetryDecision::Stale;
        }

        if self.attempts < self.retry_limit {
            self.attempts += 1;

            let entry = self
                .current
                .clone()
                .expect("a resolving engine has a current entry");

            return RetryDecision::Retry(ResolveDirective {
                entry,
                attempt: self.attempts,
                generation: self.generation,
            });
        }

        // The track is dropped, never re-queued
        let entry = self
            .current
            .take()
            .expect("a resolving engine has a current entry");

        self.phase = PlaybackPhase::Idle;
        RetryDecision::Exhausted(entry)
    }

    pub fn play(&mut self) -> PlayAction {
        match self.phase {
            PlaybackPhase::Paused => {
                self.clock.resume();
                self.phase = PlaybackPhase::Playing;
                PlayAction::Resumed
            }
            PlaybackPhase::Playing => PlayAction::Resumed,
            PlaybackPhase::Resolving => PlayAction::Pending,
            PlaybackPhase::Idle | PlaybackPhase::Ended => PlayAction::NeedsTrack,
        }
    }

    pub fn pause(&mut self) {
        if self.phase == PlaybackPhase::Playing {
            self.clock.pause();
            self.phase = PlaybackPhase::Paused;
        }
    }

    /// Drops the current track and invalidates any in-flight resolution.
    /// Returns the dropped entry, if there was one.
    pub fn skip(&mut self) -> Option<QueueEntry> {
        self.generation += 1;
        self.stream = None;
        self.clock.stop();
        self.phase = PlaybackPhase::Idle;

        self.current.take()
    }

    /// Seeks within the current track. A seek with no current track is a
    /// no-op; there is nothing to clamp against.
    pub fn seek(&mut self, position_millis: u64) {
        if self.current.is_some() {
            self.clock.seek(position_millis);
        }
    }

    /// Advances the clock check. Returns true when the current track just
    /// played through its full duration.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.phase == PlaybackPhase::Playing && self.clock.has_ended_at(now) {
            self.phase = PlaybackPhase::Ended;
            self.clock.pause();
            return true;
        }

        false
    }

    pub fn position_millis(&self) -> u64 {
        self.clock.current_position()
    }

    pub fn snapshot(&self) -> PlaybackState {
        PlaybackState {
            phase: self.phase,
            current: self.current.clone(),
            position_millis: self.clock.current_position(),
            is_playing: self.is_playing(),
            updated_at: Utc::now(),
            stream: self.stream.clone(),
        }
    }
}
