use std::time::Instant;

/// The authoritative position of the currently playing track.
///
/// Instead of counting ticks, the clock stores the position at the last
/// mutation and derives the current position from wall-clock time elapsed
/// since then. Scheduling jitter in the tick task therefore never
/// accumulates into drift.
#[derive(Debug)]
pub struct PlaybackClock {
    /// Position in milliseconds at the time of `updated_at`
    position: u64,
    /// Track length in milliseconds, when known
    duration: Option<u64>,
    playing: bool,
    updated_at: Instant,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            position: 0,
            duration: None,
            playing: false,
            updated_at: Instant::now(),
        }
    }

    /// Starts the clock at position zero for a new track.
    pub fn start(&mut self, duration: Option<u64>) {
        self.position = 0;
        self.duration = duration;
        self.playing = true;
        self.updated_at = Instant::now();
    }

    /// Resumes from wherever the clock was paused.
    pub fn resume(&mut self) {
        if self.playing {
            return;
        }

        self.playing = true;
        self.updated_at = Instant::now();
    }

    /// Freezes the position at its current value.
    pub fn pause(&mut self) {
        self.sync(Instant::now());
        self.playing = false;
    }

    /// Moves to `position`, clamped to the track's duration.
    pub fn seek(&mut self, position: u64) {
        self.position = self.clamp(position);
        self.updated_at = Instant::now();
    }

    /// Clears the clock back to an idle state.
    pub fn stop(&mut self) {
        self.position = 0;
        self.duration = None;
        self.playing = false;
        self.updated_at = Instant::now();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// The drift-corrected position as of `now`.
    ///
    /// Pure with respect to stored state; two calls with the same `now`
    /// always agree.
    pub fn position_at(&self, now: Instant) -> u64 {
        if !self.playing {
            return self.position;
        }

        let elapsed = now.saturating_duration_since(self.updated_at);
        self.clamp(self.position + elapsed.as_millis() as u64)
    }

    pub fn current_position(&self) -> u64 {
        self.position_at(Instant::now())
    }

    /// Whether the track has played through its full duration as of `now`.
    /// Tracks with unknown duration never end on their own.
    pub fn has_ended_at(&self, now: Instant) -> bool {
        match self.duration {
            Some(duration) => self.position_at(now) >= duration,
            None => false,
        }
    }

    /// Folds elapsed time into the stored position.
    fn sync(&mut self, now: Instant) {
        self.position = self.position_at(now);
        self.updated_at = now;
    }

    fn clamp(&self, position: u64) -> u64 {
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::PlaybackClock;

    #[test]
    fn advances_with_elapsed_time_while_playing() {
        let mut clock = PlaybackClock::new();
        clock.start(Some(300_000));

        let base = Instant::now();
        let earlier = clock.position_at(base);
        let later = clock.position_at(base + Duration::from_millis(1500));

        assert_eq!(later - earlier, 1500);
    }

    #[test]
    fn holds_still_while_paused() {
        let mut clock = PlaybackClock::new();
        clock.start(Some(300_000));
        clock.seek(42_000);
        clock.pause();

        let base = Instant::now();
        let first = clock.position_at(base);
        let second = clock.position_at(base + Duration::from_secs(10));

        assert_eq!(first, second);
        assert_eq!(first, 42_000);
    }

    #[test]
    fn clamps_to_duration() {
        let mut clock = PlaybackClock::new();
        clock.start(Some(10_000));

        let base = Instant::now();
        assert_eq!(clock.position_at(base + Duration::from_secs(60)), 10_000);

        clock.seek(99_999);
        assert_eq!(clock.position_at(base), 10_000);
    }

    #[test]
    fn reports_end_of_track() {
        let mut clock = PlaybackClock::new();
        clock.start(Some(1_000));

        let base = Instant::now();
        assert!(!clock.has_ended_at(base));
        assert!(clock.has_ended_at(base + Duration::from_millis(1_001)));
    }

    #[test]
    fn unknown_duration_never_ends() {
        let mut clock = PlaybackClock::new();
        clock.start(None);

        assert!(!clock.has_ended_at(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn resume_does_not_replay_paused_time() {
        let mut clock = PlaybackClock::new();
        clock.start(Some(300_000));
        clock.pause();

        let paused_at = clock.current_position();

        clock.resume();
        let resumed = clock.current_position();

        // Time spent paused does not count towards the position
        assert!(resumed.saturating_sub(paused_at) < 50);
    }
}
