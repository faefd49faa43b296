use crate::{Member, PlaybackState, QueueEntry};

/// Describes the events a room broadcasts to its subscribers.
///
/// Within one room, subscribers observe these in the order they were
/// produced; there is no ordering across rooms.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The playback state machine transitioned
    PlaybackUpdate { playback: PlaybackState },
    /// Periodic position report while a track is playing
    PositionUpdate { position_millis: u64 },
    /// The queue was mutated and re-ranked
    QueueUpdate { entries: Vec<QueueEntry> },
    /// An entry exhausted its resolution attempts and was skipped
    TrackFailed { entry: QueueEntry, error: String },
    /// A member subscribed to the room
    MemberJoined { member: Member },
    /// A member's subscription ended, by disconnect or eviction
    MemberLeft { member_id: u64 },
    /// The room was closed; no further events will arrive
    RoomClosed,
}
