//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from core types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncopate_core::{
    Member as CoreMember, PlaybackPhase as CorePhase, PlaybackState as CorePlayback, ProviderKind,
    QueueEntry as CoreEntry, RoomData, StreamHandle as CoreStream,
};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    YouTube,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Room {
    pub code: String,
    pub name: String,
    pub capacity: Option<usize>,
    pub host_id: u64,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub members: Vec<Member>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Member {
    pub id: u64,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueEntry {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub provider: Provider,
    pub votes: i32,
    pub added_by: u64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackPhase {
    Idle,
    Resolving,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Stream {
    pub url: String,
    pub duration_millis: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub current: Option<QueueEntry>,
    pub position_millis: u64,
    pub is_playing: bool,
    pub updated_at: DateTime<Utc>,
    pub stream: Option<Stream>,
}

impl From<Provider> for ProviderKind {
    fn from(value: Provider) -> Self {
        match value {
            Provider::YouTube => ProviderKind::YouTube,
        }
    }
}

impl From<ProviderKind> for Provider {
    fn from(value: ProviderKind) -> Self {
        match value {
            ProviderKind::YouTube => Provider::YouTube,
        }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<Option<O>> for Option<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Option<O> {
        self.as_ref().map(|x| x.to_serialized())
    }
}

impl ToSerialized<Member> for CoreMember {
    fn to_serialized(&self) -> Member {
        Member {
            id: self.id,
            display_name: self.display_name.clone(),
            joined_at: self.joined_at,
        }
    }
}

impl ToSerialized<QueueEntry> for CoreEntry {
    fn to_serialized(&self) -> QueueEntry {
        QueueEntry {
            id: self.id.value(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            provider: self.provider.into(),
            votes: self.votes,
            added_by: self.added_by,
            added_at: self.added_at,
        }
    }
}

impl ToSerialized<PlaybackPhase> for CorePhase {
    fn to_serialized(&self) -> PlaybackPhase {
        match self {
            CorePhase::Idle => PlaybackPhase::Idle,
            CorePhase::Resolving => PlaybackPhase::Resolving,
            CorePhase::Playing => PlaybackPhase::Playing,
            CorePhase::Paused => PlaybackPhase::Paused,
            CorePhase::Ended => PlaybackPhase::Ended,
        }
    }
}

impl ToSerialized<Stream> for CoreStream {
    fn to_serialized(&self) -> Stream {
        Stream {
            url: self.url.clone(),
            duration_millis: self.duration_millis,
        }
    }
}

impl ToSerialized<PlaybackState> for CorePlayback {
    fn to_serialized(&self) -> PlaybackState {
        PlaybackState {
            phase: self.phase.to_serialized(),
            current: self.current.to_serialized(),
            position_millis: self.position_millis,
            is_playing: self.is_playing,
            updated_at: self.updated_at,
            stream: self.stream.to_serialized(),
        }
    }
}

/// Rooms carry their live member roster, which lives in the hub rather than
/// the room data; callers pass it in alongside.
pub fn serialize_room(data: RoomData, members: &[CoreMember]) -> Room {
    Room {
        code: data.code,
        name: data.name,
        capacity: data.capacity,
        host_id: data.host_id,
        created_at: data.created_at,
        active: data.active,
        members: members.to_vec().to_serialized(),
    }
}
