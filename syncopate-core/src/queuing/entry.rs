use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Id, ProviderKind};

pub type EntryId = Id<QueueEntry>;

/// A track suggestion awaiting playback, ranked by votes.
///
/// Entries are immutable once added, except for their vote count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: EntryId,
    pub title: String,
    pub artist: String,
    pub provider: ProviderKind,
    /// Opaque provider-specific identifier, filled in lazily on resolution
    pub provider_ref: Option<String>,
    pub votes: i32,
    pub added_by: u64,
    pub added_at: DateTime<Utc>,
}

/// What callers submit when suggesting a track.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub artist: String,
    pub provider: ProviderKind,
    pub provider_ref: Option<String>,
    pub added_by: u64,
}

impl QueueEntry {
    pub fn new(suggestion: NewEntry) -> Self {
        Self {
            id: EntryId::new(),
            title: suggestion.title,
            artist: suggestion.artist,
            provider: suggestion.provider,
            provider_ref: suggestion.provider_ref,
            votes: 0,
            added_by: suggestion.added_by,
            added_at: Utc::now(),
        }
    }

    /// True when this entry points at the same suggested track.
    pub fn is_same_track(&self, title: &str, artist: &str) -> bool {
        self.title.eq_ignore_ascii_case(title) && self.artist.eq_ignore_ascii_case(artist)
    }
}
