mod entry;

pub use entry::*;

use thiserror::Error;

use crate::Id;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is at its maximum size of {0}")]
    QueueFull(usize),
    #[error("\"{title}\" by \"{artist}\" is already in the queue")]
    DuplicateEntry { title: String, artist: String },
    #[error("Queue entry {0} does not exist")]
    EntryNotFound(EntryId),
}

/// The ordered, vote-ranked list of pending tracks for a room.
///
/// Ordering is a total order: votes descending, then earliest `added_at`,
/// then entry id. The last tie-break matters when two entries are added
/// within the same clock instant.
#[derive(Debug)]
pub struct QueueManager {
    max_size: usize,
    entries: Vec<QueueEntry>,
}

impl QueueManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: Vec::new(),
        }
    }

    /// Rebuilds a queue from persisted entries, restoring the ranked order
    /// and moving the id counter past every restored id.
    pub fn with_entries(max_size: usize, entries: Vec<QueueEntry>) -> Self {
        if let Some(highest) = entries.iter().map(|e| e.id.value()).max() {
            Id::<QueueEntry>::ensure_after(highest);
        }

        let mut queue = Self { max_size, entries };
        queue.resort();
        queue
    }

    /// Adds a suggestion to the queue.
    ///
    /// A full queue rejects new entries; callers must remove something to
    /// make room.
    pub fn add(&mut self, suggestion: NewEntry) -> Result<QueueEntry, QueueError> {
        if self.entries.len() >= self.max_size {
            return Err(QueueError::QueueFull(self.max_size));
        }

        let duplicate = self
            .entries
            .iter()
            .any(|e| e.is_same_track(&suggestion.title, &suggestion.artist));

        if duplicate {
            return Err(QueueError::DuplicateEntry {
                title: suggestion.title,
                artist: suggestion.artist,
            });
        }

        let entry = QueueEntry::new(suggestion);
        self.entries.push(entry.clone());
        self.resort();

        Ok(entry)
    }

    /// Applies a vote delta to an entry and re-ranks the queue.
    pub fn vote(&mut self, id: EntryId, delta: i32) -> Result<QueueEntry, QueueError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;

        entry.votes = entry.votes.saturating_add(delta);
        let updated = entry.clone();

        self.resort();
        Ok(updated)
    }

    pub fn remove(&mut self, id: EntryId) -> Result<(), QueueError> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;

        self.entries.remove(position);
        Ok(())
    }

    /// The entry that would play next, without removing it.
    pub fn peek_next(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    /// Removes and returns the head of the queue.
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }

        Some(self.entries.remove(0))
    }

    /// An ordered copy of the pending entries, suitable for broadcast.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(a.added_at.cmp(&b.added_at))
                .then(a.id.cmp(&b.id))
        });
    }
}

#[cfg(test)]
mod test {
    use super::{NewEntry, QueueError, QueueManager};
    use crate::ProviderKind;

    fn suggestion(title: &str, artist: &str) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            artist: artist.to_string(),
            provider: ProviderKind::YouTube,
            provider_ref: None,
            added_by: 1,
        }
    }

    fn titles(queue: &QueueManager) -> Vec<String> {
        queue.snapshot().into_iter().map(|e| e.title).collect()
    }

    #[test]
    fn orders_by_votes_then_insertion() {
        let mut queue = QueueManager::new(10);

        let a = queue.add(suggestion("a", "x")).unwrap();
        let b = queue.add(suggestion("b", "y")).unwrap();
        let c = queue.add(suggestion("c", "z")).unwrap();

        // Equal votes keep insertion order
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);

        queue.vote(b.id, 1).unwrap();
        assert_eq!(titles(&queue), vec!["b", "a", "c"]);

        queue.vote(c.id, 2).unwrap();
        queue.vote(a.id, -1).unwrap();
        assert_eq!(titles(&queue), vec!["c", "b", "a"]);
    }

    #[test]
    fn ordering_holds_under_arbitrary_vote_sequences() {
        let mut queue = QueueManager::new(50);

        let entries: Vec<_> = (0..20)
            .map(|i| queue.add(suggestion(&format!("track-{i}"), "artist")).unwrap())
            .collect();

        let deltas = [3, -2, 1, 5, -1, 0, 2, -4];
        for (i, entry) in entries.iter().enumerate() {
            queue.vote(entry.id, deltas[i % deltas.len()]).unwrap();
        }

        let snapshot = queue.snapshot();
        for pair in snapshot.windows(2) {
            let ordered = pair[0].votes > pair[1].votes
                || (pair[0].votes == pair[1].votes && pair[0].added_at <= pair[1].added_at);
            assert!(ordered, "queue lost its ranked order");
        }
    }

    #[test]
    fn rejects_when_full_without_mutating() {
        let mut queue = QueueManager::new(2);

        queue.add(suggestion("a", "x")).unwrap();
        queue.add(suggestion("b", "y")).unwrap();

        let result = queue.add(suggestion("c", "z"));
        assert_eq!(result.unwrap_err(), QueueError::QueueFull(2));
        assert_eq!(titles(&queue), vec!["a", "b"]);

        // Removing makes room again
        let head = queue.pop_next().unwrap();
        assert_eq!(head.title, "a");
        queue.add(suggestion("c", "z")).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn rejects_duplicate_suggestions() {
        let mut queue = QueueManager::new(10);

        queue.add(suggestion("Same Song", "Same Artist")).unwrap();
        let result = queue.add(suggestion("same song", "SAME ARTIST"));

        assert!(matches!(result, Err(QueueError::DuplicateEntry { .. })));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn vote_on_missing_entry_leaves_queue_unchanged() {
        let mut queue = QueueManager::new(10);
        let entry = queue.add(suggestion("a", "x")).unwrap();

        let bogus = {
            let other = queue.add(suggestion("b", "y")).unwrap();
            queue.remove(other.id).unwrap();
            other.id
        };

        let before = queue.snapshot();
        let result = queue.vote(bogus, 1);

        assert_eq!(result.unwrap_err(), QueueError::EntryNotFound(bogus));

        let after = queue.snapshot();
        assert_eq!(before.len(), after.len());
        assert_eq!(after[0].id, entry.id);
        assert_eq!(after[0].votes, 0);
    }

    #[test]
    fn pop_returns_highest_ranked_first() {
        let mut queue = QueueManager::new(10);

        queue.add(suggestion("a", "x")).unwrap();
        let b = queue.add(suggestion("b", "y")).unwrap();
        queue.vote(b.id, 1).unwrap();

        assert_eq!(queue.peek_next().unwrap().id, b.id);
        assert_eq!(queue.pop_next().unwrap().id, b.id);
        assert_eq!(titles(&queue), vec!["a"]);
    }

    #[test]
    fn restores_persisted_entries_in_ranked_order() {
        let mut queue = QueueManager::new(10);

        queue.add(suggestion("a", "x")).unwrap();
        let b = queue.add(suggestion("b", "y")).unwrap();
        queue.vote(b.id, 3).unwrap();

        // Persisted order may be arbitrary; restore re-ranks it
        let mut persisted = queue.snapshot();
        persisted.reverse();

        let restored = QueueManager::with_entries(10, persisted);
        assert_eq!(titles(&restored), titles(&queue));

        // New entries still rank below restored ids on equal votes
        let mut restored = restored;
        let fresh = restored.add(suggestion("c", "z")).unwrap();
        assert!(fresh.id > b.id);
    }
}
