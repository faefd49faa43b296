use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type IdType = u64;
pub static ID_COUNTER: AtomicCell<IdType> = AtomicCell::new(1);

/// A unique identifier for any type.
///
/// Ids are allocated from a process-wide counter, so within a process they
/// are strictly increasing in allocation order.
pub struct Id<T> {
    value: IdType,
    kind: PhantomData<T>,
}

impl<T> Id<T> {
    /// Creates a new id.
    pub fn new() -> Self {
        Self {
            value: ID_COUNTER.fetch_add(1),
            kind: PhantomData,
        }
    }

    /// Returns an empty id.
    pub fn none() -> Self {
        Self {
            value: 0,
            kind: PhantomData,
        }
    }

    pub fn value(&self) -> IdType {
        self.value
    }

    /// Moves the counter past `value`, so ids allocated after a restore are
    /// still greater than every restored id.
    pub fn ensure_after(value: IdType) {
        loop {
            let current = ID_COUNTER.load();

            if current > value {
                break;
            }

            if ID_COUNTER
                .compare_exchange(current, value + 1)
                .is_ok()
            {
                break;
            }
        }
    }
}

impl<T> From<IdType> for Id<T> {
    fn from(value: IdType) -> Self {
        Self {
            value,
            kind: PhantomData,
        }
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}
impl<T> Eq for Id<T> {}

impl<T> Serialize for Id<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.value)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        IdType::deserialize(deserializer).map(|value| Self {
            value,
            kind: PhantomData,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Id, ID_COUNTER};

    struct Marker;

    #[test]
    fn ids_increase_monotonically() {
        let first: Id<Marker> = Id::new();
        let second: Id<Marker> = Id::new();

        assert!(second > first);
    }

    #[test]
    fn ensure_after_moves_the_counter() {
        let target = ID_COUNTER.load() + 500;
        Id::<Marker>::ensure_after(target);

        let next: Id<Marker> = Id::new();
        assert!(next.value() > target);

        // Already-passed values leave the counter alone
        Id::<Marker>::ensure_after(1);
        let after: Id<Marker> = Id::new();
        assert!(after > next);
    }
}
