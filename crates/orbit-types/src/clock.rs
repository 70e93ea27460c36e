use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lamport clock attached to every log entry.
///
/// `id` is the hex public key of the writer that ticked the clock and `time`
/// only ever increases for that writer. Clocks are totally ordered by
/// `time`, then lexicographically by `id`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clock {
    pub id: String,
    pub time: u64,
}

impl Clock {
    pub fn new(id: impl Into<String>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// A clock one step after this one, for the same writer.
    pub fn tick(&self) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Keep this clock's writer, take the greater of both times.
    pub fn merge(&self, other: &Clock) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time.max(other.time),
        }
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.id.get(..8).unwrap_or(&self.id);
        write!(f, "Clock({short}@{})", self.time)
    }
}
