//! Ordered deadline queue.

use crate::clock::now_secs;
use crate::vote::VoteId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Relative wait reported when nothing is scheduled.
pub const MAX: i64 = i32::MAX as i64;

/// A vote id due for processing at an absolute unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub id: VoteId,
    pub at: u64,
}

/// Deadlines in ascending order. Equal deadlines keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    queue: VecDeque<Deadline>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, sorting them stably.
    pub fn from_entries(entries: impl IntoIterator<Item = Deadline>) -> Self {
        let mut schedule = Self::new();
        for entry in entries {
            schedule.insert(entry.id, entry.at);
        }
        schedule
    }

    /// Insert after every entry due at or before `at`. Returns true if the
    /// new entry is now the earliest.
    pub fn insert(&mut self, id: VoteId, at: u64) -> bool {
        let pos = self.queue.partition_point(|d| d.at <= at);
        self.queue.insert(pos, Deadline { id, at });
        pos == 0
    }

    /// Earliest absolute deadline, if any.
    pub fn next_abs(&self) -> Option<u64> {
        self.queue.front().map(|d| d.at)
    }

    /// Seconds until the earliest deadline (negative when overdue), or
    /// [`MAX`] when empty.
    pub fn next_rel(&self) -> i64 {
        self.next_rel_at(now_secs())
    }

    pub fn next_rel_at(&self, now: u64) -> i64 {
        match self.next_abs() {
            Some(at) => at as i64 - now as i64,
            None => MAX,
        }
    }

    /// Remove and return the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<Deadline> {
        match self.queue.front() {
            Some(d) if d.at <= now => self.queue.pop_front(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn entries(&self) -> Vec<Deadline> {
        self.queue.iter().copied().collect()
    }
}
