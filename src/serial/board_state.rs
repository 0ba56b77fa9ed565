use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::parser::{BoardId, BoardReading};

/// Copy of the board map taken under the lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    pub revision: u64,
    pub latest: BTreeMap<BoardId, BoardReading>,
}

#[derive(Default)]
struct BoardMap {
    latest: BTreeMap<BoardId, BoardReading>,
    revision: u64,
}

/// Latest reading per board plus a revision counter. Every serial reader
/// publishes into the same instance; stream consumers wait on `changed`.
#[derive(Default)]
pub struct SharedBoardState {
    inner: Mutex<BoardMap>,
    changed: Condvar,
}

impl SharedBoardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardMap> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the board's entry, bumps the revision by one and wakes every
    /// waiter. Returns the new revision.
    pub fn publish(&self, reading: BoardReading) -> u64 {
        let revision = {
            let mut guard = self.lock();
            guard.latest.insert(reading.board, reading);
            guard.revision += 1;
            guard.revision
        };
        self.changed.notify_all();
        revision
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let guard = self.lock();
        BoardSnapshot {
            revision: guard.revision,
            latest: guard.latest.clone(),
        }
    }

    /// Blocks until the revision moves past `seen` or `timeout` elapses, then
    /// returns a snapshot either way.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> BoardSnapshot {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |map| map.revision == seen)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        BoardSnapshot {
            revision: guard.revision,
            latest: guard.latest.clone(),
        }
    }
}
