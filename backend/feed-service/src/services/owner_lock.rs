use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutexes serializing writes to one owner's feed.
///
/// Process-local only: a rebuild on one replica can still race a fan-out
/// write on another, and the later write wins. An owner's entry lives only
/// while someone holds or waits on it.
#[derive(Default)]
pub struct OwnerLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Held lock on one owner. Dropping the last interest removes the entry.
pub struct OwnerGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    owner: Uuid,
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        // release first so our own clone no longer counts
        self.guard.take();
        self.locks
            .remove_if(&self.owner, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, owner: Uuid) -> OwnerGuard<'_> {
        let mutex = self
            .locks
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        OwnerGuard {
            guard: Some(mutex.lock_owned().await),
            owner,
            locks: &self.locks,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
