use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-collection exclusive locks.
///
/// Every operation that rewrites a collection's navigation structure or the
/// memberships hanging off its documents takes this lock first and opens its
/// transaction second, so structural reads and writes for one collection
/// never interleave. Different collections proceed in parallel.
///
/// The registry itself is guarded by a `parking_lot` mutex and only touched
/// long enough to clone out the per-collection handle; the handle is an
/// async mutex that may be held across the whole transaction.
#[derive(Clone, Default)]
pub struct CollectionLocks {
    inner: Arc<parking_lot::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

pub type CollectionGuard = OwnedMutexGuard<()>;

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, collection_id: Uuid) -> Arc<Mutex<()>> {
        let mut registry = self.inner.lock();
        registry
            .entry(collection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to one collection.
    pub async fn acquire(&self, collection_id: Uuid) -> CollectionGuard {
        self.handle(collection_id).lock_owned().await
    }

    /// Wait for exclusive access to two collections at once, as a
    /// cross-collection move needs. Locks are taken in id order no matter
    /// which way the caller passed them, so two concurrent movers cannot
    /// deadlock each other. Passing the same id twice yields one guard.
    pub async fn acquire_pair(
        &self,
        first: Uuid,
        second: Uuid,
    ) -> (CollectionGuard, Option<CollectionGuard>) {
        if first == second {
            return (self.acquire(first).await, None);
        }

        let (lo, hi) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        let lo_guard = self.acquire(lo).await;
        let hi_guard = self.acquire(hi).await;
        (lo_guard, Some(hi_guard))
    }
}
