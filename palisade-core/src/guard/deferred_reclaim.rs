//! Deferred reclamation strategy.
//!
//! This module provides `DeferredReclaim`, a strategy that parks deleted
//! objects instead of dropping them, until they are drained or the strategy
//! itself is dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::Reclaim;
use crate::object::SafeObject;

/// Parks deleted objects until [`DeferredReclaim::drain`] or drop.
///
/// Useful where the thread that detects deletability must not run the
/// payload's destructor (the destructor is run later by whoever drains), and
/// for tests that want to observe every deletion.
///
/// Every parked object is checked against the deletion invariant: being
/// removed, unreferenced, claimed. Deleting the same object twice panics.
///
pub struct DeferredReclaim<T> {
    deferred: Mutex<Vec<Arc<SafeObject<T>>>>,
    seen: Mutex<HashSet<usize>>,
    deleted: AtomicUsize,
}

impl<T> DeferredReclaim<T> {
    pub fn new() -> Self {
        DeferredReclaim {
            deferred: Mutex::new(Vec::new()),
            seen: Mutex::new(HashSet::new()),
            deleted: AtomicUsize::new(0),
        }
    }

    /// Total number of objects handed to this strategy for deletion.
    pub fn deleted_count(&self) -> usize {
        self.deleted.load(Ordering::Acquire)
    }

    /// Number of deleted objects not yet drained.
    pub fn pending(&self) -> usize {
        self.deferred.lock().len()
    }

    /// `true` if `object` has been deleted through this strategy.
    pub fn was_deleted(&self, object: &SafeObject<T>) -> bool {
        let addr = object as *const SafeObject<T> as usize;
        self.seen.lock().contains(&addr)
    }

    /// Drops every parked object on the calling thread.
    ///
    /// Returns the number of objects dropped. Drained objects are forgotten
    /// by [`Self::was_deleted`], their addresses may be reused.
    pub fn drain(&self) -> usize {
        // Take the list first: payload destructors run without the mutex.
        //
        let parked = std::mem::take(&mut *self.deferred.lock());
        let count = parked.len();

        {
            let mut seen = self.seen.lock();
            for object in &parked {
                seen.remove(&(Arc::as_ptr(object) as usize));
            }
        }

        drop(parked);
        count
    }
}

impl<T> Default for DeferredReclaim<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Reclaim<T> for DeferredReclaim<T> {
    fn delete_object(&self, object: Arc<SafeObject<T>>) {
        assert!(
            object.is_being_removed()
                && object.reference_count() == 0
                && object.is_deletion_claimed(),
            "deleting an object that is still in use: {:?}",
            object
        );

        let addr = Arc::as_ptr(&object) as usize;
        if !self.seen.lock().insert(addr) {
            panic!("DUPLICATE delete_object at {:#x}", addr);
        }

        self.deleted.fetch_add(1, Ordering::AcqRel);
        self.deferred.lock().push(object);
    }
}
