use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::object_lock::LockHandle;
use super::scoped_guard::{SafeReadGuard, SafeWriteGuard};

// State word layout:
//
//   bit 0     REMOVED  - monotonic "being removed" flag
//   bit 1     OWNED    - a deleting collection owns reclamation
//   bit 2     CLAIMED  - deletion has been claimed by exactly one caller
//   bits 3..  reference count
//
const REMOVED: usize = 0b001;
const OWNED: usize = 0b010;
const CLAIMED: usize = 0b100;
const REF_ONE: usize = 0b1000;

/// A reference-counted, lock-guarded, removable shared entity.
///
/// `SafeObject<T>` wraps a payload `T` with the bookkeeping required to share
/// it between threads through [`SafePtr`](crate::SafePtr) and
/// [`SafeCollection`](crate::SafeCollection):
///
/// - a reference count of live guarded pointers and collection memberships,
/// - a monotonic "being removed" flag,
/// - a read/write lock guarding the payload, owned or borrowed from another
///   object.
///
/// Count and flags live in a single atomic state word, so bookkeeping never
/// contends with the (possibly long held) payload lock.
///
/// # Deletion
///
/// An object may be deleted iff it is being removed and its reference count
/// is zero. The transition into that state is claimed by exactly one caller
/// with a compare-and-swap:
///
/// ```text
///   removed, refs=1 ──safe_dereference()──► removed, refs=0, CLAIMED
///                                            (caller deletes)
///
///   removed, OWNED, refs=0 ──collection sweep──► CLAIMED
///                                               (collection deletes)
/// ```
///
/// While a deleting collection owns the object only its reclamation sweep may
/// claim it. Memory itself is held by `Arc`, so "deletion" means handing the
/// last owning handle to the reclamation strategy.
///
/// # Example
///
/// ```rust
/// use palisade_core::SafeObject;
///
/// let object = SafeObject::new(5);
///
/// assert!(object.safe_reference());
/// if let Some(mut value) = object.lock_write() {
///     *value += 1;
/// }
///
/// object.safe_remove();
/// assert!(!object.safe_reference());
/// assert!(object.lock_read().is_none());
///
/// // Last reference of a removed object: the caller is the deleter.
/// assert!(object.safe_dereference());
/// ```
///
pub struct SafeObject<T> {
    state: AtomicUsize,
    lock: LockHandle,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SafeObject<T> {}
unsafe impl<T: Send + Sync> Sync for SafeObject<T> {}

impl<T> SafeObject<T> {
    /// Creates an object with its own read/write lock.
    pub fn new(data: T) -> Arc<Self> {
        Arc::new(SafeObject {
            state: AtomicUsize::new(0),
            lock: LockHandle::owned(),
            data: UnsafeCell::new(data),
        })
    }

    /// Creates an object serialized by the lock of `lock_owner`.
    ///
    /// The new object does not keep the lock alive. When `lock_owner` is
    /// gone, every lock attempt on the new object fails.
    pub fn with_indirect_lock<U>(data: T, lock_owner: &SafeObject<U>) -> Arc<Self> {
        Arc::new(SafeObject {
            state: AtomicUsize::new(0),
            lock: lock_owner.lock.borrow(),
            data: UnsafeCell::new(data),
        })
    }

    /// Takes a reference unless the object is being removed.
    ///
    /// Once [`Self::safe_remove`] has been observed no later call succeeds.
    pub fn safe_reference(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & REMOVED != 0 {
                return false;
            }

            match self.state.compare_exchange_weak(
                current,
                current + REF_ONE,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases a reference.
    ///
    /// Returns `true` iff the count dropped to zero on a removed object that
    /// no deleting collection owns. The `true` result is handed out once: the
    /// caller that receives it is the one responsible for deletion.
    ///
    /// # Panics
    ///
    /// Panics if the reference count is already zero.
    pub fn safe_dereference(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            assert!(
                current >= REF_ONE,
                "SafeObject reference count underflow"
            );

            let mut next = current - REF_ONE;
            let claimed = next == REMOVED;
            if claimed {
                next |= CLAIMED;
            }

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return claimed,
                Err(actual) => current = actual,
            }
        }
    }

    /// Marks the object as being removed. Idempotent, never blocks.
    pub fn safe_remove(&self) {
        self.state.fetch_or(REMOVED, Ordering::AcqRel);
    }

    pub fn is_being_removed(&self) -> bool {
        self.state.load(Ordering::Acquire) & REMOVED != 0
    }

    pub fn reference_count(&self) -> usize {
        self.state.load(Ordering::Acquire) / REF_ONE
    }

    /// `true` iff the object is being removed, unreferenced and not yet
    /// claimed for deletion.
    pub fn safely_can_be_deleted(&self) -> bool {
        self.state.load(Ordering::Acquire) & !OWNED == REMOVED
    }

    /// `true` once some caller has claimed the deletion of this object.
    pub fn is_deletion_claimed(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLAIMED != 0
    }

    // Marks the object as owned by a deleting collection's reclamation list.
    //
    pub(crate) fn take_ownership(&self) {
        self.state.fetch_or(OWNED, Ordering::AcqRel);
    }

    pub(crate) fn try_claim_owned(&self) -> bool {
        self.state
            .compare_exchange(
                REMOVED | OWNED,
                REMOVED | OWNED | CLAIMED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    // Drops collection ownership. Returns true when the object became
    // deletable in the process, in which case the caller has claimed it.
    // Otherwise the last guarded pointer will claim it.
    //
    pub(crate) fn detach_owner(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & OWNED == 0 {
                return false;
            }

            let mut next = current & !OWNED;
            let claimed = next == REMOVED;
            if claimed {
                next |= CLAIMED;
            }

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return claimed,
                Err(actual) => current = actual,
            }
        }
    }

    /// Acquires a shared lock unless the object is being removed.
    ///
    /// May block. A successful call must be paired with
    /// [`Self::unlock_read_only`]; prefer [`Self::lock_read`].
    pub fn lock_read_only(&self) -> bool {
        if self.is_being_removed() {
            return false;
        }

        if self.lock.with_lock(|lock| lock.lock_shared()).is_none() {
            return false;
        }

        // Removal won the race while we were waiting.
        //
        if self.is_being_removed() {
            unsafe { self.unlock_read_only() };
            return false;
        }

        true
    }

    /// Acquires the exclusive lock unless the object is being removed.
    ///
    /// May block. A successful call must be paired with
    /// [`Self::unlock_read_write`]; prefer [`Self::lock_write`].
    pub fn lock_read_write(&self) -> bool {
        if self.is_being_removed() {
            return false;
        }

        if self.lock.with_lock(|lock| lock.lock_exclusive()).is_none() {
            return false;
        }

        if self.is_being_removed() {
            unsafe { self.unlock_read_write() };
            return false;
        }

        true
    }

    /// # Safety
    ///
    /// The caller must hold a shared lock obtained from a successful
    /// [`Self::lock_read_only`].
    pub unsafe fn unlock_read_only(&self) {
        self.lock
            .with_lock(|lock| unsafe { lock.unlock_shared() });
    }

    /// # Safety
    ///
    /// The caller must hold the exclusive lock obtained from a successful
    /// [`Self::lock_read_write`].
    pub unsafe fn unlock_read_write(&self) {
        self.lock
            .with_lock(|lock| unsafe { lock.unlock_exclusive() });
    }

    /// Scoped shared lock, `None` if the object is being removed.
    pub fn lock_read(&self) -> Option<SafeReadGuard<'_, T>> {
        self.lock_read_only()
            .then(|| unsafe { SafeReadGuard::new(self) })
    }

    /// Scoped exclusive lock, `None` if the object is being removed.
    pub fn lock_write(&self) -> Option<SafeWriteGuard<'_, T>> {
        self.lock_read_write()
            .then(|| unsafe { SafeWriteGuard::new(self) })
    }

    /// `true` if both objects serialize through the same lock.
    pub fn shares_lock_with<U>(&self, other: &SafeObject<U>) -> bool {
        self.lock.same_domain(&other.lock)
    }

    pub fn has_indirect_lock(&self) -> bool {
        self.lock.is_indirect()
    }

    /// # Safety
    ///
    /// The caller must hold a shared or exclusive lock on this object.
    pub(crate) unsafe fn data(&self) -> &T {
        unsafe { &*self.data.get() }
    }

    /// # Safety
    ///
    /// The caller must hold the exclusive lock on this object and must not
    /// create overlapping mutable references.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

impl<T> fmt::Debug for SafeObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Acquire);
        f.debug_struct("SafeObject")
            .field("references", &(state / REF_ONE))
            .field("being_removed", &(state & REMOVED != 0))
            .field("owned", &(state & OWNED != 0))
            .field("claimed", &(state & CLAIMED != 0))
            .field("indirect_lock", &self.lock.is_indirect())
            .finish()
    }
}
