//! Read/write lock shared between guarded objects.
//!
//! Every [`SafeObject`](super::SafeObject) guards its payload with an
//! [`ObjectLock`]. The lock is either owned by the object, or borrowed from
//! another object ("indirect lock") so that several objects serialize through
//! one lock domain:
//!
//! ```text
//!   ┌──────────────┐  Owned(Arc)   ┌────────────┐
//!   │ SafeObject A ├──────────────►│ ObjectLock │
//!   └──────────────┘               └────────────┘
//!                                        ▲
//!   ┌──────────────┐  Indirect(Weak)     │
//!   │ SafeObject B ├─────────────────────┘
//!   └──────────────┘
//! ```
//!
//! The borrower never keeps the lock alive. Once the owner is gone, locking
//! the borrower fails, which callers observe the same way as a removed object.

use std::sync::{Arc, Weak};

use parking_lot::RawRwLock;
use parking_lot::lock_api::{RawRwLock as _, RawRwLockRecursive as _};

pub(crate) struct ObjectLock {
    raw: RawRwLock,
}

impl ObjectLock {
    fn new() -> Self {
        ObjectLock {
            raw: RawRwLock::INIT,
        }
    }

    // Readers are recursive so a thread already holding a read lock on one
    // object of a shared domain can read-lock another one without queueing
    // behind a waiting writer.
    //
    pub(crate) fn lock_shared(&self) {
        self.raw.lock_shared_recursive();
    }

    pub(crate) fn lock_exclusive(&self) {
        self.raw.lock_exclusive();
    }

    /// # Safety
    ///
    /// The caller must hold a shared lock acquired through [`Self::lock_shared`].
    pub(crate) unsafe fn unlock_shared(&self) {
        unsafe { self.raw.unlock_shared() }
    }

    /// # Safety
    ///
    /// The caller must hold the exclusive lock.
    pub(crate) unsafe fn unlock_exclusive(&self) {
        unsafe { self.raw.unlock_exclusive() }
    }
}

pub(crate) enum LockHandle {
    Owned(Arc<ObjectLock>),
    Indirect(Weak<ObjectLock>),
}

impl LockHandle {
    pub(crate) fn owned() -> Self {
        LockHandle::Owned(Arc::new(ObjectLock::new()))
    }

    // Borrow the lock domain of this handle. Borrowing from an indirect
    // handle borrows from the original owner.
    //
    pub(crate) fn borrow(&self) -> Self {
        match self {
            LockHandle::Owned(lock) => LockHandle::Indirect(Arc::downgrade(lock)),
            LockHandle::Indirect(lock) => LockHandle::Indirect(lock.clone()),
        }
    }

    pub(crate) fn is_indirect(&self) -> bool {
        matches!(self, LockHandle::Indirect(_))
    }

    /// Runs `f` against the lock, or returns `None` when the owner of an
    /// indirect lock no longer exists.
    pub(crate) fn with_lock<R>(&self, f: impl FnOnce(&ObjectLock) -> R) -> Option<R> {
        match self {
            LockHandle::Owned(lock) => Some(f(lock)),
            LockHandle::Indirect(lock) => lock.upgrade().map(|lock| f(&lock)),
        }
    }

    pub(crate) fn same_domain(&self, other: &LockHandle) -> bool {
        match (self.address(), other.address()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    fn address(&self) -> Option<*const ObjectLock> {
        match self {
            LockHandle::Owned(lock) => Some(Arc::as_ptr(lock)),
            LockHandle::Indirect(lock) => (lock.strong_count() > 0).then(|| lock.as_ptr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_handle_shares_domain() {
        let owner = LockHandle::owned();
        let borrower = owner.borrow();
        let second = borrower.borrow();

        assert!(!owner.is_indirect());
        assert!(borrower.is_indirect());
        assert!(owner.same_domain(&borrower));
        assert!(borrower.same_domain(&second));
        assert!(!owner.same_domain(&LockHandle::owned()));
    }

    #[test]
    fn test_borrowed_handle_fails_after_owner_drop() {
        let owner = LockHandle::owned();
        let borrower = owner.borrow();

        assert_eq!(borrower.with_lock(|_| 1), Some(1));

        drop(owner);

        assert_eq!(borrower.with_lock(|_| 1), None);
    }

    #[test]
    fn test_recursive_shared_lock() {
        let handle = LockHandle::owned();

        handle.with_lock(|lock| {
            lock.lock_shared();
            lock.lock_shared();
            unsafe {
                lock.unlock_shared();
                lock.unlock_shared();
            }

            lock.lock_exclusive();
            unsafe { lock.unlock_exclusive() };
        });
    }
}
