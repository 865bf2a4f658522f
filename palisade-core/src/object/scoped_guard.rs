//! Scoped read and write locks on a [`SafeObject`].

use std::fmt;
use std::ops::{Deref, DerefMut};

use super::SafeObject;

/// Shared lock on a [`SafeObject`], released on drop.
///
/// Obtained from [`SafeObject::lock_read`], which fails once the object is
/// being removed.
///
pub struct SafeReadGuard<'a, T> {
    object: &'a SafeObject<T>,
}

impl<'a, T> SafeReadGuard<'a, T> {
    /// # Safety
    ///
    /// `object` must be read-locked by the caller; the guard takes over the
    /// release.
    pub(crate) unsafe fn new(object: &'a SafeObject<T>) -> Self {
        SafeReadGuard { object }
    }

    pub fn object(&self) -> &'a SafeObject<T> {
        self.object
    }

    /// Releases the lock before the end of the scope.
    pub fn unlock(self) {
        drop(self)
    }
}

impl<T> Deref for SafeReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.object.data() }
    }
}

impl<T> Drop for SafeReadGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { self.object.unlock_read_only() }
    }
}

impl<T: fmt::Debug> fmt::Debug for SafeReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SafeReadGuard({:?})", &**self)
    }
}

/// Exclusive lock on a [`SafeObject`], released on drop.
///
/// Obtained from [`SafeObject::lock_write`], which fails once the object is
/// being removed.
///
pub struct SafeWriteGuard<'a, T> {
    object: &'a SafeObject<T>,
}

impl<'a, T> SafeWriteGuard<'a, T> {
    /// # Safety
    ///
    /// `object` must be write-locked by the caller; the guard takes over the
    /// release.
    pub(crate) unsafe fn new(object: &'a SafeObject<T>) -> Self {
        SafeWriteGuard { object }
    }

    pub fn object(&self) -> &'a SafeObject<T> {
        self.object
    }

    /// Releases the lock before the end of the scope.
    pub fn unlock(self) {
        drop(self)
    }
}

impl<T> Deref for SafeWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.object.data() }
    }
}

impl<T> DerefMut for SafeWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.object.data_mut() }
    }
}

impl<T> Drop for SafeWriteGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { self.object.unlock_read_write() }
    }
}

impl<T: fmt::Debug> fmt::Debug for SafeWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SafeWriteGuard({:?})", &**self)
    }
}
