use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Direction, Doomed, PtrCore, SafeEnumerable, SafePtr, SafetyMode};
use crate::data_structures::{ObjectContainer, SafeCollection};
use crate::guard::Reclaim;
use crate::object::SafeObject;

/// Guarded pointer that may itself be shared and mutated by several
/// threads, for example a "current leader" slot.
///
/// Every operation runs under the pointer's own mutex. Objects released
/// by an operation are deleted after that mutex is dropped, so a payload
/// destructor that touches this pointer cannot deadlock against it.
///
/// # Example
///
/// ```rust
/// use palisade_core::{SafeObject, SafetyMode, SharedSafePtr};
///
/// let leader = SharedSafePtr::null(SafetyMode::ReferenceOnly);
/// let first = SafeObject::new("first");
///
/// std::thread::scope(|scope| {
///     scope.spawn(|| leader.assign_object(Some(first.clone())));
/// });
///
/// let current = leader.snapshot(SafetyMode::ReadOnly);
/// assert_eq!(current.get(), Some(&"first"));
/// ```
///
pub struct SharedSafePtr<'c, T> {
    core: Mutex<PtrCore<'c, T>>,
}

impl<'c, T> SharedSafePtr<'c, T> {
    pub fn null(mode: SafetyMode) -> Self {
        SharedSafePtr {
            core: Mutex::new(PtrCore::null(mode)),
        }
    }

    pub fn new(object: Arc<SafeObject<T>>, mode: SafetyMode) -> Self {
        let ptr = Self::null(mode);
        ptr.assign_object(Some(object));
        ptr
    }

    pub fn from_collection<C, R>(collection: &'c SafeCollection<T, C, R>, mode: SafetyMode) -> Self
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        let ptr = Self::null(mode);
        ptr.assign_collection(collection);
        ptr
    }

    // Runs `operation` under the pointer mutex, then performs the deletions
    // it produced.
    //
    fn mutate<F>(&self, operation: F) -> bool
    where
        F: FnOnce(&mut PtrCore<'c, T>) -> Doomed<'c, T>,
    {
        let (doomed, valid) = {
            let mut core = self.core.lock();
            let doomed = operation(&mut *core);
            (doomed, !core.is_null())
        };

        doomed.finish();
        valid
    }

    pub fn is_null(&self) -> bool {
        self.core.lock().is_null()
    }

    pub fn safety_mode(&self) -> SafetyMode {
        self.core.lock().mode()
    }

    pub fn position(&self) -> Option<usize> {
        self.core.lock().position()
    }

    pub fn assign_object(&self, object: Option<Arc<SafeObject<T>>>) -> bool {
        self.mutate(|core| core.assign_object(object))
    }

    pub fn assign_index(&self, index: usize) -> bool {
        self.mutate(|core| core.assign_index(index))
    }

    pub fn assign_collection<C, R>(&self, collection: &'c SafeCollection<T, C, R>) -> bool
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        let collection: &'c dyn SafeEnumerable<T> = collection;
        self.mutate(|core| core.assign_collection(collection))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> bool {
        self.mutate(|core| core.step(Direction::Forward))
    }

    pub fn previous(&self) -> bool {
        self.mutate(|core| core.step(Direction::Backward))
    }

    pub fn set_safety_mode(&self, mode: SafetyMode) -> bool {
        self.mutate(|core| core.set_safety_mode(mode))
    }

    pub fn set_null(&self) {
        self.mutate(|core| core.set_null());
    }

    /// An independent single-thread pointer to the current target.
    ///
    /// Only the reference is taken under the pointer mutex; the lock for
    /// `mode` is acquired after it is released. A `mode` that conflicts with
    /// the lock this shared pointer holds is lowered as in
    /// [`SafePtr::duplicate`].
    pub fn snapshot(&self, mode: SafetyMode) -> SafePtr<'c, T> {
        let mut core = self.core.lock().reference_copy(mode);
        core.lock_referenced().finish();
        SafePtr::from_core(core)
    }

    /// Runs `f` on the payload under the pointer mutex. `None` when null or
    /// when no lock is held.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&T>) -> R,
    {
        let core = self.core.lock();
        f(unsafe { core.data() })
    }

    /// Runs `f` on the payload under the pointer mutex. `None` unless the
    /// exclusive lock is held.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&mut T>) -> R,
    {
        let core = self.core.lock();
        f(unsafe { core.data_mut() })
    }

    /// A new handle on the target. Holding it does not keep the target
    /// referenced.
    pub fn object_handle(&self) -> Option<Arc<SafeObject<T>>> {
        self.core.lock().target().cloned()
    }
}

impl<T> Drop for SharedSafePtr<'_, T> {
    fn drop(&mut self) {
        self.core.get_mut().set_null().finish();
    }
}

impl<T> fmt::Debug for SharedSafePtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("SharedSafePtr")
            .field("mode", &core.mode())
            .field("object", &core.target())
            .field("position", &core.position())
            .finish()
    }
}
