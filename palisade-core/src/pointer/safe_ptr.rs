use std::fmt;
use std::sync::Arc;

use super::{Direction, Landing, PtrCore, SafeEnumerable, SafetyMode};
use crate::data_structures::{ObjectContainer, SafeCollection};
use crate::guard::Reclaim;
use crate::object::SafeObject;

/// Guarded pointer owned by a single thread at a time.
///
/// Holds a reference on its target, and a shared or exclusive lock
/// according to its [`SafetyMode`]; both are released on reassignment and
/// on drop. When created from a collection it is also an enumeration cursor:
/// [`SafePtr::next`] and [`SafePtr::previous`] skip members that are being
/// removed, and the cursor survives the concurrent removal of its own
/// current member.
///
/// A null pointer after any operation means "the object is no longer
/// available", not an error.
///
/// # Example
///
/// ```rust
/// use palisade_core::{SafeArray, SafeObject, SafePtr, SafetyMode};
///
/// let collection: SafeArray<i32> = SafeArray::new();
/// for i in 0..3 {
///     collection.append(SafeObject::new(i));
/// }
///
/// let mut values = vec![];
/// let mut cursor = SafePtr::from_collection(&collection, SafetyMode::ReadOnly);
/// while let Some(value) = cursor.get() {
///     values.push(*value);
///     cursor.next();
/// }
/// assert_eq!(values, vec![0, 1, 2]);
/// ```
///
pub struct SafePtr<'c, T> {
    core: PtrCore<'c, T>,
}

impl<'c, T> SafePtr<'c, T> {
    pub fn null(mode: SafetyMode) -> Self {
        SafePtr {
            core: PtrCore::null(mode),
        }
    }

    /// Guarded pointer to a single object, not bound to any collection.
    pub fn new(object: Arc<SafeObject<T>>, mode: SafetyMode) -> Self {
        let mut ptr = Self::null(mode);
        ptr.assign_object(Some(object));
        ptr
    }

    /// Cursor on the first available member of `collection`.
    pub fn from_collection<C, R>(collection: &'c SafeCollection<T, C, R>, mode: SafetyMode) -> Self
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        let mut ptr = Self::null(mode);
        ptr.assign_collection(collection);
        ptr
    }

    /// Cursor on the first available member of `collection` at `index` or
    /// beyond.
    pub fn at_index<C, R>(
        collection: &'c SafeCollection<T, C, R>,
        index: usize,
        mode: SafetyMode,
    ) -> Self
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        let mut ptr = Self::null(mode);
        ptr.core.collection = Some(collection as &dyn SafeEnumerable<T>);
        ptr.assign_index(index);
        ptr
    }

    /// Cursor on `object` within `collection`. Falls back to a plain
    /// pointer when `object` is not a member.
    pub fn to_member<C, R>(
        collection: &'c SafeCollection<T, C, R>,
        object: Arc<SafeObject<T>>,
        mode: SafetyMode,
    ) -> Self
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        let mut ptr = Self::null(mode);
        ptr.core.collection = Some(collection as &dyn SafeEnumerable<T>);
        ptr.assign_object(Some(object));
        ptr
    }

    pub(crate) fn from_core(core: PtrCore<'c, T>) -> Self {
        SafePtr { core }
    }

    // `object` must already carry a reference taken for this pointer.
    //
    pub(crate) fn adopt(
        collection: Option<&'c dyn SafeEnumerable<T>>,
        landing: Landing<T>,
        mode: SafetyMode,
    ) -> Self {
        let (core, doomed) = PtrCore::adopt(collection, landing, mode);
        doomed.finish();
        SafePtr { core }
    }

    pub fn is_null(&self) -> bool {
        self.core.is_null()
    }

    pub fn safety_mode(&self) -> SafetyMode {
        self.core.mode()
    }

    /// `true` while this pointer is an enumeration cursor.
    pub fn is_cursor(&self) -> bool {
        self.core.has_collection()
    }

    /// Index of the current member when this pointer is a cursor.
    pub fn position(&self) -> Option<usize> {
        self.core.position()
    }

    /// The guarded object itself, whatever the mode.
    pub fn object(&self) -> Option<&SafeObject<T>> {
        self.core.target().map(|object| &**object)
    }

    /// A new handle on the target. Holding it does not keep the target
    /// referenced.
    pub fn object_handle(&self) -> Option<Arc<SafeObject<T>>> {
        self.core.target().cloned()
    }

    /// Payload, when a shared or exclusive lock is held.
    pub fn get(&self) -> Option<&T> {
        unsafe { self.core.data() }
    }

    /// Payload, when the exclusive lock is held.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        unsafe { self.core.data_mut() }
    }

    pub fn assign_object(&mut self, object: Option<Arc<SafeObject<T>>>) -> bool {
        self.core.assign_object(object).finish();
        !self.is_null()
    }

    /// Moves to the first available member at `index` or beyond. A pointer
    /// without a collection becomes null.
    pub fn assign_index(&mut self, index: usize) -> bool {
        self.core.assign_index(index).finish();
        !self.is_null()
    }

    pub fn assign_collection<C, R>(&mut self, collection: &'c SafeCollection<T, C, R>) -> bool
    where
        T: Send + Sync + 'static,
        C: ObjectContainer<T>,
        R: Reclaim<T>,
    {
        self.core.assign_collection(collection).finish();
        !self.is_null()
    }

    /// Advances to the next available member. Returns `false`, leaving the
    /// pointer null, at the end of the collection or when this pointer is not
    /// a cursor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.core.step(Direction::Forward).finish();
        !self.is_null()
    }

    /// Moves to the previous available member, see [`SafePtr::next`].
    pub fn previous(&mut self) -> bool {
        self.core.step(Direction::Backward).finish();
        !self.is_null()
    }

    /// Re-acquires the current target under `mode`. Returns `false`, leaving
    /// the pointer null, if the target is being removed.
    pub fn set_safety_mode(&mut self, mode: SafetyMode) -> bool {
        self.core.set_safety_mode(mode).finish();
        !self.is_null()
    }

    pub fn set_null(&mut self) {
        self.core.set_null().finish();
    }

    /// Releases the lock, keeping only the reference.
    pub fn into_reference_only(mut self) -> Self {
        self.set_safety_mode(SafetyMode::ReferenceOnly);
        self
    }

    /// A new pointer to the same target under `mode`.
    ///
    /// A `mode` whose lock would conflict with the one this pointer holds is
    /// lowered to [`SafetyMode::ReferenceOnly`], see
    /// [`SafetyMode::compatible`].
    pub fn duplicate(&self, mode: SafetyMode) -> Self {
        let (core, doomed) = self.core.duplicate(mode);
        doomed.finish();
        SafePtr { core }
    }
}

/// Clones share the original's mode, except that a clone of a `ReadWrite`
/// pointer is `ReferenceOnly`.
impl<T> Clone for SafePtr<'_, T> {
    fn clone(&self) -> Self {
        self.duplicate(self.safety_mode())
    }
}

impl<T> Drop for SafePtr<'_, T> {
    fn drop(&mut self) {
        self.core.set_null().finish();
    }
}

impl<T> fmt::Debug for SafePtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafePtr")
            .field("mode", &self.safety_mode())
            .field("object", &self.object())
            .field("position", &self.position())
            .finish()
    }
}
