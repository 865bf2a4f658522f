//! Guarded pointers.
//!
//! A guarded pointer holds a reference (and, depending on its
//! [`SafetyMode`], a lock) on one [`SafeObject`]. It may also act as a cursor
//! over a [`SafeCollection`](crate::SafeCollection).
//!
//! Both variants share one acquire/release state machine:
//!
//! ```text
//!                 enter_safety_mode(reference)
//!   ┌──────┐   safe_reference ──► lock(mode)   ┌────────┐
//!   │ null │──────────────────────────────────►│  held  │
//!   └──────┘◄──────────────────────────────────┴────────┘
//!       ▲      either step fails: target = null     │
//!       │      (and the reference is given back)    │
//!       │                                           │
//!       └───── exit_safety_mode(dereference) ◄──────┘
//!              unlock(mode) ──► safe_dereference
//!              (true: this pointer deletes the object)
//! ```
//!
//! Deletions found while a pointer is being mutated are collected into a
//! [`Doomed`] list and performed by the caller once it is safe to run
//! foreign destructors. [`SharedSafePtr`] relies on this to delete outside
//! its own mutex.

mod safe_ptr;
mod shared_safe_ptr;

use std::sync::{Arc, Weak};

pub use safe_ptr::SafePtr;
pub use shared_safe_ptr::SharedSafePtr;

use crate::object::SafeObject;

/// Which hold a guarded pointer keeps on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyMode {
    /// Reference plus shared lock.
    ReadOnly,
    /// Reference plus exclusive lock.
    ReadWrite,
    /// Reference only. Lock explicitly through [`SafeObject::lock_read`] or
    /// [`SafeObject::lock_write`].
    ReferenceOnly,
}

impl SafetyMode {
    /// The mode a second hold on the same object may take while `self` is
    /// held: `requested`, or `ReferenceOnly` when the two locks exclude each
    /// other.
    pub fn compatible(self, requested: SafetyMode) -> SafetyMode {
        match (self, requested) {
            (SafetyMode::ReadWrite, SafetyMode::ReadOnly | SafetyMode::ReadWrite)
            | (SafetyMode::ReadOnly, SafetyMode::ReadWrite) => SafetyMode::ReferenceOnly,
            _ => requested,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Where a cursor last saw its member: the index, and the members on either
/// side at that moment.
///
/// The neighbours are weak so a cursor never keeps them alive. They are only
/// compared by address, never dereferenced.
///
pub struct Placement<T> {
    pub(crate) index: usize,
    pub(crate) previous: Weak<SafeObject<T>>,
    pub(crate) next: Weak<SafeObject<T>>,
}

impl<T> Placement<T> {
    pub(crate) fn new(index: usize, previous: Weak<SafeObject<T>>, next: Weak<SafeObject<T>>) -> Self {
        Placement { index, previous, next }
    }

    pub(crate) fn unplaced() -> Self {
        Self::new(0, Weak::new(), Weak::new())
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Placement<T> {
    fn clone(&self) -> Self {
        Placement {
            index: self.index,
            previous: Weak::clone(&self.previous),
            next: Weak::clone(&self.next),
        }
    }
}

/// A member a cursor moved onto, already referenced for it.
pub type Landing<T> = (Placement<T>, Arc<SafeObject<T>>);

/// Structural access a guarded pointer needs from the collection it
/// enumerates.
///
/// Every method runs under the collection's structural mutex; references
/// returned are taken before that mutex is released.
///
pub trait SafeEnumerable<T>: Sync {
    /// References the first member at `start` or beyond (before, when going
    /// backward) that accepts a reference.
    fn reference_from(&self, start: usize, direction: Direction) -> Option<Landing<T>>;

    /// References the neighbour of `current` in `direction`.
    ///
    /// When `current` is no longer a member, the scan resumes just past the
    /// neighbour recorded behind it in `last`, or failing that at the one
    /// recorded ahead of it. With both neighbours gone the enumeration ends.
    fn reference_next(
        &self,
        current: &SafeObject<T>,
        last: &Placement<T>,
        direction: Direction,
    ) -> Option<Landing<T>>;

    /// Placement of `object` if it is a member.
    fn locate_member(&self, object: &SafeObject<T>) -> Option<Placement<T>>;

    /// Deletion hook for objects released by a pointer.
    fn delete_object(&self, object: Arc<SafeObject<T>>);
}

type CollectionRef<'c, T> = &'c dyn SafeEnumerable<T>;

/// Objects a pointer has claimed for deletion, with the collection whose
/// hook deletes them.
pub(crate) struct Doomed<'c, T> {
    objects: Vec<(Option<CollectionRef<'c, T>>, Arc<SafeObject<T>>)>,
}

impl<'c, T> Doomed<'c, T> {
    pub(crate) fn new() -> Self {
        Doomed {
            objects: Vec::new(),
        }
    }

    fn add(&mut self, collection: Option<CollectionRef<'c, T>>, object: Option<Arc<SafeObject<T>>>) {
        if let Some(object) = object {
            self.objects.push((collection, object));
        }
    }

    fn append(&mut self, mut other: Doomed<'c, T>) {
        self.objects.append(&mut other.objects);
    }

    pub(crate) fn finish(self) {
        for (collection, object) in self.objects {
            tracing::trace!(object = ?object, "guarded pointer deletes released object");
            match collection {
                Some(collection) => collection.delete_object(object),
                None => drop(object),
            }
        }
    }
}

/// State machine shared by [`SafePtr`] and [`SharedSafePtr`].
pub(crate) struct PtrCore<'c, T> {
    collection: Option<CollectionRef<'c, T>>,
    target: Option<Arc<SafeObject<T>>>,
    mode: SafetyMode,
    placement: Placement<T>,
}

impl<'c, T> PtrCore<'c, T> {
    pub(crate) fn null(mode: SafetyMode) -> Self {
        PtrCore {
            collection: None,
            target: None,
            mode,
            placement: Placement::unplaced(),
        }
    }

    // Takes over a target the caller has already referenced and locks it.
    //
    pub(crate) fn adopt(
        collection: Option<CollectionRef<'c, T>>,
        (placement, object): Landing<T>,
        mode: SafetyMode,
    ) -> (Self, Doomed<'c, T>) {
        let mut core = PtrCore {
            collection,
            target: Some(object),
            mode,
            placement,
        };
        let doomed = core.enter_safety_mode(false);
        (core, doomed)
    }

    pub(crate) fn is_null(&self) -> bool {
        self.target.is_none()
    }

    pub(crate) fn mode(&self) -> SafetyMode {
        self.mode
    }

    pub(crate) fn target(&self) -> Option<&Arc<SafeObject<T>>> {
        self.target.as_ref()
    }

    pub(crate) fn has_collection(&self) -> bool {
        self.collection.is_some()
    }

    pub(crate) fn position(&self) -> Option<usize> {
        (self.collection.is_some() && self.target.is_some()).then_some(self.placement.index)
    }

    fn land(&mut self, (placement, object): Landing<T>) -> Doomed<'c, T> {
        self.placement = placement;
        self.target = Some(object);
        self.enter_safety_mode(false)
    }

    // Takes the hold matching `mode` on the current target. Fails closed:
    // on any refusal the target becomes null.
    //
    fn enter_safety_mode(&mut self, reference: bool) -> Doomed<'c, T> {
        let mut doomed = Doomed::new();

        let Some(object) = self.target.as_ref() else {
            return doomed;
        };

        if reference && !object.safe_reference() {
            self.target = None;
            return doomed;
        }

        let locked = match self.mode {
            SafetyMode::ReadOnly => object.lock_read_only(),
            SafetyMode::ReadWrite => object.lock_read_write(),
            SafetyMode::ReferenceOnly => true,
        };

        if !locked {
            if let Some(object) = self.target.take() {
                let deletable = object.safe_dereference();
                doomed.add(self.collection, deletable.then_some(object));
            }
        }

        doomed
    }

    // Releases the lock matching `mode`, and the reference when asked to.
    // Without `dereference` the target stays set and referenced.
    //
    fn exit_safety_mode(&mut self, dereference: bool) -> Doomed<'c, T> {
        let mut doomed = Doomed::new();

        let Some(object) = self.target.as_ref() else {
            return doomed;
        };

        // Safety: a non-null target is always locked according to `mode`.
        //
        match self.mode {
            SafetyMode::ReadOnly => unsafe { object.unlock_read_only() },
            SafetyMode::ReadWrite => unsafe { object.unlock_read_write() },
            SafetyMode::ReferenceOnly => {}
        }

        if dereference {
            if let Some(object) = self.target.take() {
                let deletable = object.safe_dereference();
                doomed.add(self.collection, deletable.then_some(object));
            }
        }

        doomed
    }

    pub(crate) fn set_null(&mut self) -> Doomed<'c, T> {
        self.exit_safety_mode(true)
    }

    pub(crate) fn assign_object(&mut self, object: Option<Arc<SafeObject<T>>>) -> Doomed<'c, T> {
        let mut doomed = self.exit_safety_mode(true);

        if let (Some(collection), Some(object)) = (self.collection, object.as_ref()) {
            match collection.locate_member(object) {
                Some(placement) => self.placement = placement,
                None => {
                    // Not a member: a plain reference, no longer a cursor.
                    //
                    self.collection = None;
                    self.placement = Placement::unplaced();
                }
            }
        }

        self.target = object;
        doomed.append(self.enter_safety_mode(true));
        doomed
    }

    pub(crate) fn assign_index(&mut self, index: usize) -> Doomed<'c, T> {
        let mut doomed = self.exit_safety_mode(true);

        let Some(collection) = self.collection else {
            return doomed;
        };

        if let Some(landing) = collection.reference_from(index, Direction::Forward) {
            doomed.append(self.land(landing));
        }

        doomed
    }

    pub(crate) fn assign_collection(&mut self, collection: CollectionRef<'c, T>) -> Doomed<'c, T> {
        let mut doomed = self.exit_safety_mode(true);
        self.collection = Some(collection);
        self.placement = Placement::unplaced();
        doomed.append(self.assign_index(0));
        doomed
    }

    pub(crate) fn step(&mut self, direction: Direction) -> Doomed<'c, T> {
        let Some(collection) = self.collection else {
            return self.exit_safety_mode(true);
        };

        let mut doomed = self.exit_safety_mode(false);

        let Some(current) = self.target.take() else {
            return doomed;
        };

        let found = collection.reference_next(&current, &self.placement, direction);

        // The reference on `current` is kept until its successor is
        // referenced, so the scan never starts from a deleted object.
        //
        let deletable = current.safe_dereference();
        doomed.add(Some(collection), deletable.then_some(current));

        if let Some(landing) = found {
            doomed.append(self.land(landing));
        }

        doomed
    }

    pub(crate) fn set_safety_mode(&mut self, mode: SafetyMode) -> Doomed<'c, T> {
        if mode == self.mode {
            return Doomed::new();
        }

        let mut doomed = self.exit_safety_mode(false);
        self.mode = mode;
        doomed.append(self.enter_safety_mode(false));
        doomed
    }

    // A new, independent hold on the same target.
    //
    pub(crate) fn duplicate(&self, mode: SafetyMode) -> (PtrCore<'c, T>, Doomed<'c, T>) {
        let mut core = self.reference_copy(mode);
        let doomed = core.enter_safety_mode(false);
        (core, doomed)
    }

    // Referenced but unlocked copy. The caller must `enter_safety_mode(false)`
    // on the result before handing it out. A mode that conflicts with the
    // lock this pointer holds becomes `ReferenceOnly`: the exclusive lock is
    // not re-entrant, and the copy is usually locked by the holder's thread.
    //
    pub(crate) fn reference_copy(&self, mode: SafetyMode) -> PtrCore<'c, T> {
        let target = self
            .target
            .as_ref()
            .filter(|object| object.safe_reference())
            .cloned();

        let mode = if target.is_some() {
            self.mode.compatible(mode)
        } else {
            mode
        };

        PtrCore {
            collection: self.collection,
            target,
            mode,
            placement: self.placement.clone(),
        }
    }

    pub(crate) fn lock_referenced(&mut self) -> Doomed<'c, T> {
        self.enter_safety_mode(false)
    }

    /// # Safety
    ///
    /// The returned reference must not outlive the hold of this pointer.
    pub(crate) unsafe fn data(&self) -> Option<&T> {
        match self.mode {
            SafetyMode::ReferenceOnly => None,
            _ => self.target.as_ref().map(|object| unsafe { object.data() }),
        }
    }

    /// # Safety
    ///
    /// The returned reference must not outlive the hold of this pointer,
    /// and `self` must be borrowed mutably for as long as it lives.
    pub(crate) unsafe fn data_mut(&self) -> Option<&mut T> {
        match self.mode {
            SafetyMode::ReadWrite => self.target.as_ref().map(|object| unsafe { object.data_mut() }),
            _ => None,
        }
    }
}
