use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use super::container::{ObjectArray, ObjectContainer, ObjectDictionary, ObjectList, SequenceContainer};
use super::safe_collection_iter::SafeCollectionIter;
use crate::error::SafeError;
use crate::guard::{DropReclaim, Reclaim};
use crate::object::SafeObject;
use crate::options::CollectionOptions;
use crate::pointer::{Direction, Landing, Placement, SafeEnumerable, SafePtr, SafetyMode};
use crate::preemptive_synchronization::periodic_task::PeriodicTask;

pub type SafeArray<T, R = DropReclaim> = SafeCollection<T, ObjectArray<T>, R>;
pub type SafeList<T, R = DropReclaim> = SafeCollection<T, ObjectList<T>, R>;
pub type SafeDictionary<K, T, R = DropReclaim> = SafeCollection<T, ObjectDictionary<K, T>, R>;

/// Thread-safe collection of [`SafeObject`]s with deferred reclamation.
///
/// Members live in a container `C` guarded by a structural mutex. Removing a
/// member flags it as being removed and, when the collection owns deletion,
/// parks it on a reclamation list. A sweep
/// ([`SafeCollection::delete_objects_to_be_removed`], or the background
/// sweeper installed by [`SafeCollection::set_auto_delete_objects`]) deletes
/// parked objects through the strategy `R` once no guarded pointer holds
/// them any more.
///
/// ```text
///   items ──safe_remove──► to_be_removed ──sweep──► R::delete_object
///     │                         ▲
///     └── guarded pointers ─────┘ (keep the object alive until released)
/// ```
///
/// Dropping the collection removes every member. Objects still held by a
/// guarded pointer at that moment are detached: the last pointer to release
/// one deletes it.
///
/// # Example
///
/// ```rust
/// use palisade_core::{SafeArray, SafeObject, SafetyMode};
///
/// let collection: SafeArray<String> = SafeArray::new();
/// let object = SafeObject::new(String::from("a"));
/// collection.append(object.clone());
///
/// {
///     let mut ptr = collection.get_with_lock(0, SafetyMode::ReadWrite);
///     ptr.get_mut().unwrap().push('b');
/// }
///
/// assert!(collection.safe_remove(&object));
/// assert!(collection.delete_objects_to_be_removed());
/// ```
///
pub struct SafeCollection<T, C = ObjectArray<T>, R = DropReclaim>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    inner: Arc<CollectionInner<T, C, R>>,
    sweeper: Mutex<Option<PeriodicTask>>,
}

struct CollectionInner<T, C, R> {
    // Lock order: `items` before `to_be_removed`.
    items: Mutex<C>,
    to_be_removed: Mutex<Vec<Arc<SafeObject<T>>>>,
    reclaim: R,
    options: CollectionOptions,
}

impl<T, C, R> CollectionInner<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    // Flags an object that just left `items` and parks it when this
    // collection owns deletion. Must run under the items lock.
    //
    fn retire(&self, object: &Arc<SafeObject<T>>) {
        object.safe_remove();

        if self.options.delete_objects {
            object.take_ownership();
            self.to_be_removed.lock().push(Arc::clone(object));
        }
    }

    fn unlink(&self, items: &mut C, index: usize) -> Option<Arc<SafeObject<T>>> {
        let object = items.remove_at(index)?;
        self.retire(&object);
        Some(object)
    }

    // Gives back the membership reference of a retired object.
    //
    fn release(&self, object: Arc<SafeObject<T>>) {
        if object.safe_dereference() {
            tracing::trace!(object = ?object, "unowned member released, deleting");
            self.reclaim.delete_object(object);
        }
    }

    fn remove_all(&self) {
        loop {
            let removed = self.unlink(&mut self.items.lock(), 0);
            match removed {
                Some(object) => self.release(object),
                None => break,
            }
        }
    }

    fn delete_objects_to_be_removed(&self) -> bool {
        let mut freed = 0;

        // Deleting one object may release references on others, so sweep
        // until a pass frees nothing.
        //
        loop {
            let claimed: Vec<_> = {
                let mut list = self.to_be_removed.lock();
                let (claimed, kept) = std::mem::take(&mut *list)
                    .into_iter()
                    .partition(|object| {
                        self.reclaim.garbage_collection(object) && object.try_claim_owned()
                    });
                *list = kept;
                claimed
            };

            if claimed.is_empty() {
                break;
            }

            freed += claimed.len();
            for object in claimed {
                self.reclaim.delete_object(object);
            }
        }

        let items = self.items.lock();
        let remaining = self.to_be_removed.lock().len();

        if freed > 0 {
            tracing::debug!(freed, remaining, "reclamation sweep");
        }

        remaining == 0 && items.is_empty()
    }

    fn placement(items: &C, index: usize) -> Placement<T> {
        let neighbour = |index: Option<usize>| {
            index
                .and_then(|index| items.get_at(index))
                .map(Arc::downgrade)
                .unwrap_or_default()
        };

        Placement::new(index, neighbour(index.checked_sub(1)), neighbour(index.checked_add(1)))
    }

    // References the member at exactly `index`.
    //
    fn reference_at(items: &C, index: usize) -> Option<Landing<T>> {
        let object = items.get_at(index).filter(|object| object.safe_reference())?;
        Some((Self::placement(items, index), Arc::clone(object)))
    }

    fn scan(&self, items: &C, start: usize, direction: Direction) -> Option<Landing<T>> {
        let reference = |index: usize| {
            let landing = Self::reference_at(items, index);
            if landing.is_none() {
                tracing::trace!(index, "enumeration skips member being removed");
            }
            landing
        };

        match direction {
            Direction::Forward => (start..items.len()).find_map(reference),
            Direction::Backward => {
                let last = items.len().checked_sub(1)?;
                (0..=start.min(last)).rev().find_map(reference)
            }
        }
    }
}

impl<T, C> SafeCollection<T, C, DropReclaim>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
{
    pub fn new() -> Self {
        Self::with_reclaim(DropReclaim)
    }
}

impl<T, C, R> SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    pub fn with_reclaim(reclaim: R) -> Self {
        Self::from_parts(C::default(), CollectionOptions::default(), reclaim)
    }

    pub fn with_options(options: CollectionOptions, reclaim: R) -> Result<Self, SafeError> {
        options.validate()?;
        Ok(Self::from_parts(C::default(), options, reclaim))
    }

    fn from_parts(items: C, options: CollectionOptions, reclaim: R) -> Self {
        SafeCollection {
            inner: Arc::new(CollectionInner {
                items: Mutex::new(items),
                to_be_removed: Mutex::new(Vec::new()),
                reclaim,
                options,
            }),
            sweeper: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Current index of `object`, by identity.
    pub fn index_of(&self, object: &SafeObject<T>) -> Option<usize> {
        self.inner.items.lock().index_of(object)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    /// Objects removed from the collection but not reclaimed yet.
    pub fn pending_removal(&self) -> usize {
        self.inner.to_be_removed.lock().len()
    }

    /// `true` if this collection owns deletion of its members.
    pub fn delete_objects(&self) -> bool {
        self.inner.options.delete_objects
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.inner.options
    }

    pub fn reclaim(&self) -> &R {
        &self.inner.reclaim
    }

    /// Removes `object` from the collection and flags it as being removed.
    ///
    /// The flag applies to the object itself, so other collections holding
    /// it stop handing it out as well. Returns `false` if `object` is not a
    /// member.
    pub fn safe_remove(&self, object: &SafeObject<T>) -> bool {
        let removed = {
            let mut items = self.inner.items.lock();
            match items.index_of(object) {
                Some(index) => self.inner.unlink(&mut items, index),
                None => None,
            }
        };

        self.finish_removal(removed)
    }

    pub fn safe_remove_at(&self, index: usize) -> bool {
        let removed = self.inner.unlink(&mut self.inner.items.lock(), index);
        self.finish_removal(removed)
    }

    fn finish_removal(&self, removed: Option<Arc<SafeObject<T>>>) -> bool {
        match removed {
            Some(object) => {
                self.inner.release(object);
                true
            }
            None => false,
        }
    }

    /// Removes every member.
    ///
    /// With `synchronous`, waits until every removed object has been
    /// reclaimed. The wait polls at `drain_poll_interval` and only ends once
    /// all guarded pointers to the removed objects are released, including
    /// any held by the calling thread.
    pub fn remove_all(&self, synchronous: bool) {
        self.inner.remove_all();

        if !synchronous {
            return;
        }

        let options = &self.inner.options;
        let started = Instant::now();
        let mut warned = false;

        while !self.inner.delete_objects_to_be_removed() {
            if !warned && started.elapsed() >= options.drain_warn_after {
                tracing::warn!(
                    pending = self.pending_removal(),
                    waited = ?started.elapsed(),
                    "synchronous remove_all still waiting on guarded pointers"
                );
                warned = true;
            }

            thread::sleep(options.drain_poll_interval);
        }
    }

    /// Deletes every parked object that is no longer referenced.
    ///
    /// Returns `true` iff nothing is left to reclaim and the collection is
    /// empty.
    pub fn delete_objects_to_be_removed(&self) -> bool {
        self.inner.delete_objects_to_be_removed()
    }

    /// Starts a background thread sweeping the reclamation list every
    /// `sweep_interval`.
    pub fn set_auto_delete_objects(&self) -> Result<(), SafeError> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Err(SafeError::AutoDeleteActive);
        }

        let inner: Weak<CollectionInner<T, C, R>> = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn(
            self.inner.options.sweeper_name.clone(),
            self.inner.options.sweep_interval,
            move || {
                if let Some(inner) = inner.upgrade() {
                    inner.delete_objects_to_be_removed();
                }
            },
        )?;

        *sweeper = Some(task);
        Ok(())
    }

    /// Stops the background sweeper. Returns `false` if none was running.
    pub fn stop_auto_delete_objects(&self) -> bool {
        // Joined once the lock is released.
        //
        let task = self.sweeper.lock().take();
        task.is_some()
    }

    pub fn is_auto_deleting(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Guarded pointer to the member at `index`, null if there is none or
    /// it is being removed.
    pub fn get_with_lock(&self, index: usize, mode: SafetyMode) -> SafePtr<'_, T> {
        let found = CollectionInner::<T, C, R>::reference_at(&*self.inner.items.lock(), index);

        match found {
            Some(landing) => SafePtr::adopt(Some(self as &dyn SafeEnumerable<T>), landing, mode),
            None => SafePtr::null(mode),
        }
    }

    /// First member, in collection order, whose payload satisfies
    /// `predicate`.
    ///
    /// The predicate sees each candidate under a shared lock. The result is
    /// null if nothing matches, or if the match is removed before it can be
    /// locked under `mode`.
    pub fn find_with_lock<F>(&self, mut predicate: F, mode: SafetyMode) -> SafePtr<'_, T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut cursor = SafePtr::from_collection(self, SafetyMode::ReadOnly);

        while let Some(value) = cursor.get() {
            if predicate(value) {
                cursor.set_safety_mode(mode);
                return cursor;
            }
            cursor.next();
        }

        cursor
    }

    /// Iterates over the available members, yielding an independent guarded
    /// pointer per member.
    pub fn iter(&self, mode: SafetyMode) -> SafeCollectionIter<'_, T> {
        SafeCollectionIter::new(SafePtr::from_collection(self, SafetyMode::ReferenceOnly), mode)
    }

    // Inserts `object` under the items lock, after unlinking the member at
    // the index `locate` returns. Locating `object` itself is a no-op.
    //
    fn add_with<L, F>(&self, object: Arc<SafeObject<T>>, locate: L, insert: F) -> bool
    where
        L: FnOnce(&C) -> Option<usize>,
        F: FnOnce(&mut C, Arc<SafeObject<T>>),
    {
        let (added, replaced) = {
            let mut items = self.inner.items.lock();

            let located = locate(&*items);
            if located
                .and_then(|index| items.get_at(index))
                .is_some_and(|current| Arc::ptr_eq(current, &object))
            {
                return true;
            }

            let replaced = located.and_then(|index| self.inner.unlink(&mut items, index));

            debug_assert!(!items.contains(&object), "object already in collection");

            let added = object.safe_reference();
            if added {
                insert(&mut *items, object);
            }
            (added, replaced)
        };

        if let Some(replaced) = replaced {
            self.inner.release(replaced);
        }
        added
    }
}

impl<T, C, R> SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: SequenceContainer<T>,
    R: Reclaim<T>,
{
    /// Appends `object`, first removing `replacing` if given.
    ///
    /// Adding an object in place of itself does nothing. Returns `false` if
    /// `object` is being removed.
    pub fn safe_add(&self, object: Arc<SafeObject<T>>, replacing: Option<&SafeObject<T>>) -> bool {
        if replacing.is_some_and(|replacing| std::ptr::eq(Arc::as_ptr(&object), replacing)) {
            return true;
        }

        self.add_with(
            object,
            |items| replacing.and_then(|replacing| items.index_of(replacing)),
            |items, object| items.append(object),
        )
    }

    pub fn append(&self, object: Arc<SafeObject<T>>) -> bool {
        self.safe_add(object, None)
    }

    /// Inserts at `index`, or appends when `index` is past the end.
    pub fn insert_at(&self, index: usize, object: Arc<SafeObject<T>>) -> bool {
        self.add_with(object, |_| None, |items, object| items.insert_at(index, object))
    }

    /// Puts `object` at `index`, removing the member it replaces. Appends
    /// when `index` is past the end. Returns `false`, replacing nothing, if
    /// `object` is being removed.
    pub fn set_at(&self, index: usize, object: Arc<SafeObject<T>>) -> bool {
        let (added, replaced) = {
            let mut items = self.inner.items.lock();

            if items.get_at(index).is_some_and(|current| Arc::ptr_eq(current, &object)) {
                return true;
            }

            debug_assert!(!items.contains(&object), "object already in collection");

            if !object.safe_reference() {
                (false, None)
            } else {
                let replaced = items.set_at(index, object);
                if let Some(replaced) = replaced.as_ref() {
                    self.inner.retire(replaced);
                }
                (true, replaced)
            }
        };

        if let Some(replaced) = replaced {
            self.inner.release(replaced);
        }
        added
    }

    /// Non-owning snapshot of the available members of `other`.
    ///
    /// The copy holds its own reference on every member but never deletes
    /// one that `other` owns.
    pub fn copy_from<C2, R2>(other: &SafeCollection<T, C2, R2>) -> Self
    where
        C2: ObjectContainer<T>,
        R2: Reclaim<T>,
        R: Default,
    {
        let mut items = C::default();
        {
            let source = other.inner.items.lock();
            for index in 0..source.len() {
                if let Some(object) = source.get_at(index).filter(|object| object.safe_reference()) {
                    items.append(Arc::clone(object));
                }
            }
        }

        Self::from_parts(
            items,
            CollectionOptions::default().with_delete_objects(false),
            R::default(),
        )
    }
}

impl<T, R> SafeCollection<T, ObjectList<T>, R>
where
    T: Send + Sync + 'static,
    R: Reclaim<T>,
{
    pub fn prepend(&self, object: Arc<SafeObject<T>>) -> bool {
        self.add_with(object, |_| None, |items, object| items.prepend(object))
    }
}

impl<K, T, R> SafeCollection<T, ObjectDictionary<K, T>, R>
where
    K: Hash + Eq + Send + 'static,
    T: Send + Sync + 'static,
    R: Reclaim<T>,
{
    /// Stores `object` under `key`. A previous value keeps its position and
    /// is removed. Returns `false` if `object` is being removed.
    pub fn set_key(&self, key: K, object: Arc<SafeObject<T>>) -> bool {
        let (added, replaced) = {
            let mut items = self.inner.items.lock();

            if items.get(&key).is_some_and(|current| Arc::ptr_eq(current, &object)) {
                return true;
            }

            debug_assert!(!items.contains(&object), "object already in collection");

            if !object.safe_reference() {
                (false, None)
            } else {
                let replaced = items.insert(key, object);
                if let Some(replaced) = replaced.as_ref() {
                    self.inner.retire(replaced);
                }
                (true, replaced)
            }
        };

        if let Some(replaced) = replaced {
            self.inner.release(replaced);
        }
        added
    }

    /// Guarded pointer to the value under `key`, null if there is none or
    /// it is being removed.
    pub fn get_key(&self, key: &K, mode: SafetyMode) -> SafePtr<'_, T> {
        let found = {
            let items = self.inner.items.lock();
            items
                .get_full(key)
                .and_then(|(position, _)| {
                    CollectionInner::<T, ObjectDictionary<K, T>, R>::reference_at(&*items, position)
                })
        };

        match found {
            Some(landing) => SafePtr::adopt(Some(self as &dyn SafeEnumerable<T>), landing, mode),
            None => SafePtr::null(mode),
        }
    }

    pub fn remove_key(&self, key: &K) -> bool {
        let removed = {
            let mut items = self.inner.items.lock();
            items.remove(key).inspect(|object| self.inner.retire(object))
        };

        self.finish_removal(removed)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.items.lock().contains_key(key)
    }

    /// Snapshot of the keys, in insertion order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.items.lock().keys().cloned().collect()
    }

    /// Non-owning snapshot of the available entries of `other`.
    pub fn copy_from_dictionary<R2>(other: &SafeCollection<T, ObjectDictionary<K, T>, R2>) -> Self
    where
        K: Clone,
        R2: Reclaim<T>,
        R: Default,
    {
        let mut items = ObjectDictionary::default();
        {
            let source = other.inner.items.lock();
            for index in 0..source.len() {
                let (Some(key), Some(object)) = (source.key_at(index), source.get_at(index)) else {
                    continue;
                };
                if object.safe_reference() {
                    items.insert(key.clone(), Arc::clone(object));
                }
            }
        }

        Self::from_parts(
            items,
            CollectionOptions::default().with_delete_objects(false),
            R::default(),
        )
    }
}

impl<T, C, R> Default for SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T> + Default,
{
    fn default() -> Self {
        Self::with_reclaim(R::default())
    }
}

impl<T, C, R> SafeEnumerable<T> for SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    fn reference_from(&self, start: usize, direction: Direction) -> Option<Landing<T>> {
        let items = self.inner.items.lock();
        self.inner.scan(&items, start, direction)
    }

    fn reference_next(
        &self,
        current: &SafeObject<T>,
        last: &Placement<T>,
        direction: Direction,
    ) -> Option<Landing<T>> {
        let items = self.inner.items.lock();

        let index = items
            .get_at(last.index)
            .filter(|member| std::ptr::eq(Arc::as_ptr(member), current))
            .map(|_| last.index)
            .or_else(|| items.index_of(current));

        let start = match index {
            Some(index) => match direction {
                Direction::Forward => index + 1,
                Direction::Backward => index.checked_sub(1)?,
            },
            None => {
                // Current member is gone: continue just past the neighbour
                // behind it, or from the one ahead of it.
                //
                let position = |neighbour: &Weak<SafeObject<T>>| items.index_of_ptr(neighbour.as_ptr());
                match direction {
                    Direction::Forward => match position(&last.previous) {
                        Some(index) => index + 1,
                        None => position(&last.next)?,
                    },
                    Direction::Backward => match position(&last.next) {
                        Some(index) => index.checked_sub(1)?,
                        None => position(&last.previous)?,
                    },
                }
            }
        };

        self.inner.scan(&items, start, direction)
    }

    fn locate_member(&self, object: &SafeObject<T>) -> Option<Placement<T>> {
        let items = self.inner.items.lock();
        let index = items.index_of(object)?;
        Some(CollectionInner::<T, C, R>::placement(&*items, index))
    }

    fn delete_object(&self, object: Arc<SafeObject<T>>) {
        self.inner.reclaim.delete_object(object);
    }
}

impl<T, C, R> Drop for SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    fn drop(&mut self) {
        self.stop_auto_delete_objects();
        self.inner.remove_all();

        let remaining = std::mem::take(&mut *self.inner.to_be_removed.lock());
        for object in remaining {
            let claimed = (self.inner.reclaim.garbage_collection(&object) && object.try_claim_owned())
                || object.detach_owner();

            if claimed {
                self.inner.reclaim.delete_object(object);
            } else {
                tracing::trace!(object = ?object, "object still referenced, detached from dropped collection");
            }
        }
    }
}

impl<T, C, R> fmt::Debug for SafeCollection<T, C, R>
where
    T: Send + Sync + 'static,
    C: ObjectContainer<T>,
    R: Reclaim<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeCollection")
            .field("len", &self.len())
            .field("pending_removal", &self.pending_removal())
            .field("delete_objects", &self.delete_objects())
            .field("auto_deleting", &self.is_auto_deleting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::guard::DeferredReclaim;

    type Deferred = SafeArray<i32, DeferredReclaim<i32>>;

    fn deferred(count: i32) -> (Deferred, Vec<Arc<SafeObject<i32>>>) {
        let collection = Deferred::with_reclaim(DeferredReclaim::new());
        let objects: Vec<_> = (0..count).map(SafeObject::new).collect();
        for object in &objects {
            assert!(collection.append(object.clone()));
        }
        (collection, objects)
    }

    #[test]
    fn test_remove_waits_for_pointer_release() {
        let (collection, objects) = deferred(3);
        let b = &objects[1];

        let ptr = SafePtr::new(b.clone(), SafetyMode::ReadWrite);

        thread::scope(|scope| {
            scope.spawn(|| assert!(collection.safe_remove(b)));
        });

        assert!(b.is_being_removed());
        assert!(!b.safely_can_be_deleted());
        assert!(!collection.delete_objects_to_be_removed());
        assert_eq!(collection.pending_removal(), 1);
        assert!(!collection.reclaim().was_deleted(b));

        drop(ptr);
        assert!(b.safely_can_be_deleted());

        collection.delete_objects_to_be_removed();
        assert!(collection.reclaim().was_deleted(b));
        assert_eq!(collection.pending_removal(), 0);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_safe_add_rejects_removed_object() {
        let collection: SafeArray<i32> = SafeArray::new();
        let object = SafeObject::new(1);
        object.safe_remove();

        assert!(!collection.append(object.clone()));
        assert!(collection.is_empty());
        assert_eq!(object.reference_count(), 0);
    }

    #[test]
    fn test_safe_add_replacing() {
        let (collection, objects) = deferred(2);
        let replacement = SafeObject::new(10);

        assert!(collection.safe_add(objects[0].clone(), Some(&objects[0])));
        assert_eq!(collection.len(), 2);

        assert!(collection.safe_add(replacement.clone(), Some(&objects[0])));
        assert!(objects[0].is_being_removed());
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.index_of(&replacement), Some(1));

        assert!(!collection.delete_objects_to_be_removed());
        assert!(collection.reclaim().was_deleted(&objects[0]));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "object already in collection")]
    fn test_duplicate_insertion_panics() {
        let collection: SafeArray<i32> = SafeArray::new();
        let object = SafeObject::new(1);

        collection.append(object.clone());
        collection.append(object);
    }

    #[test]
    fn test_set_at_and_insert_at() {
        let (collection, objects) = deferred(3);

        let middle = SafeObject::new(10);
        assert!(collection.set_at(1, middle.clone()));
        assert_eq!(collection.index_of(&middle), Some(1));
        assert!(objects[1].is_being_removed());

        let front = SafeObject::new(20);
        assert!(collection.insert_at(0, front.clone()));
        assert_eq!(collection.index_of(&front), Some(0));

        let tail = SafeObject::new(30);
        assert!(collection.set_at(99, tail.clone()));
        assert_eq!(collection.index_of(&tail), Some(4));
        assert_eq!(collection.pending_removal(), 1);

        // A removed object replaces nothing.
        let removed = SafeObject::new(40);
        removed.safe_remove();
        assert!(!collection.set_at(0, removed.clone()));
        assert_eq!(collection.index_of(&front), Some(0));
        assert!(!front.is_being_removed());
        assert_eq!(collection.pending_removal(), 1);
    }

    #[test]
    fn test_get_and_find_with_lock() {
        let (collection, objects) = deferred(5);

        let ptr = collection.get_with_lock(3, SafetyMode::ReadOnly);
        assert_eq!(ptr.get(), Some(&3));
        assert_eq!(ptr.position(), Some(3));
        drop(ptr);

        assert!(collection.get_with_lock(5, SafetyMode::ReadOnly).is_null());

        objects[2].safe_remove();
        assert!(collection.get_with_lock(2, SafetyMode::ReadOnly).is_null());

        let found = collection.find_with_lock(|value| value % 2 == 0 && *value > 0, SafetyMode::ReadWrite);
        assert_eq!(found.get(), Some(&4));
        assert_eq!(found.safety_mode(), SafetyMode::ReadWrite);
        drop(found);

        assert!(collection.find_with_lock(|value| *value > 10, SafetyMode::ReadOnly).is_null());
    }

    #[test]
    fn test_remove_all_synchronous_waits_for_pointer() {
        let options = CollectionOptions::new().with_drain_poll_interval(Duration::from_millis(1));
        let collection = Deferred::with_options(options, DeferredReclaim::new()).unwrap();
        let objects: Vec<_> = (0..4).map(SafeObject::new).collect();
        for object in &objects {
            collection.append(object.clone());
        }

        let held = SafePtr::new(objects[2].clone(), SafetyMode::ReadOnly);
        let drained = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                collection.remove_all(true);
                drained.store(true, Ordering::Release);
            });

            thread::sleep(Duration::from_millis(50));
            assert!(!drained.load(Ordering::Acquire));
            drop(held);
        });

        assert!(drained.load(Ordering::Acquire));
        assert!(collection.is_empty());
        assert_eq!(collection.pending_removal(), 0);
        assert_eq!(collection.reclaim().deleted_count(), 4);
    }

    #[test]
    fn test_auto_delete_sweeps_in_background() {
        let options = CollectionOptions::new().with_sweep_interval(Duration::from_millis(5));
        let collection = Deferred::with_options(options, DeferredReclaim::new()).unwrap();
        for i in 0..3 {
            collection.append(SafeObject::new(i));
        }

        collection.set_auto_delete_objects().unwrap();
        assert!(collection.is_auto_deleting());
        assert!(matches!(
            collection.set_auto_delete_objects(),
            Err(SafeError::AutoDeleteActive)
        ));

        collection.remove_all(false);

        let started = Instant::now();
        while collection.pending_removal() > 0 {
            assert!(started.elapsed() < Duration::from_secs(10));
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(collection.reclaim().deleted_count(), 3);

        assert!(collection.stop_auto_delete_objects());
        assert!(!collection.is_auto_deleting());
        assert!(!collection.stop_auto_delete_objects());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = CollectionOptions::new().with_sweep_interval(Duration::ZERO);
        let result = SafeArray::<i32>::with_options(options, DropReclaim);
        assert!(matches!(result, Err(SafeError::ZeroInterval { .. })));
    }

    #[test]
    fn test_copy_does_not_own_members() {
        let (source, objects) = deferred(3);
        objects[1].safe_remove();

        let copy: SafeArray<i32> = SafeArray::copy_from(&source);
        assert!(!copy.delete_objects());
        assert_eq!(copy.len(), 2);
        assert_eq!(objects[0].reference_count(), 2);

        // Removed from the owner: the copy's release does not delete.
        assert!(source.safe_remove(&objects[0]));
        assert!(copy.safe_remove(&objects[0]));
        assert_eq!(copy.pending_removal(), 0);
        assert!(!objects[0].is_deletion_claimed());

        source.delete_objects_to_be_removed();
        assert!(source.reclaim().was_deleted(&objects[0]));
    }

    #[test]
    fn test_unowned_removal_deletes_immediately() {
        let options = CollectionOptions::new().with_delete_objects(false);
        let collection = Deferred::with_options(options, DeferredReclaim::new()).unwrap();
        let object = SafeObject::new(1);
        collection.append(object.clone());

        assert!(collection.safe_remove(&object));
        assert_eq!(collection.pending_removal(), 0);
        assert!(collection.reclaim().was_deleted(&object));
    }

    #[test]
    fn test_drop_detaches_referenced_objects() {
        let (collection, objects) = deferred(3);
        let held = SafePtr::new(objects[1].clone(), SafetyMode::ReadOnly);
        let weak = Arc::downgrade(&objects[1]);
        drop(objects);

        drop(collection);

        // The detached object is deleted by the last pointer.
        assert!(weak.upgrade().is_some());
        assert_eq!(held.get(), Some(&1));
        drop(held);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_dictionary_operations() {
        let dictionary: SafeDictionary<&str, i32> = SafeDictionary::new();
        let first = SafeObject::new(1);

        assert!(dictionary.set_key("a", first.clone()));
        assert!(dictionary.set_key("b", SafeObject::new(2)));
        assert!(dictionary.set_key("a", first.clone()));
        assert_eq!(first.reference_count(), 1);

        let ptr = dictionary.get_key(&"b", SafetyMode::ReadOnly);
        assert_eq!(ptr.get(), Some(&2));
        assert_eq!(ptr.position(), Some(1));
        drop(ptr);

        assert!(dictionary.set_key("a", SafeObject::new(3)));
        assert!(first.is_being_removed());
        assert_eq!(dictionary.keys(), vec!["a", "b"]);

        let values: Vec<i32> = dictionary
            .iter(SafetyMode::ReadOnly)
            .map(|ptr| *ptr.get().unwrap())
            .collect();
        assert_eq!(values, vec![3, 2]);

        let copy: SafeDictionary<&str, i32> = SafeDictionary::copy_from_dictionary(&dictionary);
        assert_eq!(copy.keys(), vec!["a", "b"]);

        assert!(dictionary.remove_key(&"b"));
        assert!(!dictionary.remove_key(&"b"));
        assert!(!dictionary.contains_key(&"b"));
        assert!(copy.contains_key(&"b"));
        assert!(copy.get_key(&"b", SafetyMode::ReadOnly).is_null());
    }

    #[test]
    fn test_list_prepend() {
        let list: SafeList<i32> = SafeList::new();
        list.append(SafeObject::new(1));
        list.prepend(SafeObject::new(0));

        let values: Vec<i32> = list.iter(SafetyMode::ReadOnly).map(|ptr| *ptr.get().unwrap()).collect();
        assert_eq!(values, vec![0, 1]);
    }
}
