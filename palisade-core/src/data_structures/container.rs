//! Plain containers of guarded objects.
//!
//! These are not thread safe. A [`SafeCollection`](super::SafeCollection)
//! owns one and never touches it without holding its structural mutex.
//!
//! ```text
//! ObjectContainer (index access, identity lookup, removal)
//!    │
//!    ├── SequenceContainer (append / insert / replace by index)
//!    │      ├── ObjectArray   (Vec)
//!    │      └── ObjectList    (VecDeque)
//!    │
//!    └── ObjectDictionary (insertion ordered, keyed)
//! ```

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::object::SafeObject;

/// Index-based container of guarded objects.
///
/// Members are compared by identity, never by value. Removing a member must
/// shift later members down by one so enumeration by index stays ordered.
///
pub trait ObjectContainer<T>: Default + Send + 'static {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, index: usize) -> Option<&Arc<SafeObject<T>>>;

    fn remove_at(&mut self, index: usize) -> Option<Arc<SafeObject<T>>>;

    /// Position of `object` in the container, by identity.
    fn index_of(&self, object: &SafeObject<T>) -> Option<usize> {
        self.index_of_ptr(object)
    }

    /// Position of the member at address `object`. Never dereferences it, so
    /// the address may come from a [`Weak`](std::sync::Weak) whose object is
    /// gone.
    fn index_of_ptr(&self, object: *const SafeObject<T>) -> Option<usize> {
        (0..self.len()).find(|&index| {
            self.get_at(index)
                .is_some_and(|member| std::ptr::eq(Arc::as_ptr(member), object))
        })
    }

    fn contains(&self, object: &SafeObject<T>) -> bool {
        self.index_of(object).is_some()
    }
}

/// Container whose positions are assigned by the caller.
pub trait SequenceContainer<T>: ObjectContainer<T> {
    fn append(&mut self, object: Arc<SafeObject<T>>);

    /// Inserts at `index`, or appends when `index` is past the end.
    fn insert_at(&mut self, index: usize, object: Arc<SafeObject<T>>);

    /// Replaces the member at `index` and returns it. Appends and returns
    /// `None` when `index` is past the end.
    fn set_at(&mut self, index: usize, object: Arc<SafeObject<T>>) -> Option<Arc<SafeObject<T>>>;
}

/// Contiguous array of guarded objects.
pub struct ObjectArray<T> {
    objects: Vec<Arc<SafeObject<T>>>,
}

impl<T> Default for ObjectArray<T> {
    fn default() -> Self {
        ObjectArray {
            objects: Vec::new(),
        }
    }
}

impl<T: Send + Sync + 'static> ObjectContainer<T> for ObjectArray<T> {
    fn len(&self) -> usize {
        self.objects.len()
    }

    fn get_at(&self, index: usize) -> Option<&Arc<SafeObject<T>>> {
        self.objects.get(index)
    }

    fn remove_at(&mut self, index: usize) -> Option<Arc<SafeObject<T>>> {
        (index < self.objects.len()).then(|| self.objects.remove(index))
    }
}

impl<T: Send + Sync + 'static> SequenceContainer<T> for ObjectArray<T> {
    fn append(&mut self, object: Arc<SafeObject<T>>) {
        self.objects.push(object);
    }

    fn insert_at(&mut self, index: usize, object: Arc<SafeObject<T>>) {
        let index = index.min(self.objects.len());
        self.objects.insert(index, object);
    }

    fn set_at(&mut self, index: usize, object: Arc<SafeObject<T>>) -> Option<Arc<SafeObject<T>>> {
        match self.objects.get_mut(index) {
            Some(slot) => Some(std::mem::replace(slot, object)),
            None => {
                self.objects.push(object);
                None
            }
        }
    }
}

/// Double-ended list of guarded objects.
pub struct ObjectList<T> {
    objects: VecDeque<Arc<SafeObject<T>>>,
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        ObjectList {
            objects: VecDeque::new(),
        }
    }
}

impl<T> ObjectList<T> {
    pub fn prepend(&mut self, object: Arc<SafeObject<T>>) {
        self.objects.push_front(object);
    }
}

impl<T: Send + Sync + 'static> ObjectContainer<T> for ObjectList<T> {
    fn len(&self) -> usize {
        self.objects.len()
    }

    fn get_at(&self, index: usize) -> Option<&Arc<SafeObject<T>>> {
        self.objects.get(index)
    }

    fn remove_at(&mut self, index: usize) -> Option<Arc<SafeObject<T>>> {
        self.objects.remove(index)
    }
}

impl<T: Send + Sync + 'static> SequenceContainer<T> for ObjectList<T> {
    fn append(&mut self, object: Arc<SafeObject<T>>) {
        self.objects.push_back(object);
    }

    fn insert_at(&mut self, index: usize, object: Arc<SafeObject<T>>) {
        let index = index.min(self.objects.len());
        self.objects.insert(index, object);
    }

    fn set_at(&mut self, index: usize, object: Arc<SafeObject<T>>) -> Option<Arc<SafeObject<T>>> {
        match self.objects.get_mut(index) {
            Some(slot) => Some(std::mem::replace(slot, object)),
            None => {
                self.objects.push_back(object);
                None
            }
        }
    }
}

/// Keyed container that keeps insertion order, so it can be enumerated by
/// index like the sequences.
pub struct ObjectDictionary<K, T> {
    objects: IndexMap<K, Arc<SafeObject<T>>>,
}

impl<K, T> Default for ObjectDictionary<K, T> {
    fn default() -> Self {
        ObjectDictionary {
            objects: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq, T> ObjectDictionary<K, T> {
    pub fn get(&self, key: &K) -> Option<&Arc<SafeObject<T>>> {
        self.objects.get(key)
    }

    /// Value under `key` with its position.
    pub fn get_full(&self, key: &K) -> Option<(usize, &Arc<SafeObject<T>>)> {
        self.objects
            .get_full(key)
            .map(|(index, _, object)| (index, object))
    }

    /// Inserts or replaces. A replaced member keeps its position.
    pub fn insert(&mut self, key: K, object: Arc<SafeObject<T>>) -> Option<Arc<SafeObject<T>>> {
        self.objects.insert(key, object)
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<SafeObject<T>>> {
        self.objects.shift_remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.objects.contains_key(key)
    }

    pub fn key_at(&self, index: usize) -> Option<&K> {
        self.objects.get_index(index).map(|(key, _)| key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.objects.keys()
    }
}

impl<K, T> ObjectContainer<T> for ObjectDictionary<K, T>
where
    K: Hash + Eq + Send + 'static,
    T: Send + Sync + 'static,
{
    fn len(&self) -> usize {
        self.objects.len()
    }

    fn get_at(&self, index: usize) -> Option<&Arc<SafeObject<T>>> {
        self.objects.get_index(index).map(|(_, object)| object)
    }

    fn remove_at(&mut self, index: usize) -> Option<Arc<SafeObject<T>>> {
        self.objects.shift_remove_index(index).map(|(_, object)| object)
    }
}
