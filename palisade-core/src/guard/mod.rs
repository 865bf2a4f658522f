//! Reclamation strategies for guarded objects.
//!
//! This module defines the `Reclaim` trait that decides when a removed object
//! may be reclaimed and how it is deleted.
//!
//! # Design
//!
//! Collections are generic over their reclamation strategy:
//!
//! ```text
//! SafeCollection<T, C, R: Reclaim<T>>
//!     │
//!     ├── SafeArray<T, DropReclaim>       (delete = drop the last handle)
//!     ├── SafeArray<T, DeferredReclaim>   (delete = park until drained)
//!     └── SafeArray<T, MyIoReclaim>       (postpone while I/O is in flight)
//! ```
//!
//! A guarded pointer enumerating a collection deletes through the strategy of
//! that collection, so removal and pointer release end in the same hook.

mod deferred_reclaim;

use std::sync::Arc;

pub use deferred_reclaim::DeferredReclaim;

use crate::object::SafeObject;

/// Decides reclamation of removed [`SafeObject`]s.
///
/// # Contract
///
/// - `garbage_collection` is called by reclamation sweeps before the object
///   is checked for deletability. Returning `false` postpones reclamation
///   to a later sweep (for example while background I/O on the object is
///   still in flight).
/// - `delete_object` receives an object whose deletion has been claimed:
///   it is being removed and no reference is left. It is called exactly
///   once per object.
///
pub trait Reclaim<T>: Send + Sync + 'static {
    fn garbage_collection(&self, _object: &SafeObject<T>) -> bool {
        true
    }

    fn delete_object(&self, object: Arc<SafeObject<T>>) {
        drop(object);
    }
}

/// Deletes objects by dropping the collection's handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropReclaim;

impl<T: 'static> Reclaim<T> for DropReclaim {}
