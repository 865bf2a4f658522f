//! The guarded object and its locks.

mod object_lock;
mod safe_object;
mod scoped_guard;

pub use safe_object::SafeObject;
pub use scoped_guard::{SafeReadGuard, SafeWriteGuard};
