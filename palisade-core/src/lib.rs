#![allow(dead_code)]

pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod guard;
pub mod object;
pub mod options;
pub mod pointer;
pub mod preemptive_synchronization;

// Re-export the main types for convenience
pub use data_structures::{SafeArray, SafeCollection, SafeDictionary, SafeList};
pub use error::SafeError;
pub use guard::{DeferredReclaim, DropReclaim, Reclaim};
pub use object::{SafeObject, SafeReadGuard, SafeWriteGuard};
pub use options::CollectionOptions;
pub use pointer::{SafePtr, SafetyMode, SharedSafePtr};

/*

cargo llvm-cov --html

cargo test --release -- --nocapture stress

*/
