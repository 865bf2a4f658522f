//! Common stress tests for guarded collections.
//!
//! These tests verify the reclamation protocol under high contention. Every
//! collection uses `DeferredReclaim`, which panics on a premature or repeated
//! deletion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use super::safe_collection_core_tests::{Checked, checked};
use crate::data_structures::SequenceContainer;
use crate::guard::DeferredReclaim;
use crate::object::SafeObject;
use crate::options::CollectionOptions;
use crate::pointer::{SafePtr, SafetyMode};

fn swept<C>() -> Checked<C>
where
    C: SequenceContainer<i32>,
{
    let options = CollectionOptions::new()
        .with_sweep_interval(Duration::from_millis(2))
        .with_drain_poll_interval(Duration::from_millis(1));
    Checked::<C>::with_options(options, DeferredReclaim::new()).unwrap()
}

/// Enumerators never lock a member whose removal completed before they
/// stepped, and never see members out of order, while removers pick random
/// members and the background sweeper reclaims them
pub fn test_enumeration_under_random_removal<C>()
where
    C: SequenceContainer<i32>,
{
    const COUNT: usize = 2000;

    let collection = swept::<C>();
    for i in 0..COUNT as i32 {
        collection.append(SafeObject::new(i));
    }
    collection.set_auto_delete_objects().unwrap();

    let stop = AtomicBool::new(false);
    let visited = AtomicUsize::new(0);

    // Removal sequence number per value, 0 while still a member.
    let removals = AtomicUsize::new(0);
    let removed_at: Vec<AtomicUsize> = (0..COUNT).map(|_| AtomicUsize::new(0)).collect();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let mut last = -1;
                    let mut cursor = SafePtr::from_collection(&collection, SafetyMode::ReadOnly);
                    loop {
                        let Some(value) = cursor.get().copied() else {
                            break;
                        };
                        assert!(value > last, "enumeration went backwards: {} after {}", value, last);
                        last = value;
                        visited.fetch_add(1, Ordering::Relaxed);

                        let completed = removals.load(Ordering::SeqCst);
                        if !cursor.next() {
                            break;
                        }

                        let Some(value) = cursor.get().copied() else {
                            break;
                        };
                        let removal = removed_at[value as usize].load(Ordering::SeqCst);
                        assert!(
                            removal == 0 || removal > completed,
                            "observed {} after its removal completed",
                            value
                        );
                    }
                }
            });
        }

        for _ in 0..2 {
            scope.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let len = collection.len();
                    if len == 0 {
                        break;
                    }

                    let ptr = collection.get_with_lock(fastrand::usize(0..len), SafetyMode::ReadOnly);
                    let Some(value) = ptr.get().copied() else {
                        continue;
                    };
                    let Some(object) = ptr.object_handle() else {
                        continue;
                    };
                    drop(ptr);

                    if collection.safe_remove(&object) {
                        let sequence = removals.fetch_add(1, Ordering::SeqCst) + 1;
                        removed_at[value as usize].store(sequence, Ordering::SeqCst);
                    }
                    thread::yield_now();
                }
            });
        }

        thread::sleep(Duration::from_secs(2));
        stop.store(true, Ordering::Relaxed);
    });

    collection.remove_all(true);
    assert_eq!(collection.reclaim().deleted_count(), COUNT);

    println!(
        "Visited: {}, Removed while enumerating: {}",
        visited.load(Ordering::Relaxed),
        removals.load(Ordering::Relaxed)
    );
}

/// A synchronous remove_all returns with both lists empty however many
/// pointers were taken during the drain
pub fn test_synchronous_teardown_under_transient_pointers<C>()
where
    C: SequenceContainer<i32>,
{
    let collection = swept::<C>();
    for i in 0..500 {
        collection.append(SafeObject::new(i));
    }

    let start = Barrier::new(5);
    let stop = AtomicBool::new(false);
    let held = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                start.wait();
                while !stop.load(Ordering::Relaxed) {
                    let index = fastrand::usize(0..500);
                    let ptr = collection.get_with_lock(index, SafetyMode::ReadWrite);
                    if !ptr.is_null() {
                        held.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(Duration::from_micros(50));
                    }
                }
            });
        }

        start.wait();
        thread::sleep(Duration::from_millis(20));
        collection.remove_all(true);

        assert!(collection.is_empty());
        assert_eq!(collection.pending_removal(), 0);
        stop.store(true, Ordering::Relaxed);
    });

    assert_eq!(collection.reclaim().deleted_count(), 500);
    println!("Pointers taken during teardown: {}", held.load(Ordering::Relaxed));
}

/// Adders, removers and readers race; every deletion is checked for
/// exactly-once and for happening only when unreferenced
pub fn test_concurrent_add_remove<C>()
where
    C: SequenceContainer<i32>,
{
    let collection = swept::<C>();
    collection.set_auto_delete_objects().unwrap();

    let added = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        for t in 0..4 {
            let collection = &collection;
            let added = &added;
            scope.spawn(move || {
                for i in 0..2000 {
                    if collection.append(SafeObject::new(t * 10000 + i)) {
                        added.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }

        for _ in 0..2 {
            scope.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let len = collection.len();
                    if len > 0 {
                        collection.safe_remove_at(fastrand::usize(0..len));
                    }
                }
            });
        }

        for _ in 0..4 {
            scope.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let index = fastrand::usize(0..64);
                    let mut ptr = collection.get_with_lock(index, SafetyMode::ReadWrite);
                    if let Some(value) = ptr.get_mut() {
                        *value = value.wrapping_add(1);
                    }
                }
            });
        }

        thread::sleep(Duration::from_millis(500));
        stop.store(true, Ordering::Relaxed);
    });

    collection.remove_all(true);
    assert_eq!(collection.reclaim().deleted_count(), added.load(Ordering::Relaxed));
}

/// Once a thread has observed removal, no later reference or lock succeeds
pub fn test_monotonic_removal<C>()
where
    C: SequenceContainer<i32>,
{
    for round in 0..200 {
        let (collection, objects) = checked::<C>(1);
        let object = &objects[0];
        let start = Barrier::new(5);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    start.wait();
                    let mut observed = false;
                    for _ in 0..1000 {
                        let referenced = object.safe_reference();
                        let locked = object.lock_read_only();
                        if locked {
                            unsafe { object.unlock_read_only() };
                        }
                        if referenced {
                            object.safe_dereference();
                        }

                        if observed {
                            assert!(!referenced && !locked, "round {}: reference after removal", round);
                        }
                        observed = object.is_being_removed();
                    }
                });
            }

            start.wait();
            collection.safe_remove(object);
        });

        collection.remove_all(true);
        assert!(collection.reclaim().was_deleted(object));
    }
}

/// Repeated synchronous teardown with writers holding locks
pub fn test_teardown_deadline<C>()
where
    C: SequenceContainer<i32>,
{
    let started = Instant::now();

    for _ in 0..20 {
        let (collection, _objects) = checked::<C>(50);

        thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let mut ptr = SafePtr::from_collection(&collection, SafetyMode::ReadWrite);
                while let Some(value) = ptr.get_mut() {
                    *value += 1;
                    thread::sleep(Duration::from_micros(100));
                    ptr.next();
                }
            });

            collection.remove_all(true);
            writer.join().unwrap();
        });

        assert_eq!(collection.reclaim().deleted_count(), 50);
    }

    assert!(started.elapsed() < Duration::from_secs(60));
}
