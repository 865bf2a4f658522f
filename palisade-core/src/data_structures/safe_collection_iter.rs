use crate::pointer::{SafePtr, SafetyMode};

/// Iterator over the available members of a
/// [`SafeCollection`](super::SafeCollection).
///
/// Driven by a reference-only cursor, so holding a yielded pointer (in any
/// mode) never blocks the iteration itself. Members removed before they are
/// reached are skipped.
///
pub struct SafeCollectionIter<'c, T> {
    cursor: SafePtr<'c, T>,
    mode: SafetyMode,
    started: bool,
}

impl<'c, T> SafeCollectionIter<'c, T> {
    pub(crate) fn new(cursor: SafePtr<'c, T>, mode: SafetyMode) -> Self {
        SafeCollectionIter {
            cursor,
            mode,
            started: false,
        }
    }
}

impl<'c, T> Iterator for SafeCollectionIter<'c, T> {
    type Item = SafePtr<'c, T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.started {
                self.cursor.next();
            }
            self.started = true;

            if self.cursor.is_null() {
                return None;
            }

            // Lost the race with a removal between stepping and locking.
            //
            let item = self.cursor.duplicate(self.mode);
            if !item.is_null() {
                return Some(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::data_structures::SafeList;
    use crate::object::SafeObject;
    use crate::pointer::SafetyMode;

    #[test]
    fn test_iter_yields_independent_pointers() {
        let collection: SafeList<i32> = SafeList::new();
        for i in 0..4 {
            collection.append(SafeObject::new(i));
        }

        let pointers: Vec<_> = collection.iter(SafetyMode::ReadOnly).collect();
        let values: Vec<i32> = pointers.iter().filter_map(|ptr| ptr.get().copied()).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);

        // Every yielded pointer keeps its own reference.
        assert!(pointers.iter().all(|ptr| ptr.object().unwrap().reference_count() == 2));
    }

    #[test]
    fn test_iter_write_mode_while_holding_items() {
        let collection: SafeList<i32> = SafeList::new();
        for i in 0..3 {
            collection.append(SafeObject::new(i));
        }

        for mut ptr in collection.iter(SafetyMode::ReadWrite) {
            *ptr.get_mut().unwrap() *= 10;
        }

        let values: Vec<i32> = collection
            .iter(SafetyMode::ReadOnly)
            .map(|ptr| *ptr.get().unwrap())
            .collect();
        assert_eq!(values, vec![0, 10, 20]);
    }

    #[test]
    fn test_iter_skips_removed() {
        let collection: SafeList<i32> = SafeList::new();
        for i in 0..5 {
            collection.append(SafeObject::new(i));
        }

        let mut iter = collection.iter(SafetyMode::ReadOnly);
        assert_eq!(iter.next().unwrap().get(), Some(&0));

        assert!(collection.safe_remove_at(1));
        assert!(collection.safe_remove_at(1));

        let rest: Vec<i32> = iter.map(|ptr| *ptr.get().unwrap()).collect();
        assert_eq!(rest, vec![3, 4]);
    }
}
