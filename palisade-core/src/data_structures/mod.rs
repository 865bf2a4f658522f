mod container;
mod safe_collection;
mod safe_collection_iter;

pub use container::{ObjectArray, ObjectContainer, ObjectDictionary, ObjectList, SequenceContainer};
pub use safe_collection::{SafeArray, SafeCollection, SafeDictionary, SafeList};
pub use safe_collection_iter::SafeCollectionIter;
