//! The built-in container classes.

pub mod array;
pub mod bag;
pub mod list;
pub mod map;
pub mod raw_array;
mod seq;
pub mod string;
pub mod tuple;

pub use self::array::{Array, ArrayIter, ARRAY_CLASS, ARRAY_ITER_CLASS};
pub use self::bag::{Bag, BagEntry, BagIter, BAG_CLASS, BAG_ITER_CLASS};
pub use self::list::{List, LIST_CLASS, LIST_ITER_CLASS};
pub use self::map::{
    DoubleMap, FloatMap, IntMap, LongDoubleMap, LongFloatMap, LongIntMap, LongLongMap, LongMap,
    Map, StringMap,
};
pub use self::raw_array::{ByteArray, DoubleArray, IntArray, LongArray, ShortArray, StructArray};
pub use self::string::{RtString, STRING_CLASS};
pub use self::tuple::{Pair, Triple, PAIR_CLASS, TRIPLE_CLASS};

use crate::class::ClassVocabulary;

/// Every container and iterator class, for the registry to start with.
pub(crate) fn builtin_classes() -> Vec<&'static ClassVocabulary> {
    let mut classes: Vec<&'static ClassVocabulary> = vec![
        &ARRAY_CLASS,
        &ARRAY_ITER_CLASS,
        &BAG_CLASS,
        &BAG_ITER_CLASS,
        &LIST_CLASS,
        &LIST_ITER_CLASS,
        &STRING_CLASS,
        &PAIR_CLASS,
        &tuple::PAIR_ITER_CLASS,
        &TRIPLE_CLASS,
        &tuple::TRIPLE_ITER_CLASS,
    ];
    classes.extend(map::builtin_classes());
    classes.extend(raw_array::builtin_classes());
    classes
}
