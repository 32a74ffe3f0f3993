//! Ordered maps over several key domains.
//!
//! Entries live in a vector sorted by key and are found by binary search. Object keys are
//! ordered by their own `compare`, float keys by a total order.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;

use kiln_types::layout::{KEYS_FIELD, MAP_FIELD};
use kiln_types::BaseType;
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;

use crate::class::{ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::error::{fail, Result, RtError};
use crate::iter::MapIter;
use crate::object::{Object, ObjectRef};
use crate::serial::{Reader, Writer};
use crate::value::Value;

pub trait MapKey: Clone + fmt::Debug + 'static {
    /// Written as a parallel `__keys` array rather than as field names.
    const OBJECT_KEYED: bool = false;

    fn compare_keys(&self, other: &Self) -> Result<Ordering>;
    fn keep_key(&self) {}
    fn release_key(&self) {}
    fn key_text(&self) -> String;
    fn parse_key(text: &str) -> Option<Self>;
    fn key_value(&self) -> Value;
    fn from_key_value(value: Value) -> Option<Self>;
}

pub trait MapValue: Clone + fmt::Debug + 'static {
    const BASE: BaseType;

    /// Storing a null value removes the key instead.
    fn is_null(&self) -> bool {
        false
    }
    fn keep_value(&self) {}
    fn release_value(&self) {}
    fn same_value(&self, other: &Self) -> bool;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! int_key {
    ($t:ty) => {
        impl MapKey for $t {
            fn compare_keys(&self, other: &Self) -> Result<Ordering> {
                Ok(self.cmp(other))
            }

            fn key_text(&self) -> String {
                self.to_string()
            }

            fn parse_key(text: &str) -> Option<Self> {
                text.parse().ok()
            }

            fn key_value(&self) -> Value {
                Value::from(*self)
            }

            fn from_key_value(value: Value) -> Option<Self> {
                value.to_number()
            }
        }
    };
}

macro_rules! float_key {
    ($t:ty, $variant:ident) => {
        impl MapKey for $t {
            fn compare_keys(&self, other: &Self) -> Result<Ordering> {
                Ok(OrderedFloat(*self).cmp(&OrderedFloat(*other)))
            }

            fn key_text(&self) -> String {
                self.to_string()
            }

            fn parse_key(text: &str) -> Option<Self> {
                text.parse().ok()
            }

            fn key_value(&self) -> Value {
                Value::$variant(*self)
            }

            fn from_key_value(value: Value) -> Option<Self> {
                value.to_number()
            }
        }
    };
}

int_key!(i32);
int_key!(i64);
float_key!(f32, Float);
float_key!(f64, Double);

impl MapKey for String {
    fn compare_keys(&self, other: &Self) -> Result<Ordering> {
        Ok(self.cmp(other))
    }

    fn key_text(&self) -> String {
        self.clone()
    }

    fn parse_key(text: &str) -> Option<Self> {
        Some(text.to_owned())
    }

    fn key_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_key_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl MapKey for ObjectRef {
    const OBJECT_KEYED: bool = true;

    fn compare_keys(&self, other: &Self) -> Result<Ordering> {
        self.compare(other)
    }

    fn keep_key(&self) {
        self.keep()
    }

    fn release_key(&self) {
        self.release()
    }

    fn key_text(&self) -> String {
        String::new()
    }

    fn parse_key(_text: &str) -> Option<Self> {
        None
    }

    fn key_value(&self) -> Value {
        Value::Object(self.clone())
    }

    fn from_key_value(value: Value) -> Option<Self> {
        value.into_object()
    }
}

impl MapValue for ObjectRef {
    const BASE: BaseType = BaseType::Object;

    fn is_null(&self) -> bool {
        ObjectRef::is_null(self)
    }

    fn keep_value(&self) {
        self.keep()
    }

    fn release_value(&self) {
        self.release()
    }

    fn same_value(&self, other: &Self) -> bool {
        self.same(other)
    }

    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        value.into_object()
    }
}

macro_rules! scalar_value {
    ($t:ty, $base:ident, $variant:ident) => {
        impl MapValue for $t {
            const BASE: BaseType = BaseType::$base;

            fn same_value(&self, other: &Self) -> bool {
                self == other
            }

            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }

            fn from_value(value: Value) -> Option<Self> {
                value.to_number()
            }
        }
    };
}

scalar_value!(i32, Int, Int);
scalar_value!(i64, Long, Long);
scalar_value!(f32, Float, Float);
scalar_value!(f64, Double, Double);

/// Binds a key domain and a value domain to a class.
pub trait MapFlavor: 'static {
    type Key: MapKey;
    type Value: MapValue;

    fn class() -> &'static ClassVocabulary;
    fn iter_class() -> &'static ClassVocabulary;
}

pub struct MapObject<F: MapFlavor> {
    entries: RefCell<Vec<(F::Key, F::Value)>>,
    // keys read from `__keys`, waiting for their values
    staged: RefCell<Vec<F::Key>>,
}

impl<F: MapFlavor> Default for MapObject<F> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            staged: RefCell::new(Vec::new()),
        }
    }
}

impl<F: MapFlavor> fmt::Debug for MapObject<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObject")
            .field("class", &F::class().name())
            .field("entries", &self.entries.borrow())
            .finish()
    }
}

fn construct_map<F: MapFlavor>(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(MapObject::<F>::default())
}

impl<F: MapFlavor> MapObject<F> {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(Self::default()))
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    // keys are cloned out one probe at a time: an object key's compare may run user code
    fn search(&self, key: &F::Key) -> Result<std::result::Result<usize, usize>> {
        let mut lo = 0;
        let mut hi = self.count();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = match self.entries.borrow().get(mid) {
                Some((k, _)) => k.clone(),
                None => return fail(RtError::illegal("map modified during lookup")),
            };
            match probe.compare_keys(key)? {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Associates `value` with `key`. A null object value removes the key.
    pub fn set(&self, key: F::Key, value: F::Value) -> Result<()> {
        if value.is_null() {
            self.remove(&key)?;
            return Ok(());
        }
        let found = self.search(&key)?;
        let len = self.count();
        key.keep_key();
        value.keep_value();
        match found {
            Ok(i) if i < len => {
                let (old_key, old_value) =
                    std::mem::replace(&mut self.entries.borrow_mut()[i], (key, value));
                old_key.release_key();
                old_value.release_value();
            }
            Err(i) if i <= len => self.entries.borrow_mut().insert(i, (key, value)),
            _ => {
                key.release_key();
                value.release_value();
                return fail(RtError::illegal("map modified during lookup"));
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &F::Key) -> Result<bool> {
        match self.search(key)? {
            Ok(i) => match self.remove_at(i) {
                Some((k, v)) => {
                    k.release_key();
                    v.release_value();
                    Ok(true)
                }
                None => Ok(false),
            },
            Err(_) => Ok(false),
        }
    }

    pub fn grab(&self, key: &F::Key) -> Result<Option<F::Value>> {
        Ok(match self.search(key)? {
            Ok(i) => self.entry_at(i).map(|(_, v)| v),
            Err(_) => None,
        })
    }

    /// An iterator on `key`'s entry.
    pub fn find(this: &ObjectRef, key: &F::Key) -> Result<Option<ObjectRef>> {
        let map = this.expect::<Self>()?;
        Ok(match map.search(key)? {
            Ok(i) => Some(MapIter::<F>::start(this, i)),
            Err(_) => None,
        })
    }

    /// The first key, in key order, mapped to `value`.
    pub fn find_value(&self, value: &F::Value) -> Option<F::Key> {
        self.entries
            .borrow()
            .iter()
            .find(|(_, v)| v.same_value(value))
            .map(|(k, _)| k.clone())
    }

    pub(crate) fn entry_at(&self, index: usize) -> Option<(F::Key, F::Value)> {
        self.entries.borrow().get(index).cloned()
    }

    /// Unlinks an entry without touching counts.
    pub(crate) fn remove_at(&self, index: usize) -> Option<(F::Key, F::Value)> {
        let mut entries = self.entries.borrow_mut();
        if index < entries.len() {
            Some(entries.remove(index))
        } else {
            None
        }
    }

    pub fn pairs(&self) -> Vec<(F::Key, F::Value)> {
        self.entries.borrow().clone()
    }

    pub fn keys(&self) -> Vec<F::Key> {
        self.entries.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.entries.borrow_mut());
        let staged = std::mem::take(&mut *self.staged.borrow_mut());
        for (k, v) in &old {
            k.release_key();
            v.release_value();
        }
        for k in &staged {
            k.release_key();
        }
    }

    pub fn duplicate(&self) -> ObjectRef {
        let entries = self.pairs();
        for (k, v) in &entries {
            k.keep_key();
            v.keep_value();
        }
        ObjectRef::wrap(Box::new(Self {
            entries: RefCell::new(entries),
            staged: RefCell::new(Vec::new()),
        }))
    }
}

impl<F: MapFlavor> Object for MapObject<F> {
    fn class(&self) -> &'static ClassVocabulary {
        F::class()
    }

    fn delete(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        let entries = self.pairs();
        if F::Key::OBJECT_KEYED {
            w.field(KEYS_FIELD)?;
            w.begin_array()?;
            for (k, _) in &entries {
                w.write_value(&k.key_value())?;
            }
            w.end_array()?;
            w.field(MAP_FIELD)?;
            w.begin_array()?;
            for (_, v) in &entries {
                w.write_value(&v.to_value())?;
            }
            return w.end_array();
        }
        w.field(MAP_FIELD)?;
        w.begin_object()?;
        for (k, v) in &entries {
            w.field(&k.key_text())?;
            w.write_value(&v.to_value())?;
        }
        w.end_object()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(MapIter::<F>::start(this, 0))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(MapIter::<F>::start(this, self.count()))
    }
}

fn read_map_value<F: MapFlavor>(r: &mut Reader<'_>) -> Result<F::Value> {
    let value = if F::Value::BASE == BaseType::Object {
        Value::Object(r.read_object_value()?)
    } else {
        r.read_scalar(F::Value::BASE)?
    };
    match F::Value::from_value(value) {
        Some(v) => Ok(v),
        None => Err(r.error(format!("bad {} value", F::class().name()))),
    }
}

fn read_map_field<F: MapFlavor>(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    let map = obj.expect::<MapObject<F>>()?;
    match field {
        KEYS_FIELD if F::Key::OBJECT_KEYED => r.read_sequence(|r| {
            let key = r.read_object_value()?;
            match F::Key::from_key_value(Value::Object(key)) {
                Some(key) => {
                    key.keep_key();
                    map.staged.borrow_mut().push(key);
                    Ok(())
                }
                None => Err(r.error("bad map key")),
            }
        })?,
        MAP_FIELD if F::Key::OBJECT_KEYED => {
            let keys = std::mem::take(&mut *map.staged.borrow_mut());
            let mut index = 0;
            let res = r.read_sequence(|r| {
                let value = read_map_value::<F>(r)?;
                match keys.get(index) {
                    Some(key) => {
                        index += 1;
                        map.set(key.clone(), value)
                    }
                    None => Err(r.error("map value without a key")),
                }
            });
            for key in &keys {
                key.release_key();
            }
            res?;
        }
        MAP_FIELD => r.read_map_entries(|r, text| {
            let key = match F::Key::parse_key(&text) {
                Some(key) => key,
                None => return Err(r.error(format!("bad map key \"{}\"", text))),
            };
            let value = read_map_value::<F>(r)?;
            map.set(key, value)
        })?,
        _ => return Ok(false),
    }
    Ok(true)
}

macro_rules! map_flavors {
    ($(
        $(#[$doc:meta])*
        $flavor:ident: $key:ty => $value:ty,
        $name:literal, $class:ident, $iter_class:ident, $map:ident, $iter:ident;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $flavor;

        pub static $class: Lazy<ClassVocabulary> = Lazy::new(|| {
            ClassBuilder::new($name)
                .parent(&OBJECT_CLASS)
                .interface(&ITERABLE)
                .construct(construct_map::<$flavor>)
                .custom_reader(read_map_field::<$flavor>)
                .build()
        });

        pub static $iter_class: Lazy<ClassVocabulary> = Lazy::new(|| {
            ClassBuilder::new(concat!($name, "Iterator"))
                .parent(&OBJECT_CLASS)
                .interface(&ITERATOR)
                .build()
        });

        impl MapFlavor for $flavor {
            type Key = $key;
            type Value = $value;

            fn class() -> &'static ClassVocabulary {
                &$class
            }

            fn iter_class() -> &'static ClassVocabulary {
                &$iter_class
            }
        }

        pub type $map = MapObject<$flavor>;
        pub type $iter = MapIter<$flavor>;
    )*};
}

map_flavors! {
    /// Object keys, ordered by the key objects' own compare.
    ObjectKeyed: ObjectRef => ObjectRef, "Map", MAP_CLASS, MAP_ITER_CLASS, Map, ObjMapIter;
    IntKeyed: i32 => ObjectRef, "IntMap", INT_MAP_CLASS, INT_MAP_ITER_CLASS, IntMap, IntMapIter;
    LongKeyed: i64 => ObjectRef, "LongMap", LONG_MAP_CLASS, LONG_MAP_ITER_CLASS, LongMap, LongMapIter;
    FloatKeyed: f32 => ObjectRef, "FloatMap", FLOAT_MAP_CLASS, FLOAT_MAP_ITER_CLASS, FloatMap, FloatMapIter;
    DoubleKeyed: f64 => ObjectRef, "DoubleMap", DOUBLE_MAP_CLASS, DOUBLE_MAP_ITER_CLASS, DoubleMap, DoubleMapIter;
    StringKeyed: String => ObjectRef, "StringMap", STRING_MAP_CLASS, STRING_MAP_ITER_CLASS, StringMap, StringMapIter;
    LongToInt: i64 => i32, "LongIntMap", LONG_INT_MAP_CLASS, LONG_INT_MAP_ITER_CLASS, LongIntMap, LongIntMapIter;
    LongToLong: i64 => i64, "LongLongMap", LONG_LONG_MAP_CLASS, LONG_LONG_MAP_ITER_CLASS, LongLongMap, LongLongMapIter;
    LongToFloat: i64 => f32, "LongFloatMap", LONG_FLOAT_MAP_CLASS, LONG_FLOAT_MAP_ITER_CLASS, LongFloatMap, LongFloatMapIter;
    LongToDouble: i64 => f64, "LongDoubleMap", LONG_DOUBLE_MAP_CLASS, LONG_DOUBLE_MAP_ITER_CLASS, LongDoubleMap, LongDoubleMapIter;
}

pub(crate) fn builtin_classes() -> Vec<&'static ClassVocabulary> {
    vec![
        &MAP_CLASS,
        &MAP_ITER_CLASS,
        &INT_MAP_CLASS,
        &INT_MAP_ITER_CLASS,
        &LONG_MAP_CLASS,
        &LONG_MAP_ITER_CLASS,
        &FLOAT_MAP_CLASS,
        &FLOAT_MAP_ITER_CLASS,
        &DOUBLE_MAP_CLASS,
        &DOUBLE_MAP_ITER_CLASS,
        &STRING_MAP_CLASS,
        &STRING_MAP_ITER_CLASS,
        &LONG_INT_MAP_CLASS,
        &LONG_INT_MAP_ITER_CLASS,
        &LONG_LONG_MAP_CLASS,
        &LONG_LONG_MAP_ITER_CLASS,
        &LONG_FLOAT_MAP_CLASS,
        &LONG_FLOAT_MAP_ITER_CLASS,
        &LONG_DOUBLE_MAP_CLASS,
        &LONG_DOUBLE_MAP_ITER_CLASS,
    ]
}

#[cfg(test)]
mod tests {
    use super::{DoubleMap, IntMap, LongDoubleMap, Map, StringMap};
    use crate::containers::RtString;
    use crate::object::ObjectRef;

    #[test]
    fn ordered_unique() {
        let m = IntMap::create();
        let map = m.expect::<IntMap>().unwrap();
        let a = RtString::with_text("a");
        let b = RtString::with_text("b");
        map.set(5, a.clone()).unwrap();
        map.set(-2, b.clone()).unwrap();
        map.set(5, b.clone()).unwrap();

        assert_eq!(map.keys(), vec![-2, 5]);
        assert!(a.is_deleted());
        assert_eq!(b.ref_count(), 2);
        assert_eq!(map.grab(&5).unwrap(), Some(b.clone()));
        assert_eq!(map.grab(&6).unwrap(), None);
        assert_eq!(map.find_value(&b), Some(-2));
    }

    #[test]
    fn null_removes() {
        let m = StringMap::create();
        let map = m.expect::<StringMap>().unwrap();
        let v = RtString::with_text("v");
        map.set("k".into(), v.clone()).unwrap();
        map.set("k".into(), ObjectRef::null()).unwrap();
        assert_eq!(map.count(), 0);
        assert!(v.is_deleted());
        assert!(!map.remove(&"k".to_owned()).unwrap());
    }

    #[test]
    fn object_keys() {
        let m = Map::create();
        let map = m.expect::<Map>().unwrap();
        let k1 = RtString::with_text("pear");
        let k2 = RtString::with_text("apple");
        let v = RtString::with_text("v");
        map.set(k1.clone(), v.clone()).unwrap();
        map.set(k2.clone(), v.clone()).unwrap();

        // keys order by string compare
        assert_eq!(map.keys(), vec![k2.clone(), k1.clone()]);

        // an equal-comparing key replaces the stored key object
        let k3 = RtString::with_text("pear");
        map.set(k3.clone(), v.clone()).unwrap();
        assert!(k1.is_deleted());
        assert_eq!(map.count(), 2);
        assert_eq!(map.grab(&k1_lookalike()).unwrap(), Some(v.clone()));
        assert_eq!(v.ref_count(), 2);

        m.keep();
        m.release();
        assert!(k2.is_deleted() && k3.is_deleted() && v.is_deleted());
    }

    fn k1_lookalike() -> ObjectRef {
        RtString::with_text("pear")
    }

    #[test]
    fn float_and_scalar() {
        let m = DoubleMap::create();
        let map = m.expect::<DoubleMap>().unwrap();
        let v = RtString::with_text("v");
        map.set(f64::NAN, v.clone()).unwrap();
        map.set(-0.5, v.clone()).unwrap();
        map.set(2.0, v.clone()).unwrap();
        let keys = map.keys();
        assert_eq!(keys[0], -0.5);
        assert_eq!(keys[1], 2.0);
        assert!(keys[2].is_nan());

        let s = LongDoubleMap::create();
        let scalars = s.expect::<LongDoubleMap>().unwrap();
        scalars.set(3, 1.5).unwrap();
        scalars.set(1, 0.0).unwrap();
        scalars.set(3, 2.5).unwrap();
        assert_eq!(scalars.pairs(), vec![(1, 0.0), (3, 2.5)]);
        assert_eq!(scalars.find_value(&0.0), Some(1));
    }
}
