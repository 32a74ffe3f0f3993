//! Arrays of plain scalars and records. Elements carry no references, so nothing here keeps
//! or releases.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;

use kiln_types::layout::{ELEMENTS_FIELD, RECORD_FIELD};
use kiln_types::BaseType;
use num_traits::NumCast;
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;

use crate::class::{self, ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::error::{fail, Result, RtError};
use crate::iter::{IndexIter, Indexed};
use crate::object::{Object, ObjectRef};
use crate::serial::{Reader, Writer};
use crate::sort;
use crate::value::Value;

pub trait RawElement: Copy + Default + PartialEq + NumCast + fmt::Debug + 'static {
    const BASE: BaseType;

    fn class() -> &'static ClassVocabulary;
    fn iter_class() -> &'static ClassVocabulary;
    fn to_value(self) -> Value;
    fn order(&self, other: &Self) -> Ordering;
}

/// Integer elements, which can also sort as their unsigned reinterpretation.
pub trait RawInteger: RawElement {
    fn unsigned_order(&self, other: &Self) -> Ordering;
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        fail(RtError::bad_index(index, len))
    }
}

#[derive(Debug, Default)]
pub struct RawArray<E> {
    elems: RefCell<Vec<E>>,
}

impl<E: RawElement> RawArray<E> {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(Self::default()))
    }

    pub fn with_elements(elements: &[E]) -> ObjectRef {
        ObjectRef::wrap(Box::new(Self {
            elems: RefCell::new(elements.to_vec()),
        }))
    }

    pub fn count(&self) -> usize {
        self.elems.borrow().len()
    }

    pub fn get(&self, index: usize) -> Result<E> {
        match self.elems.borrow().get(index) {
            Some(e) => Ok(*e),
            None => fail(RtError::bad_index(index, self.count())),
        }
    }

    pub fn set(&self, index: usize, value: E) -> Result<()> {
        *self.slot(index)? = value;
        Ok(())
    }

    pub fn slot(&self, index: usize) -> Result<RefMut<'_, E>> {
        check_index(index, self.count())?;
        Ok(RefMut::map(self.elems.borrow_mut(), |v| &mut v[index]))
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let len = self.count();
        check_index(a, len)?;
        check_index(b, len)?;
        self.elems.borrow_mut().swap(a, b);
        Ok(())
    }

    /// New elements are zero.
    pub fn resize(&self, len: usize) {
        self.elems.borrow_mut().resize(len, E::default());
    }

    pub fn insert(&self, index: usize, value: E) -> Result<()> {
        let len = self.count();
        if index > len {
            return fail(RtError::bad_index(index, len));
        }
        self.elems.borrow_mut().insert(index, value);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<E> {
        check_index(index, self.count())?;
        Ok(self.elems.borrow_mut().remove(index))
    }

    pub fn push(&self, value: E) {
        self.elems.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Option<E> {
        self.elems.borrow_mut().pop()
    }

    /// The element storage.
    pub fn base(&self) -> Ref<'_, [E]> {
        Ref::map(self.elems.borrow(), |v| v.as_slice())
    }

    /// Replaces the contents with `reversed`, which lists the elements back to front.
    pub fn load(&self, reversed: &[E]) {
        *self.elems.borrow_mut() = reversed.iter().rev().copied().collect();
    }

    /// Copies `src` over the elements starting at `dest`.
    pub fn from_memory(&self, dest: usize, src: &[E]) -> Result<()> {
        let len = self.count();
        let end = dest.saturating_add(src.len());
        if end > len {
            return fail(RtError::bad_index(end.saturating_sub(1), len));
        }
        self.elems.borrow_mut()[dest..end].copy_from_slice(src);
        Ok(())
    }

    pub fn reverse(&self) {
        self.elems.borrow_mut().reverse();
    }

    pub fn sort(&self) -> Result<()> {
        let mut elems = self.elems.borrow_mut();
        sort::quicksort(&mut elems, &mut |a: &E, b: &E| Ok(a.order(b)))
    }

    pub fn find(this: &ObjectRef, value: E) -> Result<Option<ObjectRef>> {
        let array = this.expect::<Self>()?;
        Ok(array
            .find_value(value)
            .map(|i| IndexIter::<Self>::start(this, i)))
    }

    pub fn find_value(&self, value: E) -> Option<usize> {
        self.elems.borrow().iter().position(|e| *e == value)
    }

    pub fn clear(&self) {
        self.elems.borrow_mut().clear();
    }

    pub fn duplicate(&self) -> ObjectRef {
        Self::with_elements(&self.base())
    }

    pub fn elements(&self) -> Vec<E> {
        self.elems.borrow().clone()
    }
}

impl<E: RawInteger> RawArray<E> {
    /// Sorts as if the elements were unsigned.
    pub fn usort(&self) -> Result<()> {
        let mut elems = self.elems.borrow_mut();
        sort::quicksort(&mut elems, &mut |a: &E, b: &E| Ok(a.unsigned_order(b)))
    }
}

impl<E: RawElement> Object for RawArray<E> {
    fn class(&self) -> &'static ClassVocabulary {
        E::class()
    }

    fn delete(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        w.field(ELEMENTS_FIELD)?;
        w.begin_array()?;
        for e in self.elements() {
            w.write_value(&e.to_value())?;
        }
        w.end_array()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(IndexIter::<Self>::start(this, 0))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(IndexIter::<Self>::start(this, self.count()))
    }
}

impl<E: RawElement> Indexed for RawArray<E> {
    fn iter_class() -> &'static ClassVocabulary {
        E::iter_class()
    }

    fn len(&self) -> usize {
        self.count()
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.elems.borrow().get(index).map(|e| e.to_value())
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.remove(index).map(drop)
    }

    fn take_at(&self, index: usize) -> Result<Value> {
        self.remove(index).map(E::to_value)
    }
}

fn int_order<T: Ord>(a: &T, b: &T) -> Ordering {
    a.cmp(b)
}

// NaN sorts after everything
fn float_order(a: &f64, b: &f64) -> Ordering {
    OrderedFloat(*a).cmp(&OrderedFloat(*b))
}

fn construct_raw<E: RawElement>(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(RawArray::<E>::default())
}

fn read_raw_field<E: RawElement>(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    if field != ELEMENTS_FIELD {
        return Ok(false);
    }
    let array = obj.expect::<RawArray<E>>()?;
    r.read_sequence(|r| match r.read_scalar(E::BASE)?.to_number::<E>() {
        Some(e) => {
            array.push(e);
            Ok(())
        }
        None => Err(r.error(format!("bad {} element", E::class().name()))),
    })?;
    Ok(true)
}

macro_rules! raw_arrays {
    ($(
        $t:ty, $base:ident, $variant:ident, $order:ident, $name:literal,
        $class:ident, $iter_class:ident, $array:ident, $iter:ident;
    )*) => {$(
        pub static $class: Lazy<ClassVocabulary> = Lazy::new(|| {
            ClassBuilder::new($name)
                .parent(&OBJECT_CLASS)
                .interface(&ITERABLE)
                .construct(construct_raw::<$t>)
                .custom_reader(read_raw_field::<$t>)
                .build()
        });

        pub static $iter_class: Lazy<ClassVocabulary> = Lazy::new(|| {
            ClassBuilder::new(concat!($name, "Iterator"))
                .parent(&OBJECT_CLASS)
                .interface(&ITERATOR)
                .build()
        });

        pub type $array = RawArray<$t>;
        pub type $iter = IndexIter<RawArray<$t>>;

        impl RawElement for $t {
            const BASE: BaseType = BaseType::$base;

            fn class() -> &'static ClassVocabulary {
                &$class
            }

            fn iter_class() -> &'static ClassVocabulary {
                &$iter_class
            }

            fn to_value(self) -> Value {
                Value::$variant(self)
            }

            fn order(&self, other: &Self) -> Ordering {
                $order(self, other)
            }
        }
    )*};
}

raw_arrays! {
    i8, Byte, Byte, int_order, "ByteArray", BYTE_ARRAY_CLASS, BYTE_ARRAY_ITER_CLASS, ByteArray, ByteArrayIter;
    i16, Short, Short, int_order, "ShortArray", SHORT_ARRAY_CLASS, SHORT_ARRAY_ITER_CLASS, ShortArray, ShortArrayIter;
    i32, Int, Int, int_order, "IntArray", INT_ARRAY_CLASS, INT_ARRAY_ITER_CLASS, IntArray, IntArrayIter;
    i64, Long, Long, int_order, "LongArray", LONG_ARRAY_CLASS, LONG_ARRAY_ITER_CLASS, LongArray, LongArrayIter;
    f64, Double, Double, float_order, "DoubleArray", DOUBLE_ARRAY_CLASS, DOUBLE_ARRAY_ITER_CLASS, DoubleArray, DoubleArrayIter;
}

macro_rules! raw_integer {
    ($($t:ty => $u:ty),*) => {$(
        impl RawInteger for $t {
            fn unsigned_order(&self, other: &Self) -> Ordering {
                (*self as $u).cmp(&(*other as $u))
            }
        }
    )*};
}

raw_integer!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

pub static STRUCT_ARRAY_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("StructArray")
        .parent(&OBJECT_CLASS)
        .interface(&ITERABLE)
        .construct(construct_struct_array)
        .custom_reader(read_struct_array_field)
        .build()
});

pub static STRUCT_ARRAY_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("StructArrayIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

pub type StructArrayIter = IndexIter<StructArray>;

fn construct_struct_array(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(StructArray::default())
}

/// Records shaped by a record vocabulary, stored by value.
#[derive(Debug, Default)]
pub struct StructArray {
    record: Cell<Option<&'static ClassVocabulary>>,
    elems: RefCell<Vec<Vec<Value>>>,
}

// records hold no references, at any depth
fn check_record_type(record: &ClassVocabulary) -> Result<()> {
    for m in record.members().iter() {
        match m.code.base {
            BaseType::Object => {
                return fail(RtError::bad_param(format!(
                    "record {} holds object member {}",
                    record.name(),
                    m.name
                )))
            }
            BaseType::Struct => match m.record.as_deref().and_then(class::lookup_class) {
                Some(inner) => check_record_type(inner)?,
                None => {
                    return fail(RtError::bad_param(format!(
                        "unknown record type for member {}",
                        m.name
                    )))
                }
            },
            _ => {}
        }
    }
    Ok(())
}

impl StructArray {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(StructArray::default()))
    }

    pub fn record_type(&self) -> Option<&'static ClassVocabulary> {
        self.record.get()
    }

    /// Fixes the record shape. Only allowed while the array is empty.
    pub fn set_type(&self, record: &'static ClassVocabulary) -> Result<()> {
        if self.count() != 0 {
            return fail(RtError::illegal(
                "cannot change the record type of a non-empty StructArray",
            ));
        }
        check_record_type(record)?;
        self.record.set(Some(record));
        Ok(())
    }

    fn require_type(&self) -> Result<&'static ClassVocabulary> {
        match self.record.get() {
            Some(record) => Ok(record),
            None => fail(RtError::illegal("StructArray has no record type")),
        }
    }

    fn zero_record(record: &ClassVocabulary) -> Vec<Value> {
        record.members().iter().map(Value::zero).collect()
    }

    fn checked(&self, fields: Vec<Value>) -> Result<Vec<Value>> {
        let record = self.require_type()?;
        if fields.len() != record.members().len() {
            return fail(RtError::bad_param(format!(
                "record {} has {} fields, got {}",
                record.name(),
                record.members().len(),
                fields.len()
            )));
        }
        for (m, v) in record.members().iter().zip(&fields) {
            v.check(m)?;
        }
        Ok(fields)
    }

    pub fn count(&self) -> usize {
        self.elems.borrow().len()
    }

    pub fn get(&self, index: usize) -> Result<Vec<Value>> {
        match self.elems.borrow().get(index) {
            Some(r) => Ok(r.clone()),
            None => fail(RtError::bad_index(index, self.count())),
        }
    }

    pub fn set(&self, index: usize, fields: Vec<Value>) -> Result<()> {
        check_index(index, self.count())?;
        let fields = self.checked(fields)?;
        self.elems.borrow_mut()[index] = fields;
        Ok(())
    }

    /// Direct access to a record; the caller keeps it well-formed.
    pub fn slot(&self, index: usize) -> Result<RefMut<'_, Vec<Value>>> {
        check_index(index, self.count())?;
        Ok(RefMut::map(self.elems.borrow_mut(), |v| &mut v[index]))
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let len = self.count();
        check_index(a, len)?;
        check_index(b, len)?;
        self.elems.borrow_mut().swap(a, b);
        Ok(())
    }

    /// New records are zeroed.
    pub fn resize(&self, len: usize) -> Result<()> {
        let record = self.require_type()?;
        self.elems
            .borrow_mut()
            .resize_with(len, || Self::zero_record(record));
        Ok(())
    }

    pub fn insert(&self, index: usize, fields: Vec<Value>) -> Result<()> {
        let len = self.count();
        if index > len {
            return fail(RtError::bad_index(index, len));
        }
        let fields = self.checked(fields)?;
        self.elems.borrow_mut().insert(index, fields);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<Vec<Value>> {
        check_index(index, self.count())?;
        Ok(self.elems.borrow_mut().remove(index))
    }

    pub fn push(&self, fields: Vec<Value>) -> Result<()> {
        let fields = self.checked(fields)?;
        self.elems.borrow_mut().push(fields);
        Ok(())
    }

    pub fn pop(&self) -> Option<Vec<Value>> {
        self.elems.borrow_mut().pop()
    }

    pub fn base(&self) -> Ref<'_, [Vec<Value>]> {
        Ref::map(self.elems.borrow(), |v| v.as_slice())
    }

    pub fn load(&self, reversed: Vec<Vec<Value>>) -> Result<()> {
        let mut records = Vec::with_capacity(reversed.len());
        for fields in reversed.into_iter().rev() {
            records.push(self.checked(fields)?);
        }
        *self.elems.borrow_mut() = records;
        Ok(())
    }

    pub fn from_memory(&self, dest: usize, src: Vec<Vec<Value>>) -> Result<()> {
        let len = self.count();
        let end = dest.saturating_add(src.len());
        if end > len {
            return fail(RtError::bad_index(end.saturating_sub(1), len));
        }
        let mut records = Vec::with_capacity(src.len());
        for fields in src {
            records.push(self.checked(fields)?);
        }
        self.elems.borrow_mut().splice(dest..end, records);
        Ok(())
    }

    pub fn reverse(&self) {
        self.elems.borrow_mut().reverse();
    }

    pub fn clear(&self) {
        self.elems.borrow_mut().clear();
    }

    pub fn duplicate(&self) -> ObjectRef {
        ObjectRef::wrap(Box::new(StructArray {
            record: Cell::new(self.record.get()),
            elems: RefCell::new(self.elems.borrow().clone()),
        }))
    }
}

impl Object for StructArray {
    fn class(&self) -> &'static ClassVocabulary {
        &STRUCT_ARRAY_CLASS
    }

    fn delete(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        let record = match self.record.get() {
            Some(record) => record,
            None => return Ok(()),
        };
        w.field(RECORD_FIELD)?;
        w.write_value(&Value::Str(record.name().to_owned()))?;
        w.field(ELEMENTS_FIELD)?;
        w.begin_array()?;
        for fields in self.base().iter() {
            w.write_record(record, fields)?;
        }
        w.end_array()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(StructArrayIter::start(this, 0))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(StructArrayIter::start(this, self.count()))
    }
}

impl Indexed for StructArray {
    fn iter_class() -> &'static ClassVocabulary {
        &STRUCT_ARRAY_ITER_CLASS
    }

    fn len(&self) -> usize {
        self.count()
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.elems.borrow().get(index).cloned().map(Value::Record)
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.remove(index).map(drop)
    }

    fn take_at(&self, index: usize) -> Result<Value> {
        self.remove(index).map(Value::Record)
    }
}

fn read_struct_array_field(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    let array = obj.expect::<StructArray>()?;
    match field {
        RECORD_FIELD => {
            let name = r.read_string()?;
            match class::lookup_class(&name) {
                Some(record) => array.set_type(record)?,
                None => return Err(r.error(format!("unknown record type {}", name))),
            }
        }
        ELEMENTS_FIELD => {
            let record = match array.record_type() {
                Some(record) => record,
                None => return Err(r.error("StructArray elements before its record type")),
            };
            r.read_sequence(|r| {
                let fields = r.read_record(record)?;
                array.push(fields)
            })?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub(crate) fn builtin_classes() -> Vec<&'static ClassVocabulary> {
    vec![
        &BYTE_ARRAY_CLASS,
        &BYTE_ARRAY_ITER_CLASS,
        &SHORT_ARRAY_CLASS,
        &SHORT_ARRAY_ITER_CLASS,
        &INT_ARRAY_CLASS,
        &INT_ARRAY_ITER_CLASS,
        &LONG_ARRAY_CLASS,
        &LONG_ARRAY_ITER_CLASS,
        &DOUBLE_ARRAY_CLASS,
        &DOUBLE_ARRAY_ITER_CLASS,
        &STRUCT_ARRAY_CLASS,
        &STRUCT_ARRAY_ITER_CLASS,
    ]
}

#[cfg(test)]
mod tests {
    use kiln_types::{ErrorKind, TypeCode};

    use super::{ByteArray, DoubleArray, IntArray, StructArray};
    use crate::class::{register_class, ClassBuilder};
    use crate::iter::IterOps;
    use crate::value::Value;

    #[test]
    fn scalar_ops() {
        let a = IntArray::create();
        let array = a.expect::<IntArray>().unwrap();
        array.load(&[3, 2, 1]);
        assert_eq!(array.elements(), vec![1, 2, 3]);
        array.insert(3, 7).unwrap();
        assert_eq!(array.insert(5, 0).unwrap_err().kind(), ErrorKind::BadIndex);
        assert_eq!(array.remove(0).unwrap(), 1);
        *array.slot(0).unwrap() = -4;
        array.from_memory(1, &[9, 8]).unwrap();
        assert!(array.from_memory(2, &[0, 0]).is_err());
        assert_eq!(&*array.base(), &[-4, 9, 8]);

        array.sort().unwrap();
        assert_eq!(array.elements(), vec![-4, 8, 9]);
        array.usort().unwrap();
        assert_eq!(array.elements(), vec![8, 9, -4]);

        array.resize(5);
        assert_eq!(array.get(4).unwrap(), 0);
        assert_eq!(array.pop(), Some(0));
        assert_eq!(array.find_value(9), Some(1));
    }

    #[test]
    fn iterate() {
        let a = ByteArray::with_elements(&[1, -1]);
        let it = a.head_iter().unwrap();
        let ops = it.iter_ops().unwrap();
        assert_eq!(ops.next(), Some(Value::Byte(1)));
        assert!(ops.find_next(&Value::Byte(-1)).unwrap());
        assert_eq!(ops.unref().unwrap(), Some(Value::Byte(-1)));
        assert_eq!(a.expect::<ByteArray>().unwrap().count(), 1);
    }

    #[test]
    fn doubles_sort_nan_last() {
        let a = DoubleArray::with_elements(&[2.0, f64::NAN, -1.0]);
        let array = a.expect::<DoubleArray>().unwrap();
        array.sort().unwrap();
        let e = array.elements();
        assert_eq!(&e[..2], &[-1.0, 2.0]);
        assert!(e[2].is_nan());
    }

    #[test]
    fn records() {
        let point = register_class(
            ClassBuilder::new("RawArrayPoint")
                .member("x", TypeCode::INT)
                .member("y", TypeCode::DOUBLE)
                .build(),
        );
        let holder = register_class(
            ClassBuilder::new("RawArrayHolder")
                .member("o", TypeCode::OBJECT)
                .build(),
        );

        let a = StructArray::create();
        let array = a.expect::<StructArray>().unwrap();
        assert!(array.push(vec![Value::Int(1), Value::Double(2.0)]).is_err());
        assert!(array.set_type(holder).is_err());
        array.set_type(point).unwrap();

        array.push(vec![Value::Int(1), Value::Double(2.0)]).unwrap();
        assert!(array.push(vec![Value::Int(1)]).is_err());
        assert!(array.push(vec![Value::Long(1), Value::Double(2.0)]).is_err());
        array.resize(2).unwrap();
        assert_eq!(array.get(1).unwrap(), vec![Value::Int(0), Value::Double(0.0)]);
        assert!(array.set_type(point).is_err());
    }

    #[test]
    fn far_copy_is_a_bounds_error() {
        let a = IntArray::with_elements(&[1, 2]);
        let array = a.expect::<IntArray>().unwrap();
        let err = array.from_memory(usize::MAX, &[5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadIndex);
        assert_eq!(array.elements(), vec![1, 2]);

        let record = register_class(
            ClassBuilder::new("RawArrayCell")
                .member("n", TypeCode::INT)
                .build(),
        );
        let s = StructArray::create();
        let records = s.expect::<StructArray>().unwrap();
        records.set_type(record).unwrap();
        records.push(vec![Value::Int(3)]).unwrap();
        let err = records
            .from_memory(usize::MAX, vec![vec![Value::Int(4)]])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadIndex);
        assert_eq!(records.get(0).unwrap(), vec![Value::Int(3)]);
    }
}
