use std::cell::RefMut;

use kiln_types::layout::ELEMENTS_FIELD;
use once_cell::sync::Lazy;

use crate::class::{ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::containers::seq::RefSeq;
use crate::containers::List;
use crate::error::{fail, Result, RtError};
use crate::iter::{IndexIter, Indexed};
use crate::object::{Object, ObjectRef};
use crate::serial::{Reader, Writer};
use crate::sort;
use crate::value::Value;

pub static ARRAY_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("Array")
        .parent(&OBJECT_CLASS)
        .interface(&ITERABLE)
        .construct(construct)
        .custom_reader(read_array_field)
        .build()
});

pub static ARRAY_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("ArrayIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

pub type ArrayIter = IndexIter<Array>;

fn construct(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(Array::default())
}

/// Growable vector of object references.
#[derive(Debug, Default)]
pub struct Array {
    seq: RefSeq<ObjectRef>,
}

impl Array {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(Array::default()))
    }

    pub fn with_elements(elements: &[ObjectRef]) -> ObjectRef {
        let array = Array::default();
        for e in elements {
            array.push(e);
        }
        ObjectRef::wrap(Box::new(array))
    }

    pub fn count(&self) -> usize {
        self.seq.len()
    }

    pub fn get(&self, index: usize) -> Result<ObjectRef> {
        self.seq.get(index)
    }

    pub fn set(&self, index: usize, value: &ObjectRef) -> Result<()> {
        self.seq.set(index, value.clone())
    }

    /// Direct access to a slot; the caller keeps and releases.
    pub fn slot(&self, index: usize) -> Result<RefMut<'_, ObjectRef>> {
        self.seq.slot(index)
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        self.seq.swap(a, b)
    }

    /// New slots are null; dropped ones are released.
    pub fn resize(&self, len: usize) {
        self.seq.resize(len)
    }

    pub fn insert(&self, index: usize, value: &ObjectRef) -> Result<()> {
        self.seq.insert(index, value.clone())
    }

    pub fn remove(&self, index: usize) -> Result<()> {
        self.seq.remove(index)
    }

    pub fn push(&self, value: &ObjectRef) {
        self.seq.push(value.clone())
    }

    /// Takes the last element off. It comes back with its count decremented but not deleted.
    pub fn pop(&self) -> Option<ObjectRef> {
        self.seq.pop()
    }

    /// An iterator positioned on the first element identical to `value`.
    pub fn find(this: &ObjectRef, value: &ObjectRef) -> Result<Option<ObjectRef>> {
        let array = this.expect::<Array>()?;
        Ok(array
            .find_value(value)
            .map(|i| ArrayIter::start(this, i)))
    }

    pub fn find_value(&self, value: &ObjectRef) -> Option<usize> {
        self.seq.position(0, |e| e.same(value))
    }

    /// Replaces the contents with `reversed`, which lists the elements back to front.
    pub fn load(&self, reversed: &[ObjectRef]) {
        self.seq.load(reversed)
    }

    pub fn from_memory(&self, dest: usize, src: &[ObjectRef]) -> Result<()> {
        self.seq.from_memory(dest, src)
    }

    pub fn reverse(&self) {
        self.seq.reverse()
    }

    /// Sorts by each element's own compare.
    pub fn sort(&self) -> Result<()> {
        let before = self.seq.snapshot();
        let mut items = before.clone();
        sort::quicksort(&mut items, &mut |a: &ObjectRef, b: &ObjectRef| a.compare(b))?;
        // compare may have run user code that touched this array
        if !self.seq.same_as(&before) {
            return fail(RtError::illegal("array modified while sorting"));
        }
        self.seq.replace_permuted(items);
        Ok(())
    }

    pub fn to_list(&self) -> ObjectRef {
        let list = List::create();
        if let Some(l) = list.downcast::<List>() {
            for e in self.seq.snapshot() {
                l.add_tail(&e);
            }
        }
        list
    }

    pub fn clear(&self) {
        self.seq.clear()
    }

    /// A new array holding the same elements.
    pub fn duplicate(&self) -> ObjectRef {
        ObjectRef::wrap(Box::new(Array {
            seq: self.seq.duplicate(),
        }))
    }

    pub fn elements(&self) -> Vec<ObjectRef> {
        self.seq.snapshot()
    }
}

impl Object for Array {
    fn class(&self) -> &'static ClassVocabulary {
        &ARRAY_CLASS
    }

    fn delete(&self) -> Result<()> {
        self.seq.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        w.field(ELEMENTS_FIELD)?;
        w.begin_array()?;
        for e in self.seq.snapshot() {
            w.write_object(&e)?;
        }
        w.end_array()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(ArrayIter::start(this, 0))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(ArrayIter::start(this, self.count()))
    }
}

impl Indexed for Array {
    fn iter_class() -> &'static ClassVocabulary {
        &ARRAY_ITER_CLASS
    }

    fn len(&self) -> usize {
        self.count()
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.seq.peek(index).map(Value::Object)
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.seq.remove(index)
    }

    fn take_at(&self, index: usize) -> Result<Value> {
        self.seq.take(index).map(Value::Object)
    }
}

fn read_array_field(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    if field != ELEMENTS_FIELD {
        return Ok(false);
    }
    let array = obj.expect::<Array>()?;
    r.read_sequence(|r| {
        let e = r.read_object_value()?;
        array.push(&e);
        Ok(())
    })?;
    Ok(true)
}
