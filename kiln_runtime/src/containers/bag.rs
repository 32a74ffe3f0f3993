use std::cell::RefMut;

use kiln_types::layout::{ELEMENTS_FIELD, TAGS_FIELD};
use kiln_types::BaseType;
use once_cell::sync::Lazy;

use crate::class::{ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::containers::map::{LongMap, LONG_MAP_CLASS};
use crate::containers::seq::{RefSeq, SeqItem};
use crate::error::Result;
use crate::iter::{IndexIter, Indexed};
use crate::object::{Object, ObjectRef};
use crate::serial::{Reader, Writer};
use crate::value::Value;

pub static BAG_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("Bag")
        .parent(&OBJECT_CLASS)
        .interface(&ITERABLE)
        .construct(construct)
        .custom_reader(read_bag_field)
        .build()
});

pub static BAG_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("BagIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

pub type BagIter = IndexIter<Bag>;

fn construct(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(Bag::default())
}

#[derive(Debug, Clone, Default)]
pub struct BagEntry {
    pub tag: i64,
    pub value: ObjectRef,
}

impl SeqItem for BagEntry {
    fn object(&self) -> &ObjectRef {
        &self.value
    }

    fn empty() -> Self {
        BagEntry::default()
    }
}

/// Sequence of tagged object references. Tags need not be unique.
#[derive(Debug, Default)]
pub struct Bag {
    seq: RefSeq<BagEntry>,
}

impl Bag {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(Bag::default()))
    }

    pub fn count(&self) -> usize {
        self.seq.len()
    }

    pub fn get(&self, index: usize) -> Result<(i64, ObjectRef)> {
        self.seq.get(index).map(|e| (e.tag, e.value))
    }

    pub fn set(&self, index: usize, tag: i64, value: &ObjectRef) -> Result<()> {
        self.seq.set(
            index,
            BagEntry {
                tag,
                value: value.clone(),
            },
        )
    }

    pub fn slot(&self, index: usize) -> Result<RefMut<'_, BagEntry>> {
        self.seq.slot(index)
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        self.seq.swap(a, b)
    }

    pub fn resize(&self, len: usize) {
        self.seq.resize(len)
    }

    pub fn insert(&self, index: usize, tag: i64, value: &ObjectRef) -> Result<()> {
        self.seq.insert(
            index,
            BagEntry {
                tag,
                value: value.clone(),
            },
        )
    }

    pub fn remove(&self, index: usize) -> Result<()> {
        self.seq.remove(index)
    }

    pub fn push(&self, tag: i64, value: &ObjectRef) {
        self.seq.push(BagEntry {
            tag,
            value: value.clone(),
        })
    }

    pub fn pop(&self) -> Option<(i64, ObjectRef)> {
        self.seq.pop().map(|e| (e.tag, e.value))
    }

    /// An iterator on the first entry tagged `tag`.
    pub fn find(this: &ObjectRef, tag: i64) -> Result<Option<ObjectRef>> {
        let bag = this.expect::<Bag>()?;
        Ok(bag
            .seq
            .position(0, |e| e.tag == tag)
            .map(|i| BagIter::start(this, i)))
    }

    /// The value of the first entry tagged `tag`.
    pub fn find_value(&self, tag: i64) -> Option<ObjectRef> {
        let i = self.seq.position(0, |e| e.tag == tag)?;
        self.seq.peek(i).map(|e| e.value)
    }

    pub fn load(&self, reversed: &[BagEntry]) {
        self.seq.load(reversed)
    }

    pub fn from_memory(&self, dest: usize, src: &[BagEntry]) -> Result<()> {
        self.seq.from_memory(dest, src)
    }

    pub fn reverse(&self) {
        self.seq.reverse()
    }

    /// A LongMap from tag to value. Later entries win over earlier ones with the same tag.
    pub fn to_long_map(&self) -> Result<ObjectRef> {
        let map = crate::alloc::allocate(&LONG_MAP_CLASS)?;
        let long_map = map.expect::<LongMap>()?;
        for e in self.seq.snapshot() {
            long_map.set(e.tag, e.value)?;
        }
        Ok(map)
    }

    pub fn clear(&self) {
        self.seq.clear()
    }

    pub fn duplicate(&self) -> ObjectRef {
        ObjectRef::wrap(Box::new(Bag {
            seq: self.seq.duplicate(),
        }))
    }

    pub fn entries(&self) -> Vec<BagEntry> {
        self.seq.snapshot()
    }
}

impl Object for Bag {
    fn class(&self) -> &'static ClassVocabulary {
        &BAG_CLASS
    }

    fn delete(&self) -> Result<()> {
        self.seq.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        let entries = self.seq.snapshot();
        w.field(TAGS_FIELD)?;
        w.begin_array()?;
        for e in &entries {
            w.write_value(&Value::Long(e.tag))?;
        }
        w.end_array()?;
        w.field(ELEMENTS_FIELD)?;
        w.begin_array()?;
        for e in &entries {
            w.write_object(&e.value)?;
        }
        w.end_array()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(BagIter::start(this, 0))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(BagIter::start(this, self.count()))
    }
}

impl Indexed for Bag {
    fn iter_class() -> &'static ClassVocabulary {
        &BAG_ITER_CLASS
    }

    fn len(&self) -> usize {
        self.count()
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.seq.peek(index).map(|e| Value::Object(e.value))
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.seq.remove(index)
    }

    fn take_at(&self, index: usize) -> Result<Value> {
        self.seq.take(index).map(|e| Value::Object(e.value))
    }
}

impl BagIter {
    /// Tag of the entry under the cursor.
    pub fn current_tag(&self) -> Option<i64> {
        let bag = self.container()?;
        bag.seq.peek(self.pos()).map(|e| e.tag)
    }
}

// tags and elements may arrive in either order; each fills in its half of the entries
fn read_bag_field(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    let bag = obj.expect::<Bag>()?;
    let mut index = 0;
    match field {
        TAGS_FIELD => r.read_sequence(|r| {
            let tag = match r.read_scalar(BaseType::Long)? {
                Value::Long(tag) => tag,
                other => return Err(r.error(format!("bag tag {:?} is not a long", other))),
            };
            if index < bag.count() {
                bag.seq.slot(index)?.tag = tag;
            } else {
                bag.push(tag, &ObjectRef::null());
            }
            index += 1;
            Ok(())
        })?,
        ELEMENTS_FIELD => r.read_sequence(|r| {
            let value = r.read_object_value()?;
            if index < bag.count() {
                let tag = bag.seq.get(index)?.tag;
                bag.set(index, tag, &value)?;
            } else {
                bag.push(0, &value);
            }
            index += 1;
            Ok(())
        })?,
        _ => return Ok(false),
    }
    Ok(true)
}
