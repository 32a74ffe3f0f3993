use std::cell::RefCell;

use kiln_types::TypeCode;
use once_cell::sync::Lazy;

use crate::class::{ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::error::{fail, Result, RtError};
use crate::iter::{IndexIter, Indexed};
use crate::object::{replace_ref, Object, ObjectRef};
use crate::value::Value;

pub static PAIR_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("Pair")
        .parent(&OBJECT_CLASS)
        .interface(&ITERABLE)
        .member("a", TypeCode::OBJECT)
        .member("b", TypeCode::OBJECT)
        .construct(construct_pair)
        .build()
});

pub static PAIR_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("PairIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

pub static TRIPLE_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("Triple")
        .parent(&PAIR_CLASS)
        .member("c", TypeCode::OBJECT)
        .construct(construct_triple)
        .build()
});

pub static TRIPLE_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("TripleIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

fn construct_pair(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(Pair::default())
}

fn construct_triple(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(Triple::default())
}

/// Fixed number of object slots, each kept while it holds a reference.
#[derive(Debug)]
pub struct Tuple<const N: usize> {
    slots: RefCell<[ObjectRef; N]>,
}

pub type Pair = Tuple<2>;
pub type Triple = Tuple<3>;
pub type PairIter = IndexIter<Pair>;
pub type TripleIter = IndexIter<Triple>;

impl<const N: usize> Default for Tuple<N> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(std::array::from_fn(|_| ObjectRef::null())),
        }
    }
}

impl<const N: usize> Tuple<N>
where
    Tuple<N>: Object,
{
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(Self::default()))
    }

    pub fn get(&self, index: usize) -> Result<ObjectRef> {
        match self.slots.borrow().get(index) {
            Some(o) => Ok(o.clone()),
            None => fail(RtError::bad_index(index, N)),
        }
    }

    pub fn set(&self, index: usize, value: &ObjectRef) -> Result<()> {
        if index >= N {
            return fail(RtError::bad_index(index, N));
        }
        let old = std::mem::replace(&mut self.slots.borrow_mut()[index], value.clone());
        replace_ref(&old, value);
        Ok(())
    }

    pub fn get_a(&self) -> ObjectRef {
        self.slots.borrow()[0].clone()
    }

    pub fn set_a(&self, value: &ObjectRef) {
        let _ = self.set(0, value);
    }

    pub fn get_b(&self) -> ObjectRef {
        self.slots.borrow()[1].clone()
    }

    pub fn set_b(&self, value: &ObjectRef) {
        let _ = self.set(1, value);
    }

    /// Empties every slot.
    pub fn clear(&self) {
        let old = std::mem::replace(
            &mut *self.slots.borrow_mut(),
            std::array::from_fn(|_| ObjectRef::null()),
        );
        for o in &old {
            o.release();
        }
    }

    /// Number of non-null slots.
    pub fn count(&self) -> usize {
        self.slots.borrow().iter().filter(|o| !o.is_null()).count()
    }

    pub fn duplicate(&self) -> ObjectRef {
        let slots = self.slots.borrow().clone();
        for o in &slots {
            o.keep();
        }
        ObjectRef::wrap(Box::new(Self {
            slots: RefCell::new(slots),
        }))
    }
}

impl Triple {
    pub fn get_c(&self) -> ObjectRef {
        self.slots.borrow()[2].clone()
    }

    pub fn set_c(&self, value: &ObjectRef) {
        let _ = self.set(2, value);
    }
}

macro_rules! tuple_object {
    ($n:literal, $class:ident, $iter_class:ident) => {
        impl Object for Tuple<$n> {
            fn class(&self) -> &'static ClassVocabulary {
                &$class
            }

            fn delete(&self) -> Result<()> {
                self.clear();
                Ok(())
            }

            fn field(&self, index: usize) -> Option<Value> {
                self.slots.borrow().get(index).cloned().map(Value::Object)
            }

            fn set_field(&self, index: usize, value: Value) -> Result<()> {
                match value {
                    Value::Object(o) => self.set(index, &o),
                    v => fail(RtError::bad_param(format!(
                        "{} slots hold objects, not {:?}",
                        $class.name(),
                        v
                    ))),
                }
            }

            fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
                Ok(IndexIter::<Self>::start(this, 0))
            }

            fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
                Ok(IndexIter::<Self>::start(this, $n))
            }
        }

        impl Indexed for Tuple<$n> {
            const FIXED_SLOTS: bool = true;

            fn iter_class() -> &'static ClassVocabulary {
                &$iter_class
            }

            fn len(&self) -> usize {
                $n
            }

            fn value_at(&self, index: usize) -> Option<Value> {
                self.field(index)
            }

            fn remove_at(&self, index: usize) -> Result<()> {
                self.set(index, &ObjectRef::null())
            }

            fn take_at(&self, index: usize) -> Result<Value> {
                if index >= $n {
                    return fail(RtError::bad_index(index, $n));
                }
                let old = std::mem::take(&mut self.slots.borrow_mut()[index]);
                Ok(Value::Object(old))
            }
        }
    };
}

tuple_object!(2, PAIR_CLASS, PAIR_ITER_CLASS);
tuple_object!(3, TRIPLE_CLASS, TRIPLE_ITER_CLASS);

#[cfg(test)]
mod tests {
    use super::{Pair, Triple};
    use crate::containers::RtString;
    use crate::iter::IterOps;
    use crate::value::Value;

    #[test]
    fn slots() {
        let p = Pair::create();
        let pair = p.expect::<Pair>().unwrap();
        let x = RtString::with_text("x");
        pair.set_a(&x);
        pair.set_b(&x);
        assert_eq!(x.ref_count(), 2);
        assert_eq!(pair.get_a(), x);
        assert!(pair.get(2).is_err());

        pair.set_a(&x);
        assert_eq!(x.ref_count(), 2);
        p.keep();
        p.release();
        assert!(x.is_deleted());
    }

    #[test]
    fn iterate_and_remove() {
        let t = Triple::create();
        let triple = t.expect::<Triple>().unwrap();
        let x = RtString::with_text("x");
        let z = RtString::with_text("z");
        triple.set_a(&x);
        triple.set_c(&z);

        let it = t.head_iter().unwrap();
        let ops = it.iter_ops().unwrap();
        assert_eq!(ops.next(), Some(Value::Object(x.clone())));
        assert!(ops.next().unwrap().as_object().unwrap().is_null());
        assert_eq!(ops.current(), Some(Value::Object(z.clone())));
        assert!(ops.remove().unwrap());
        assert!(ops.at_tail());
        assert!(z.is_deleted());
        assert!(triple.get_c().is_null());
        assert_eq!(triple.count(), 1);
    }
}
