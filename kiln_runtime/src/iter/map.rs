use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use crate::class::ClassVocabulary;
use crate::containers::map::{MapFlavor, MapKey, MapObject, MapValue};
use crate::error::Result;
use crate::iter::IterOps;
use crate::object::{Object, ObjectRef};
use crate::value::Value;

/// Cursor over a map in key order. Positions run from 0 to the entry count.
pub struct MapIter<F> {
    parent: ObjectRef,
    pos: Cell<usize>,
    _flavor: PhantomData<fn() -> F>,
}

impl<F> fmt::Debug for MapIter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapIter")
            .field("parent", &self.parent)
            .field("pos", &self.pos.get())
            .finish()
    }
}

impl<F: MapFlavor> MapIter<F> {
    pub fn start(parent: &ObjectRef, pos: usize) -> ObjectRef {
        parent.keep();
        ObjectRef::wrap(Box::new(MapIter::<F> {
            parent: parent.clone(),
            pos: Cell::new(pos),
            _flavor: PhantomData,
        }))
    }

    pub fn parent(&self) -> &ObjectRef {
        &self.parent
    }

    fn map(&self) -> Option<&MapObject<F>> {
        self.parent.downcast::<MapObject<F>>()
    }

    fn len(&self) -> usize {
        self.map().map_or(0, |m| m.count())
    }

    pub fn current_pair(&self) -> Option<(F::Key, F::Value)> {
        self.map()?.entry_at(self.pos.get())
    }

    /// The pair under the cursor, then advances.
    pub fn next_pair(&self) -> Option<(F::Key, F::Value)> {
        let pos = self.pos.get();
        let pair = self.map()?.entry_at(pos)?;
        self.pos.set(pos + 1);
        Some(pair)
    }

    /// Steps back, then returns the pair under the cursor.
    pub fn prev_pair(&self) -> Option<(F::Key, F::Value)> {
        let pos = self.pos.get().min(self.len());
        if pos == 0 {
            return None;
        }
        self.pos.set(pos - 1);
        self.map()?.entry_at(pos - 1)
    }

    fn take_current(&self) -> Option<(F::Key, F::Value)> {
        self.map()?.remove_at(self.pos.get())
    }
}

impl<F: MapFlavor> Object for MapIter<F> {
    fn class(&self) -> &'static ClassVocabulary {
        F::iter_class()
    }

    fn delete(&self) -> Result<()> {
        self.parent.release();
        Ok(())
    }

    fn as_iter(&self) -> Option<&dyn IterOps> {
        Some(self)
    }
}

impl<F: MapFlavor> IterOps for MapIter<F> {
    fn seek_head(&self) {
        self.pos.set(0);
    }

    fn seek_tail(&self) {
        self.pos.set(self.len());
    }

    fn seek_next(&self) {
        let pos = self.pos.get();
        if pos < self.len() {
            self.pos.set(pos + 1);
        }
    }

    fn seek_prev(&self) {
        let pos = self.pos.get().min(self.len());
        self.pos.set(pos.saturating_sub(1));
    }

    fn next(&self) -> Option<Value> {
        self.next_pair().map(|(_, v)| v.to_value())
    }

    fn prev(&self) -> Option<Value> {
        self.prev_pair().map(|(_, v)| v.to_value())
    }

    fn current(&self) -> Option<Value> {
        self.current_pair().map(|(_, v)| v.to_value())
    }

    fn at_head(&self) -> bool {
        self.pos.get() == 0
    }

    fn at_tail(&self) -> bool {
        self.pos.get() >= self.len()
    }

    fn remove(&self) -> Result<bool> {
        Ok(match self.take_current() {
            Some((k, v)) => {
                k.release_key();
                v.release_value();
                true
            }
            None => false,
        })
    }

    fn unref(&self) -> Result<Option<Value>> {
        Ok(self.take_current().map(|(k, v)| {
            k.release_key();
            v.to_value()
        }))
    }

    fn clone_iter(&self) -> Result<ObjectRef> {
        Ok(MapIter::<F>::start(&self.parent, self.pos.get()))
    }
}
