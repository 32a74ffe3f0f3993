use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use crate::class::ClassVocabulary;
use crate::error::{fail, Result, RtError};
use crate::iter::{same_value, IterOps};
use crate::object::{Object, ObjectRef};
use crate::value::Value;

/// A container whose elements are addressed by position.
pub trait Indexed: Object + Sized {
    /// Removal leaves an empty slot behind instead of closing the gap.
    const FIXED_SLOTS: bool = false;

    fn iter_class() -> &'static ClassVocabulary;
    fn len(&self) -> usize;
    fn value_at(&self, index: usize) -> Option<Value>;
    fn remove_at(&self, index: usize) -> Result<()>;
    /// Removes the element and hands the container's count on it to the caller.
    fn take_at(&self, index: usize) -> Result<Value>;
}

/// Cursor over an `Indexed` container. Positions run from 0 to `len`, where `len` is past-tail.
pub struct IndexIter<C> {
    parent: ObjectRef,
    pos: Cell<usize>,
    _container: PhantomData<fn() -> C>,
}

impl<C: Indexed + 'static> IndexIter<C> {
    /// A new iterator on `parent` at `pos`. The iterator keeps its parent.
    pub fn start(parent: &ObjectRef, pos: usize) -> ObjectRef {
        parent.keep();
        ObjectRef::wrap(Box::new(IndexIter::<C> {
            parent: parent.clone(),
            pos: Cell::new(pos),
            _container: PhantomData,
        }))
    }

    pub fn parent(&self) -> &ObjectRef {
        &self.parent
    }

    pub(crate) fn container(&self) -> Option<&C> {
        self.parent.downcast::<C>()
    }

    fn len(&self) -> usize {
        self.container().map_or(0, |c| c.len())
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos.get()
    }
}

impl<C> fmt::Debug for IndexIter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexIter")
            .field("parent", &self.parent)
            .field("pos", &self.pos.get())
            .finish()
    }
}

impl<C: Indexed + 'static> Object for IndexIter<C> {
    fn class(&self) -> &'static ClassVocabulary {
        C::iter_class()
    }

    fn delete(&self) -> Result<()> {
        self.parent.release();
        Ok(())
    }

    fn as_iter(&self) -> Option<&dyn IterOps> {
        Some(self)
    }
}

impl<C: Indexed + 'static> IterOps for IndexIter<C> {
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
        let pos = self.pos.get();
        let value = self.container()?.value_at(pos)?;
        self.pos.set(pos + 1);
        Some(value)
    }

    fn prev(&self) -> Option<Value> {
        let pos = self.pos.get().min(self.len());
        if pos == 0 {
            return None;
        }
        self.pos.set(pos - 1);
        self.container()?.value_at(pos - 1)
    }

    fn current(&self) -> Option<Value> {
        self.container()?.value_at(self.pos.get())
    }

    fn at_head(&self) -> bool {
        self.pos.get() == 0
    }

    fn at_tail(&self) -> bool {
        self.pos.get() >= self.len()
    }

    fn remove(&self) -> Result<bool> {
        let pos = self.pos.get();
        let container = match self.container() {
            Some(c) if pos < c.len() => c,
            _ => return Ok(false),
        };
        container.remove_at(pos)?;
        if C::FIXED_SLOTS {
            self.pos.set(pos + 1);
        }
        Ok(true)
    }

    fn unref(&self) -> Result<Option<Value>> {
        let pos = self.pos.get();
        let container = match self.container() {
            Some(c) if pos < c.len() => c,
            _ => return Ok(None),
        };
        let value = container.take_at(pos)?;
        if C::FIXED_SLOTS {
            self.pos.set(pos + 1);
        }
        Ok(Some(value))
    }

    fn clone_iter(&self) -> Result<ObjectRef> {
        Ok(IndexIter::<C>::start(&self.parent, self.pos.get()))
    }

    fn seek(&self, pos: usize) -> Result<()> {
        let len = self.len();
        if pos > len {
            return fail(RtError::bad_index(pos, len));
        }
        self.pos.set(pos);
        Ok(())
    }

    fn tell(&self) -> Result<usize> {
        Ok(self.pos.get())
    }

    fn find_next(&self, value: &Value) -> Result<bool> {
        let container = match self.container() {
            Some(c) => c,
            None => return fail(RtError::bad_param("object has been deleted")),
        };
        let len = container.len();
        for i in self.pos.get()..len {
            if container
                .value_at(i)
                .map_or(false, |v| same_value(&v, value))
            {
                self.pos.set(i);
                return Ok(true);
            }
        }
        self.pos.set(len);
        Ok(false)
    }
}
