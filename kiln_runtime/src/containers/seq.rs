use std::cell::{RefCell, RefMut};
use std::fmt;

use crate::error::{fail, Result, RtError};
use crate::object::ObjectRef;

/// An element of a reference-counted sequence: an object ref, possibly with extra data.
pub(crate) trait SeqItem: Clone + fmt::Debug + 'static {
    fn object(&self) -> &ObjectRef;
    fn empty() -> Self;
}

impl SeqItem for ObjectRef {
    fn object(&self) -> &ObjectRef {
        self
    }

    fn empty() -> Self {
        ObjectRef::null()
    }
}

/// Positional storage shared by Array and Bag. Every stored object is kept once.
#[derive(Debug)]
pub(crate) struct RefSeq<E> {
    items: RefCell<Vec<E>>,
}

impl<E> Default for RefSeq<E> {
    fn default() -> Self {
        Self {
            items: RefCell::new(Vec::new()),
        }
    }
}

impl<E: SeqItem> RefSeq<E> {
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn check(&self, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            fail(RtError::bad_index(index, len))
        }
    }

    pub fn get(&self, index: usize) -> Result<E> {
        let items = self.items.borrow();
        self.check(index, items.len())?;
        Ok(items[index].clone())
    }

    /// Like `get`, but absence is not an error.
    pub fn peek(&self, index: usize) -> Option<E> {
        self.items.borrow().get(index).cloned()
    }

    pub fn set(&self, index: usize, item: E) -> Result<()> {
        self.check(index, self.len())?;
        // keep first: the new object may be the one being replaced
        item.object().keep();
        let old = std::mem::replace(&mut self.items.borrow_mut()[index], item);
        old.object().release();
        Ok(())
    }

    /// Raw access to a slot. Counts are the caller's business.
    pub fn slot(&self, index: usize) -> Result<RefMut<'_, E>> {
        self.check(index, self.len())?;
        Ok(RefMut::map(self.items.borrow_mut(), |items| &mut items[index]))
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let len = self.len();
        self.check(a, len)?;
        self.check(b, len)?;
        self.items.borrow_mut().swap(a, b);
        Ok(())
    }

    pub fn resize(&self, len: usize) {
        let dropped: Vec<E> = {
            let mut items = self.items.borrow_mut();
            if len >= items.len() {
                items.resize(len, E::empty());
                return;
            }
            items.drain(len..).collect()
        };
        for item in &dropped {
            item.object().release();
        }
    }

    pub fn insert(&self, index: usize, item: E) -> Result<()> {
        let len = self.len();
        if index > len {
            return fail(RtError::bad_index(index, len));
        }
        item.object().keep();
        self.items.borrow_mut().insert(index, item);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<()> {
        let item = self.take(index)?;
        item.object().release();
        Ok(())
    }

    /// Removes the item and hands its count to the caller.
    pub fn take(&self, index: usize) -> Result<E> {
        self.check(index, self.len())?;
        Ok(self.items.borrow_mut().remove(index))
    }

    pub fn push(&self, item: E) {
        item.object().keep();
        self.items.borrow_mut().push(item);
    }

    /// The caller gets the last item unowned: its count drops but it is not deleted.
    pub fn pop(&self) -> Option<E> {
        let item = self.items.borrow_mut().pop()?;
        item.object().disown();
        Some(item)
    }

    /// Replaces the whole contents from a sequence given back to front.
    pub fn load(&self, reversed: &[E]) {
        for item in reversed {
            item.object().keep();
        }
        let new: Vec<E> = reversed.iter().rev().cloned().collect();
        let old = std::mem::replace(&mut *self.items.borrow_mut(), new);
        for item in &old {
            item.object().release();
        }
    }

    /// Copies `src` over the slots starting at `dest`.
    pub fn from_memory(&self, dest: usize, src: &[E]) -> Result<()> {
        let len = self.len();
        let end = dest.saturating_add(src.len());
        if end > len {
            return fail(RtError::bad_index(end.saturating_sub(1), len));
        }
        for item in src {
            item.object().keep();
        }
        let old: Vec<E> = {
            let mut items = self.items.borrow_mut();
            items
                .splice(dest..end, src.iter().cloned())
                .collect()
        };
        for item in &old {
            item.object().release();
        }
        Ok(())
    }

    pub fn reverse(&self) {
        self.items.borrow_mut().reverse();
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.items.borrow_mut());
        for item in &old {
            item.object().release();
        }
    }

    pub fn snapshot(&self) -> Vec<E> {
        self.items.borrow().clone()
    }

    /// Whether the items are, by identity, exactly `other`.
    pub fn same_as(&self, other: &[E]) -> bool {
        let items = self.items.borrow();
        items.len() == other.len()
            && items
                .iter()
                .zip(other)
                .all(|(a, b)| a.object().same(b.object()))
    }

    /// Swaps in a permutation of the current items; counts are unchanged.
    pub fn replace_permuted(&self, items: Vec<E>) {
        *self.items.borrow_mut() = items;
    }

    pub fn position(&self, from: usize, pred: impl Fn(&E) -> bool) -> Option<usize> {
        let items = self.items.borrow();
        items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, item)| pred(item))
            .map(|(i, _)| i)
    }

    /// A new sequence holding the same objects, each kept again.
    pub fn duplicate(&self) -> Self {
        let items = self.snapshot();
        for item in &items {
            item.object().keep();
        }
        Self {
            items: RefCell::new(items),
        }
    }
}
