use std::cell::Cell;

use kiln_types::id::NodeId;

use crate::class::ClassVocabulary;
use crate::containers::list::{Links, LIST_ITER_CLASS};
use crate::containers::List;
use crate::error::{fail, Result, RtError};
use crate::iter::{same_value, IterOps};
use crate::object::{Object, ObjectRef};
use crate::value::Value;

/// Where a list iterator stands. `At` carries the node's generation so a cursor left on a
/// removed node never lands on whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCursor {
    BeforeHead,
    At(NodeId, u32),
    PastTail,
}

#[derive(Debug)]
pub struct ListIter {
    parent: ObjectRef,
    cursor: Cell<ListCursor>,
}

fn at(links: &Links, id: Option<NodeId>, otherwise: ListCursor) -> ListCursor {
    match id {
        Some(id) => ListCursor::At(id, links.generation(id)),
        None => otherwise,
    }
}

impl ListIter {
    pub fn start(parent: &ObjectRef, cursor: ListCursor) -> ObjectRef {
        parent.keep();
        ObjectRef::wrap(Box::new(ListIter {
            parent: parent.clone(),
            cursor: Cell::new(cursor),
        }))
    }

    pub fn parent(&self) -> &ObjectRef {
        &self.parent
    }

    pub fn cursor(&self) -> ListCursor {
        self.cursor.get()
    }

    fn list(&self) -> Option<&List> {
        self.parent.downcast::<List>()
    }

    // a cursor on a node that has since gone reads as past-tail
    fn live_cursor(&self, links: &Links) -> ListCursor {
        match self.cursor.get() {
            ListCursor::At(id, gen) if !links.is_live(id, gen) => ListCursor::PastTail,
            c => c,
        }
    }

    /// The node an operation on the current element would touch.
    pub(crate) fn resolved_node(&self, list: &List) -> Option<NodeId> {
        let links = list.links.borrow();
        match self.live_cursor(&links) {
            ListCursor::BeforeHead => links.head,
            ListCursor::At(id, _) => Some(id),
            ListCursor::PastTail => None,
        }
    }

    pub(crate) fn park_past_tail(&self) {
        self.cursor.set(ListCursor::PastTail);
    }

    fn value_of(links: &Links, id: NodeId) -> Option<Value> {
        links.node(id).map(|n| Value::Object(n.value.clone()))
    }

    fn take_current(&self) -> Option<ObjectRef> {
        let list = self.list()?;
        let id = self.resolved_node(list)?;
        let mut links = list.links.borrow_mut();
        let next = links.node(id).and_then(|n| n.next);
        let value = links.unlink(id)?;
        self.cursor.set(at(&links, next, ListCursor::PastTail));
        Some(value)
    }
}

impl Object for ListIter {
    fn class(&self) -> &'static ClassVocabulary {
        &LIST_ITER_CLASS
    }

    fn delete(&self) -> Result<()> {
        self.parent.release();
        Ok(())
    }

    fn as_iter(&self) -> Option<&dyn IterOps> {
        Some(self)
    }
}

impl IterOps for ListIter {
    fn seek_head(&self) {
        if let Some(list) = self.list() {
            let links = list.links.borrow();
            self.cursor.set(at(&links, links.head, ListCursor::PastTail));
        }
    }

    fn seek_tail(&self) {
        self.cursor.set(ListCursor::PastTail);
    }

    fn seek_next(&self) {
        let list = match self.list() {
            Some(list) => list,
            None => return,
        };
        let links = list.links.borrow();
        let next = match self.live_cursor(&links) {
            ListCursor::BeforeHead => at(&links, links.head, ListCursor::PastTail),
            ListCursor::At(id, _) => at(
                &links,
                links.node(id).and_then(|n| n.next),
                ListCursor::PastTail,
            ),
            ListCursor::PastTail => ListCursor::PastTail,
        };
        self.cursor.set(next);
    }

    fn seek_prev(&self) {
        let list = match self.list() {
            Some(list) => list,
            None => return,
        };
        let links = list.links.borrow();
        let prev = match self.live_cursor(&links) {
            ListCursor::PastTail => at(&links, links.tail, ListCursor::PastTail),
            ListCursor::At(id, _) => at(
                &links,
                links.node(id).and_then(|n| n.prev),
                ListCursor::BeforeHead,
            ),
            ListCursor::BeforeHead => ListCursor::BeforeHead,
        };
        self.cursor.set(prev);
    }

    fn next(&self) -> Option<Value> {
        let list = self.list()?;
        let links = list.links.borrow();
        let id = match self.live_cursor(&links) {
            ListCursor::BeforeHead => links.head?,
            ListCursor::At(id, _) => id,
            ListCursor::PastTail => return None,
        };
        let value = Self::value_of(&links, id);
        let next = links.node(id).and_then(|n| n.next);
        self.cursor.set(at(&links, next, ListCursor::PastTail));
        value
    }

    fn prev(&self) -> Option<Value> {
        let list = self.list()?;
        let links = list.links.borrow();
        let id = match self.live_cursor(&links) {
            ListCursor::PastTail => links.tail?,
            ListCursor::At(id, _) => id,
            ListCursor::BeforeHead => return None,
        };
        let value = Self::value_of(&links, id);
        let prev = links.node(id).and_then(|n| n.prev);
        self.cursor.set(at(&links, prev, ListCursor::BeforeHead));
        value
    }

    fn current(&self) -> Option<Value> {
        let list = self.list()?;
        let links = list.links.borrow();
        match self.live_cursor(&links) {
            ListCursor::At(id, _) => Self::value_of(&links, id),
            _ => None,
        }
    }

    fn at_head(&self) -> bool {
        let list = match self.list() {
            Some(list) => list,
            None => return true,
        };
        let links = list.links.borrow();
        match self.live_cursor(&links) {
            ListCursor::BeforeHead => true,
            ListCursor::At(id, _) => links.head == Some(id),
            ListCursor::PastTail => links.head.is_none(),
        }
    }

    fn at_tail(&self) -> bool {
        let list = match self.list() {
            Some(list) => list,
            None => return true,
        };
        let links = list.links.borrow();
        match self.live_cursor(&links) {
            ListCursor::PastTail => true,
            _ => links.head.is_none(),
        }
    }

    fn remove(&self) -> Result<bool> {
        match self.take_current() {
            Some(value) => {
                value.release();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn unref(&self) -> Result<Option<Value>> {
        Ok(self.take_current().map(Value::Object))
    }

    fn clone_iter(&self) -> Result<ObjectRef> {
        Ok(ListIter::start(&self.parent, self.cursor.get()))
    }

    fn find_next(&self, value: &Value) -> Result<bool> {
        let list = match self.list() {
            Some(list) => list,
            None => return fail(RtError::bad_param("object has been deleted")),
        };
        let links = list.links.borrow();
        let mut cur = match self.live_cursor(&links) {
            ListCursor::BeforeHead => links.head,
            ListCursor::At(id, _) => Some(id),
            ListCursor::PastTail => None,
        };
        while let Some(id) = cur {
            if Self::value_of(&links, id).map_or(false, |v| same_value(&v, value)) {
                self.cursor.set(ListCursor::At(id, links.generation(id)));
                return Ok(true);
            }
            cur = links.node(id).and_then(|n| n.next);
        }
        self.cursor.set(ListCursor::PastTail);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{ListCursor, ListIter};
    use crate::containers::{List, RtString};
    use crate::iter::IterOps;
    use crate::value::Value;

    #[test]
    fn find_next_and_seek() {
        let l = List::create();
        let list = l.expect::<List>().unwrap();
        let a = RtString::with_text("a");
        let b = RtString::with_text("b");
        list.add_tail(&a);
        list.add_tail(&b);
        list.add_tail(&a);

        let it = l.head_iter().unwrap();
        let ops = it.iter_ops().unwrap();
        ops.seek_next();
        assert!(ops.find_next(&Value::Object(a.clone())).unwrap());
        assert_eq!(ops.current(), Some(Value::Object(a.clone())));
        ops.seek_next();
        assert!(!ops.find_next(&Value::Object(b.clone())).unwrap());
        assert!(ops.at_tail());
        assert!(ops.seek(0).is_err());
        assert!(ops.tell().is_err());

        ops.seek_prev();
        assert_eq!(ops.current(), Some(Value::Object(a.clone())));
        ops.seek_head();
        ops.seek_prev();
        assert_eq!(it.downcast::<ListIter>().unwrap().cursor(), ListCursor::BeforeHead);
        assert!(ops.at_head());
        assert_eq!(ops.next(), Some(Value::Object(a)));
    }

    #[test]
    fn keeps_parent() {
        let l = List::create();
        l.keep();
        let it = l.head_iter().unwrap();
        assert_eq!(l.ref_count(), 2);
        it.keep();
        it.release();
        assert!(it.is_deleted());
        assert_eq!(l.ref_count(), 1);
        assert!(!l.is_deleted());

        let tail = l.tail_iter().unwrap();
        let ops = tail.iter_ops().unwrap();
        assert!(ops.at_head());
        assert!(ops.unref().unwrap().is_none());
    }
}
