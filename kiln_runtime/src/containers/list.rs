use std::cell::RefCell;

use index_vec::IndexVec;
use kiln_types::id::NodeId;
use kiln_types::layout::QUEUE_FIELD;
use once_cell::sync::Lazy;

use crate::class::{ClassBuilder, ClassVocabulary, ITERABLE, ITERATOR, OBJECT_CLASS};
use crate::containers::Array;
use crate::error::{fail, Result, RtError};
use crate::iter::{ListCursor, ListIter};
use crate::object::{Object, ObjectRef};
use crate::serial::{Reader, Writer};

pub static LIST_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("List")
        .parent(&OBJECT_CLASS)
        .interface(&ITERABLE)
        .construct(construct)
        .custom_reader(read_list_field)
        .build()
});

pub static LIST_ITER_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("ListIterator")
        .parent(&OBJECT_CLASS)
        .interface(&ITERATOR)
        .build()
});

fn construct(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(List::default())
}

#[derive(Debug)]
pub(crate) struct Node {
    pub value: ObjectRef,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

#[derive(Debug)]
struct Slot {
    // bumped on every reuse so stale cursors can tell
    generation: u32,
    node: Option<Node>,
}

/// Node arena with explicit head and tail; no sentinel.
#[derive(Debug, Default)]
pub(crate) struct Links {
    slots: IndexVec<NodeId, Slot>,
    free: Vec<NodeId>,
    pub head: Option<NodeId>,
    pub tail: Option<NodeId>,
    len: usize,
}

impl Links {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id)?.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id)?.node.as_mut()
    }

    pub fn generation(&self, id: NodeId) -> u32 {
        self.slots.get(id).map_or(0, |s| s.generation)
    }

    /// Whether a cursor taken at `generation` still points at a live node.
    pub fn is_live(&self, id: NodeId, generation: u32) -> bool {
        self.slots
            .get(id)
            .map_or(false, |s| s.generation == generation && s.node.is_some())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                let slot = &mut self.slots[id];
                slot.generation = slot.generation.wrapping_add(1);
                slot.node = Some(node);
                id
            }
            None => self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            }),
        }
    }

    fn push_front(&mut self, value: ObjectRef) -> NodeId {
        let old = self.head;
        let id = self.alloc(Node {
            value,
            prev: None,
            next: old,
        });
        match old.and_then(|h| self.node_mut(h)) {
            Some(h) => h.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    fn push_back(&mut self, value: ObjectRef) -> NodeId {
        let old = self.tail;
        let id = self.alloc(Node {
            value,
            prev: old,
            next: None,
        });
        match old.and_then(|t| self.node_mut(t)) {
            Some(t) => t.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Takes a node out of the chain, handing back its value with the list's count on it.
    pub fn unlink(&mut self, id: NodeId) -> Option<ObjectRef> {
        let node = self.slots.get_mut(id)?.node.take()?;
        match node.prev.and_then(|p| self.node_mut(p)) {
            Some(p) => p.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.node_mut(n)) {
            Some(n) => n.prev = node.prev,
            None => self.tail = node.prev,
        }
        self.free.push(id);
        self.len -= 1;
        Some(node.value)
    }

    fn ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(id) = cur {
            ids.push(id);
            cur = self.node(id).and_then(|n| n.next);
        }
        ids
    }

    fn values(&self) -> Vec<ObjectRef> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.node(id).map(|n| n.value.clone()))
            .collect()
    }
}

/// Doubly linked list of object references.
#[derive(Debug, Default)]
pub struct List {
    pub(crate) links: RefCell<Links>,
}

impl List {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(List::default()))
    }

    pub fn count(&self) -> usize {
        self.links.borrow().len
    }

    pub fn head(&self) -> Option<ObjectRef> {
        let links = self.links.borrow();
        links.node(links.head?).map(|n| n.value.clone())
    }

    pub fn tail(&self) -> Option<ObjectRef> {
        let links = self.links.borrow();
        links.node(links.tail?).map(|n| n.value.clone())
    }

    pub fn add_head(&self, value: &ObjectRef) {
        value.keep();
        self.links.borrow_mut().push_front(value.clone());
    }

    pub fn add_tail(&self, value: &ObjectRef) {
        value.keep();
        self.links.borrow_mut().push_back(value.clone());
    }

    /// Drops the first element. Returns false on an empty list.
    pub fn remove_head(&self) -> bool {
        match self.unref_head() {
            Some(value) => {
                value.release();
                true
            }
            None => false,
        }
    }

    pub fn remove_tail(&self) -> bool {
        match self.unref_tail() {
            Some(value) => {
                value.release();
                true
            }
            None => false,
        }
    }

    /// Takes the first element off; the caller inherits the list's count on it.
    pub fn unref_head(&self) -> Option<ObjectRef> {
        let mut links = self.links.borrow_mut();
        let head = links.head?;
        links.unlink(head)
    }

    pub fn unref_tail(&self) -> Option<ObjectRef> {
        let mut links = self.links.borrow_mut();
        let tail = links.tail?;
        links.unlink(tail)
    }

    fn find_node(&self, value: &ObjectRef) -> Option<NodeId> {
        let links = self.links.borrow();
        links
            .ids()
            .into_iter()
            .find(|id| links.node(*id).map_or(false, |n| n.value.same(value)))
    }

    /// An iterator on the first element identical to `value`.
    pub fn find(this: &ObjectRef, value: &ObjectRef) -> Result<Option<ObjectRef>> {
        let list = this.expect::<List>()?;
        let id = match list.find_node(value) {
            Some(id) => id,
            None => return Ok(None),
        };
        let generation = list.links.borrow().generation(id);
        Ok(Some(ListIter::start(this, ListCursor::At(id, generation))))
    }

    /// Removes the first element identical to `value`.
    pub fn remove(&self, value: &ObjectRef) -> bool {
        let id = match self.find_node(value) {
            Some(id) => id,
            None => return false,
        };
        let removed = self.links.borrow_mut().unlink(id);
        if let Some(removed) = removed {
            removed.release();
        }
        true
    }

    pub fn to_array(&self) -> ObjectRef {
        Array::with_elements(&self.values())
    }

    /// Moves the elements from the cursor of `iter` onwards into a new list.
    /// The iterator is left past-tail.
    pub fn split(this: &ObjectRef, iter: &ObjectRef) -> Result<ObjectRef> {
        let list = this.expect::<List>()?;
        let it = iter.expect::<ListIter>()?;
        if !it.parent().same(this) {
            return fail(RtError::bad_param("iterator belongs to another list"));
        }
        let out = List::create();
        let tail_list = out.expect::<List>()?;

        let start = it.resolved_node(list);
        {
            let mut links = list.links.borrow_mut();
            let mut dest = tail_list.links.borrow_mut();
            let mut cur = start;
            while let Some(id) = cur {
                cur = links.node(id).and_then(|n| n.next);
                // the count moves with the element
                if let Some(value) = links.unlink(id) {
                    dest.push_back(value);
                }
            }
        }
        it.park_past_tail();
        Ok(out)
    }

    /// Empties the list. Slots go back to the free list so stale cursors stay stale.
    pub fn clear(&self) {
        let old = {
            let mut links = self.links.borrow_mut();
            let ids = links.ids();
            ids.into_iter()
                .filter_map(|id| links.unlink(id))
                .collect::<Vec<_>>()
        };
        for value in old {
            value.release();
        }
    }

    pub fn duplicate(&self) -> ObjectRef {
        let out = List::default();
        for value in self.values() {
            out.add_tail(&value);
        }
        ObjectRef::wrap(Box::new(out))
    }

    pub fn values(&self) -> Vec<ObjectRef> {
        self.links.borrow().values()
    }
}

impl Object for List {
    fn class(&self) -> &'static ClassVocabulary {
        &LIST_CLASS
    }

    fn delete(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn show_inner(&self, w: &mut Writer<'_>) -> Result<()> {
        w.field(QUEUE_FIELD)?;
        w.begin_array()?;
        for value in self.values() {
            w.write_object(&value)?;
        }
        w.end_array()
    }

    fn head_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        let cursor = {
            let links = self.links.borrow();
            match links.head {
                Some(id) => ListCursor::At(id, links.generation(id)),
                None => ListCursor::PastTail,
            }
        };
        Ok(ListIter::start(this, cursor))
    }

    fn tail_iter(&self, this: &ObjectRef) -> Result<ObjectRef> {
        Ok(ListIter::start(this, ListCursor::PastTail))
    }
}

fn read_list_field(r: &mut Reader<'_>, obj: &ObjectRef, field: &str) -> Result<bool> {
    if field != QUEUE_FIELD {
        return Ok(false);
    }
    let list = obj.expect::<List>()?;
    r.read_sequence(|r| {
        let value = r.read_object_value()?;
        list.add_tail(&value);
        Ok(())
    })?;
    Ok(true)
}
