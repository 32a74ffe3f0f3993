use std::any::{self, Any};
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::alloc;
use crate::class::{self, ClassVocabulary, Interface};
use crate::error::{fail, Result, RtError};
use crate::iter::IterOps;
use crate::serial::Writer;
use crate::value::Value;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Behaviour shared by every heap object.
///
/// Bodies are used through `&self` only; containers keep their state in cells. A body must
/// never release a reference while it still holds a borrow of its own state, since the
/// release may cascade back into it.
pub trait Object: AsAny + fmt::Debug + 'static {
    fn class(&self) -> &'static ClassVocabulary;

    /// Releases everything this object references. Runs once, when the count reaches zero.
    fn delete(&self) -> Result<()> {
        Ok(())
    }

    /// Orders `this` (whose body is `self`) against `other`. Defaults to address order.
    fn compare(&self, this: &ObjectRef, other: &ObjectRef) -> Result<Ordering> {
        Ok(this.addr().cmp(&other.addr()))
    }

    /// Value of member `index` of the class's member table.
    fn field(&self, _index: usize) -> Option<Value> {
        None
    }

    fn set_field(&self, index: usize, _value: Value) -> Result<()> {
        fail(RtError::illegal(format!(
            "{} has no writable member {}",
            self.class().name(),
            index
        )))
    }

    /// Writes the container-specific part of the textual form, after the member fields.
    fn show_inner(&self, _w: &mut Writer<'_>) -> Result<()> {
        Ok(())
    }

    fn head_iter(&self, _this: &ObjectRef) -> Result<ObjectRef> {
        fail(RtError::illegal(format!(
            "{} is not iterable",
            self.class().name()
        )))
    }

    fn tail_iter(&self, _this: &ObjectRef) -> Result<ObjectRef> {
        fail(RtError::illegal(format!(
            "{} is not iterable",
            self.class().name()
        )))
    }

    fn as_iter(&self) -> Option<&dyn IterOps> {
        None
    }
}

pub(crate) struct ObjectCell {
    ref_count: Cell<u32>,
    deleted: Cell<bool>,
    body: Box<dyn Object>,
}

/// A reference to a heap object, seen through one of its class's interfaces.
///
/// Cloning a ref does not touch the language-level count; only `keep` and `release` do.
#[derive(Clone, Default)]
pub struct ObjectRef {
    methods: Option<&'static Interface>,
    data: Option<Rc<ObjectCell>>,
}

impl ObjectRef {
    pub fn null() -> Self {
        Self::default()
    }

    /// Wraps a freshly built body. The new object has a count of zero.
    pub fn wrap(body: Box<dyn Object>) -> Self {
        let class = body.class();
        alloc::note_alloc(class);
        Self {
            methods: Some(class.primary()),
            data: Some(Rc::new(ObjectCell {
                ref_count: Cell::new(0),
                deleted: Cell::new(false),
                body,
            })),
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    /// Data address; identity of the object regardless of interface. Zero for null.
    pub fn addr(&self) -> usize {
        match &self.data {
            Some(cell) => Rc::as_ptr(cell) as *const u8 as usize,
            None => 0,
        }
    }

    pub fn same(&self, other: &ObjectRef) -> bool {
        self.addr() == other.addr()
    }

    pub fn interface(&self) -> Option<&'static Interface> {
        self.methods
    }

    pub fn ref_count(&self) -> u32 {
        self.data.as_ref().map_or(0, |cell| cell.ref_count.get())
    }

    pub fn is_deleted(&self) -> bool {
        self.data.as_ref().map_or(false, |cell| cell.deleted.get())
    }

    pub fn keep(&self) {
        if let Some(cell) = &self.data {
            let count = cell.ref_count.get() + 1;
            cell.ref_count.set(count);
            log::trace!("keep {} -> {}", cell.body.class().name(), count);
        }
    }

    /// Drops one count, deleting the object when it reaches zero.
    pub fn release(&self) {
        let cell = match &self.data {
            Some(cell) => cell,
            None => return,
        };
        let count = cell.ref_count.get();
        assert!(
            count > 0,
            "released {} with a zero reference count",
            cell.body.class().name()
        );
        cell.ref_count.set(count - 1);
        log::trace!("release {} -> {}", cell.body.class().name(), count - 1);
        if count == 1 {
            self.delete();
        }
    }

    /// Drops one count without deleting; the caller takes over an unowned object.
    pub fn disown(&self) {
        if let Some(cell) = &self.data {
            let count = cell.ref_count.get();
            assert!(
                count > 0,
                "disowned {} with a zero reference count",
                cell.body.class().name()
            );
            cell.ref_count.set(count - 1);
        }
    }

    fn delete(&self) {
        let cell = match &self.data {
            Some(cell) => cell,
            None => return,
        };
        if cell.deleted.get() {
            return;
        }
        let class = cell.body.class();
        log::trace!("delete {}", class.name());
        cell.deleted.set(true);
        match cell.body.delete() {
            Ok(()) => alloc::note_delete(class),
            // already reported; the object stays alive
            Err(_) => cell.deleted.set(false),
        }
    }

    /// Body of a live object.
    pub fn body(&self) -> Result<&dyn Object> {
        match &self.data {
            None => fail(RtError::bad_param("null object")),
            Some(cell) if cell.deleted.get() => {
                fail(RtError::bad_param("object has been deleted"))
            }
            Some(cell) => Ok(&*cell.body),
        }
    }

    pub fn class(&self) -> Option<&'static ClassVocabulary> {
        self.data.as_ref().map(|cell| cell.body.class())
    }

    pub fn downcast<T: Object + 'static>(&self) -> Option<&T> {
        match &self.data {
            Some(cell) if !cell.deleted.get() => {
                // through the trait object, not the box
                let body: &dyn Object = &*cell.body;
                body.as_any().downcast_ref::<T>()
            }
            _ => None,
        }
    }

    /// Like `downcast`, but reports a mismatch.
    pub fn expect<T: Object + 'static>(&self) -> Result<&T> {
        let body = self.body()?;
        match body.as_any().downcast_ref::<T>() {
            Some(t) => Ok(t),
            None => fail(RtError::bad_param(format!(
                "expected {}, got {}",
                short_type_name::<T>(),
                body.class().name()
            ))),
        }
    }

    /// Orders two objects; null sorts first.
    pub fn compare(&self, other: &ObjectRef) -> Result<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Less),
            (false, true) => Ok(Ordering::Greater),
            (false, false) => self.body()?.compare(self, other),
        }
    }

    /// The same object viewed through the interface called `name`, if its class has one.
    pub fn get_interface(&self, name: &str) -> Option<ObjectRef> {
        let iface = self.class()?.find_interface(name)?;
        Some(Self {
            methods: Some(iface),
            data: self.data.clone(),
        })
    }

    /// The reflective class object of this object's class.
    pub fn get_class(&self) -> Result<ObjectRef> {
        Ok(class::class_object(self.body()?.class()))
    }

    pub fn show(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_object(self)
    }

    pub fn iter_ops(&self) -> Result<&dyn IterOps> {
        let body = self.body()?;
        match body.as_iter() {
            Some(ops) => Ok(ops),
            None => fail(RtError::bad_param(format!(
                "{} is not an iterator",
                body.class().name()
            ))),
        }
    }

    pub fn head_iter(&self) -> Result<ObjectRef> {
        self.body()?.head_iter(self)
    }

    pub fn tail_iter(&self) -> Result<ObjectRef> {
        self.body()?.tail_iter(self)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            None => f.write_str("ObjectRef(null)"),
            Some(cell) => write!(
                f,
                "ObjectRef({}@{:#x}, refs={}{})",
                cell.body.class().name(),
                self.addr(),
                cell.ref_count.get(),
                if cell.deleted.get() { ", deleted" } else { "" }
            ),
        }
    }
}

/// Keeps `new` and releases `old` unless they are the same object.
pub(crate) fn replace_ref(old: &ObjectRef, new: &ObjectRef) {
    if old.same(new) {
        return;
    }
    new.keep();
    old.release();
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use crate::alloc;
    use crate::containers::{Array, Pair, RtString};

    use super::ObjectRef;

    #[test]
    fn counts() {
        let before = alloc::stats();
        let s = RtString::with_text("x");
        assert_eq!(s.ref_count(), 0);
        s.keep();
        s.keep();
        s.release();
        assert!(!s.is_deleted());
        s.release();
        assert!(s.is_deleted());
        assert_eq!(alloc::stats().deleted, before.deleted + 1);
    }

    #[test]
    fn null_is_inert() {
        let n = ObjectRef::null();
        n.keep();
        n.release();
        assert_eq!(n.ref_count(), 0);
        assert!(n.body().is_err());
    }

    #[test]
    #[should_panic(expected = "zero reference count")]
    fn release_below_zero() {
        let s = RtString::with_text("x");
        s.release();
    }

    #[test]
    fn deleted_access() {
        let a = Array::create();
        a.keep();
        a.release();
        assert!(a.expect::<Array>().is_err());
        assert!(a.downcast::<Array>().is_none());
    }

    #[test]
    fn identity_across_interfaces() {
        let a = Array::create();
        let view = a.get_interface("Iterable").unwrap();
        assert_eq!(a, view);
        assert!(!std::ptr::eq(a.interface().unwrap(), view.interface().unwrap()));
        assert!(a.get_interface("Nonsense").is_none());
    }

    #[test]
    fn default_compare() {
        let a = Pair::create();
        let b = Pair::create();
        let expected = a.addr().cmp(&b.addr());
        assert_eq!(a.compare(&b).unwrap(), expected);
        assert_eq!(ObjectRef::null().compare(&a).unwrap(), Ordering::Less);
        assert_eq!(a.compare(&a).unwrap(), Ordering::Equal);
    }
}
