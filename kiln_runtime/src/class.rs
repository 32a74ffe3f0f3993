use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use kiln_types::id::{ClassId, MethodId, OpId};
use kiln_types::layout::OBJECT_HEADER_SIZE;
use kiln_types::{BaseType, MemberTable, TypeCode};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::alloc;
use crate::containers;
use crate::error::{fail, Result, RtError};
use crate::exec;
use crate::instance::Instance;
use crate::object::{Object, ObjectRef};
use crate::serial::Reader;
use crate::value::Value;

/// A named view over an object's data; the `methods` half of an `ObjectRef`.
#[derive(Debug)]
pub struct Interface {
    name: Cow<'static, str>,
}

impl Interface {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub static ITERABLE: Interface = Interface::new("Iterable");
pub static ITERATOR: Interface = Interface::new("Iterator");

pub type Constructor = fn(&'static ClassVocabulary) -> Box<dyn Object>;
/// Handles a field the member table does not know. Returns false if the field isn't its either.
pub type CustomReader = fn(&mut Reader<'_>, &ObjectRef, &str) -> Result<bool>;

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDesc {
    pub name: String,
    pub ret: TypeCode,
    pub op: OpId,
}

/// Static metadata of a class. Registered once and never freed.
pub struct ClassVocabulary {
    id: ClassId,
    name: String,
    parent: Option<&'static ClassVocabulary>,
    members: MemberTable,
    primary: Interface,
    interfaces: Vec<&'static Interface>,
    methods: Vec<MethodDesc>,
    construct: Option<Constructor>,
    init_op: Option<OpId>,
    custom_reader: Option<CustomReader>,
}

impl ClassVocabulary {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&'static ClassVocabulary> {
        self.parent
    }

    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    pub fn primary(&self) -> &Interface {
        &self.primary
    }

    pub fn interfaces(&self) -> &[&'static Interface] {
        &self.interfaces
    }

    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }

    pub fn constructor(&self) -> Option<Constructor> {
        self.construct
    }

    pub fn init_op(&self) -> Option<OpId> {
        self.init_op
    }

    pub fn custom_reader(&self) -> Option<CustomReader> {
        self.custom_reader
    }

    /// Payload size of one record of this class, as embedded in a struct member.
    pub fn record_size(&self) -> u64 {
        self.members.size() - OBJECT_HEADER_SIZE
    }

    pub fn find_interface(&self, name: &str) -> Option<&Interface> {
        if self.primary.name() == name {
            return Some(&self.primary);
        }
        if let Some(iface) = self.interfaces.iter().find(|i| i.name() == name) {
            return Some(*iface);
        }
        self.parent.and_then(|p| p.find_interface(name))
    }

    /// Later entries shadow inherited ones, so search from the back.
    pub fn find_method(&self, name: &str) -> Option<(MethodId, &MethodDesc)> {
        self.methods
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (MethodId::new(i), m))
    }

    pub fn is_subclass_of(&self, other: &ClassVocabulary) -> bool {
        let mut cur = Some(self);
        while let Some(class) = cur {
            if class.id == other.id {
                return true;
            }
            cur = class.parent;
        }
        false
    }
}

impl fmt::Debug for ClassVocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassVocabulary")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name()))
            .field("members", &self.members.len())
            .finish()
    }
}

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(0);

pub struct ClassBuilder {
    name: String,
    parent: Option<&'static ClassVocabulary>,
    members: MemberTable,
    interfaces: Vec<&'static Interface>,
    methods: Vec<MethodDesc>,
    construct: Option<Constructor>,
    init_op: Option<OpId>,
    custom_reader: Option<CustomReader>,
}

impl ClassBuilder {
    /// A class with no constructor; abstract until `construct` is called.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            members: MemberTable::new(),
            interfaces: Vec::new(),
            methods: Vec::new(),
            construct: None,
            init_op: None,
            custom_reader: None,
        }
    }

    /// A user class whose objects are generic member-table instances.
    pub fn instance(name: impl Into<String>) -> Self {
        Self::new(name)
            .parent(&OBJECT_CLASS)
            .construct(Instance::construct)
    }

    /// Inherits the parent's members, methods and interfaces. Call before adding members.
    pub fn parent(mut self, parent: &'static ClassVocabulary) -> Self {
        self.members = MemberTable::inherit(parent.members());
        self.methods = parent.methods().to_vec();
        self.interfaces = parent.interfaces().to_vec();
        if self.custom_reader.is_none() {
            self.custom_reader = parent.custom_reader();
        }
        self.parent = Some(parent);
        self
    }

    pub fn member(mut self, name: impl Into<String>, code: TypeCode) -> Self {
        self.members.push(name, code, 1);
        self
    }

    pub fn array_member(mut self, name: impl Into<String>, code: TypeCode, count: u32) -> Self {
        self.members.push(name, code.array(), count);
        self
    }

    /// A string stored inline, holding at most `capacity - 1` bytes.
    pub fn string_member(mut self, name: impl Into<String>, capacity: u32) -> Self {
        self.members
            .push(name, TypeCode::new(BaseType::String), capacity);
        self
    }

    pub fn record_member(
        mut self, name: impl Into<String>, record: &'static ClassVocabulary, count: u32,
    ) -> Self {
        self.members
            .push_record(name, record.name(), record.record_size(), count);
        self
    }

    pub fn interface(mut self, iface: &'static Interface) -> Self {
        self.interfaces.push(iface);
        self
    }

    pub fn method(mut self, name: impl Into<String>, ret: TypeCode, op: OpId) -> Self {
        self.methods.push(MethodDesc {
            name: name.into(),
            ret,
            op,
        });
        self
    }

    pub fn construct(mut self, construct: Constructor) -> Self {
        self.construct = Some(construct);
        self
    }

    pub fn init_op(mut self, op: OpId) -> Self {
        self.init_op = Some(op);
        self
    }

    pub fn custom_reader(mut self, reader: CustomReader) -> Self {
        self.custom_reader = Some(reader);
        self
    }

    pub fn build(self) -> ClassVocabulary {
        let id = ClassId::from_raw(NEXT_CLASS_ID.fetch_add(1, AtomicOrdering::Relaxed));
        let primary = Interface {
            name: Cow::Owned(self.name.clone()),
        };
        ClassVocabulary {
            id,
            name: self.name,
            parent: self.parent,
            members: self.members,
            primary,
            interfaces: self.interfaces,
            methods: self.methods,
            construct: self.construct,
            init_op: self.init_op,
            custom_reader: self.custom_reader,
        }
    }

    pub fn register(self) -> &'static ClassVocabulary {
        register_class(self.build())
    }
}

/// Root of every built-in class.
pub static OBJECT_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| ClassBuilder::new("Object").build());

pub static CLASS_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("Class")
        .parent(&OBJECT_CLASS)
        .member("name", TypeCode::STRING)
        .build()
});

#[derive(Debug, Default)]
pub struct ClassRegistry {
    by_name: FxHashMap<String, &'static ClassVocabulary>,
    by_id: FxHashMap<ClassId, &'static ClassVocabulary>,
}

impl ClassRegistry {
    fn insert(&mut self, class: &'static ClassVocabulary) {
        self.by_name.insert(class.name().to_owned(), class);
        self.by_id.insert(class.id(), class);
    }
}

static REGISTRY: Lazy<RwLock<ClassRegistry>> = Lazy::new(|| {
    let mut registry = ClassRegistry::default();
    registry.insert(&OBJECT_CLASS);
    registry.insert(&CLASS_CLASS);
    for class in containers::builtin_classes() {
        registry.insert(class);
    }
    RwLock::new(registry)
});

/// Registers `class` under its name. A name that is already taken keeps its first class.
pub fn register_class(class: ClassVocabulary) -> &'static ClassVocabulary {
    if let Some(existing) = lookup_class(class.name()) {
        return existing;
    }
    let mut registry = REGISTRY.write();
    if let Some(existing) = registry.by_name.get(class.name()) {
        return existing;
    }
    let class: &'static ClassVocabulary = Box::leak(Box::new(class));
    log::debug!("registered class {} as {:?}", class.name(), class.id());
    registry.insert(class);
    class
}

pub fn lookup_class(name: &str) -> Option<&'static ClassVocabulary> {
    REGISTRY.read().by_name.get(name).copied()
}

pub fn class_by_id(id: ClassId) -> Option<&'static ClassVocabulary> {
    REGISTRY.read().by_id.get(&id).copied()
}

/// Reflective handle on a class. One per class per thread, pinned for the thread's lifetime.
#[derive(Debug)]
pub struct ClassObject {
    vocab: &'static ClassVocabulary,
    new_op: Cell<Option<OpId>>,
}

impl ClassObject {
    pub fn vocab(&self) -> &'static ClassVocabulary {
        self.vocab
    }

    pub fn create(&self) -> Result<ObjectRef> {
        alloc::create(self.vocab)
    }

    pub fn get_parent(&self) -> Option<ObjectRef> {
        self.vocab.parent().map(class_object)
    }

    pub fn get_name(&self) -> &str {
        self.vocab.name()
    }

    pub fn get_interface(&self, name: &str) -> Option<&Interface> {
        self.vocab.find_interface(name)
    }

    /// Replaces allocation with `op`, run through the executor; `None` restores the default.
    pub fn set_new(&self, op: Option<OpId>) {
        self.new_op.set(op);
    }
}

impl Object for ClassObject {
    fn class(&self) -> &'static ClassVocabulary {
        &CLASS_CLASS
    }

    fn delete(&self) -> Result<()> {
        fail(RtError::illegal("cannot delete a class object"))
    }

    fn field(&self, index: usize) -> Option<Value> {
        match index {
            0 => Some(Value::Str(self.vocab.name().to_owned())),
            _ => None,
        }
    }
}

thread_local! {
    static CLASS_OBJECTS: RefCell<FxHashMap<ClassId, ObjectRef>> = RefCell::new(FxHashMap::default());
}

pub fn class_object(vocab: &'static ClassVocabulary) -> ObjectRef {
    if let Some(obj) = CLASS_OBJECTS.with(|objs| objs.borrow().get(&vocab.id()).cloned()) {
        return obj;
    }
    let obj = ObjectRef::wrap(Box::new(ClassObject {
        vocab,
        new_op: Cell::new(None),
    }));
    obj.keep();
    CLASS_OBJECTS.with(|objs| objs.borrow_mut().insert(vocab.id(), obj.clone()));
    obj
}

/// Runs the `new` override installed on `vocab`'s class object, if any.
pub(crate) fn run_new_override(vocab: &'static ClassVocabulary) -> Result<Option<ObjectRef>> {
    let cls = match CLASS_OBJECTS.with(|objs| objs.borrow().get(&vocab.id()).cloned()) {
        Some(cls) => cls,
        None => return Ok(None),
    };
    let op = match cls.downcast::<ClassObject>().and_then(|c| c.new_op.get()) {
        Some(op) => op,
        None => return Ok(None),
    };
    match exec::execute_opcode(op, &[cls])? {
        Value::Object(obj) if !obj.is_null() => Ok(Some(obj)),
        _ => fail(RtError::bad_param(format!(
            "new opcode for {} did not return an object",
            vocab.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use kiln_types::id::{MethodId, OpId};
    use kiln_types::{ErrorKind, TypeCode};

    use super::{class_object, lookup_class, ClassBuilder, ClassObject, OBJECT_CLASS};
    use crate::containers::ARRAY_CLASS;
    use crate::error::Result;
    use crate::exec::{set_executor, Executor};
    use crate::object::ObjectRef;
    use crate::value::Value;

    #[test]
    fn builtins_registered() {
        let array = lookup_class("Array").unwrap();
        assert_eq!(array.id(), ARRAY_CLASS.id());
        assert!(array.is_subclass_of(&OBJECT_CLASS));
        assert!(lookup_class("StringMap").is_some());
        assert!(lookup_class("ListIterator").is_some());
    }

    #[test]
    fn register_idempotent() {
        let a = ClassBuilder::instance("test.Idem").register();
        let b = ClassBuilder::instance("test.Idem")
            .member("x", TypeCode::INT)
            .register();
        assert!(std::ptr::eq(a, b));
        assert!(b.members().is_empty());
    }

    #[test]
    fn inherits_members() {
        let base = ClassBuilder::instance("test.Base")
            .member("x", TypeCode::INT)
            .method("compare", TypeCode::INT, OpId::new(1))
            .register();
        let child = ClassBuilder::instance("test.Child")
            .parent(base)
            .member("y", TypeCode::DOUBLE)
            .method("show", TypeCode::VOID, OpId::new(2))
            .register();

        assert_eq!(child.members().len(), 2);
        assert_eq!(child.find_method("compare").unwrap().0, MethodId::new(0));
        assert_eq!(child.parent().unwrap().name(), "test.Base");
        assert!(child.is_subclass_of(base));
        assert!(!base.is_subclass_of(child));
    }

    #[test]
    fn class_object_pinned() {
        let a = class_object(&ARRAY_CLASS);
        let b = class_object(&ARRAY_CLASS);
        assert_eq!(a, b);
        assert_eq!(a.ref_count(), 1);

        let cls = a.downcast::<ClassObject>().unwrap();
        assert_eq!(cls.get_name(), "Array");
        assert!(cls.get_interface("Iterable").is_some());
        let parent = cls.get_parent().unwrap();
        assert_eq!(parent.downcast::<ClassObject>().unwrap().get_name(), "Object");
    }

    #[test]
    fn class_object_survives_delete() {
        let cls = class_object(&OBJECT_CLASS);
        cls.release();
        assert!(!cls.is_deleted());
        cls.keep();
    }

    #[test]
    fn create_through_class() {
        let cls = class_object(&ARRAY_CLASS);
        let obj = cls.downcast::<ClassObject>().unwrap().create().unwrap();
        assert_eq!(obj.class().unwrap().name(), "Array");
        assert_eq!(obj.ref_count(), 0);
        assert_eq!(obj.get_class().unwrap(), cls);

        let abs = class_object(&OBJECT_CLASS);
        let err = abs.downcast::<ClassObject>().unwrap().create().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
    }

    struct Factory;

    impl Executor for Factory {
        fn execute_opcode(&self, _op: OpId, _args: &[ObjectRef]) -> Result<Value> {
            let obj = crate::alloc::allocate(lookup_class("test.Made").unwrap())?;
            Ok(Value::Object(obj))
        }

        fn execute_method(&self, _: &ObjectRef, _: MethodId, _: &[ObjectRef]) -> Result<Value> {
            Ok(Value::Void)
        }
    }

    #[test]
    fn new_override() {
        let made = ClassBuilder::instance("test.Made").register();
        let holder = ClassBuilder::instance("test.Holder").register();
        let prev = set_executor(Some(Rc::new(Factory)));

        let cls = class_object(holder);
        let cls_obj = cls.downcast::<ClassObject>().unwrap();
        cls_obj.set_new(Some(OpId::new(7)));
        let obj = cls_obj.create().unwrap();
        assert_eq!(obj.class().unwrap().name(), made.name());
        cls_obj.set_new(None);
        assert_eq!(cls_obj.create().unwrap().class().unwrap().name(), "test.Holder");

        set_executor(prev);
    }
}
