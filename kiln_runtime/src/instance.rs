use std::cell::RefCell;
use std::cmp::Ordering;

use crate::class::ClassVocabulary;
use crate::error::{fail, Result, RtError};
use crate::exec;
use crate::object::{Object, ObjectRef};
use crate::value::Value;

/// An object of a user class: one value per member-table entry.
#[derive(Debug)]
pub struct Instance {
    class: &'static ClassVocabulary,
    fields: RefCell<Vec<Value>>,
}

impl Instance {
    pub fn construct(class: &'static ClassVocabulary) -> Box<dyn Object> {
        Box::new(Instance {
            class,
            fields: RefCell::new(class.members().iter().map(Value::zero).collect()),
        })
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        match self.class.members().lookup(name) {
            Some((i, _)) => Ok(self.fields.borrow()[i].clone()),
            None => fail(self.no_member(name)),
        }
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.class.members().lookup(name) {
            Some((i, _)) => self.set_field(i, value.into()),
            None => fail(self.no_member(name)),
        }
    }

    fn no_member(&self, name: &str) -> RtError {
        RtError::bad_param(format!("{} has no member {}", self.class.name(), name))
    }
}

impl Object for Instance {
    fn class(&self) -> &'static ClassVocabulary {
        self.class
    }

    fn delete(&self) -> Result<()> {
        let fields = std::mem::take(&mut *self.fields.borrow_mut());
        for field in &fields {
            field.release_objects();
        }
        Ok(())
    }

    /// Runs the class's `compare` method if it has one; its sign gives the order.
    fn compare(&self, this: &ObjectRef, other: &ObjectRef) -> Result<Ordering> {
        let (method, _) = match self.class.find_method("compare") {
            Some(m) => m,
            None => return Ok(this.addr().cmp(&other.addr())),
        };
        let res = exec::execute_method(this, method, &[other.clone()])?;
        match res.as_f64() {
            Some(n) if n < 0.0 => Ok(Ordering::Less),
            Some(n) if n > 0.0 => Ok(Ordering::Greater),
            Some(_) => Ok(Ordering::Equal),
            None => fail(RtError::bad_param(format!(
                "{}.compare returned {:?}",
                self.class.name(),
                res
            ))),
        }
    }

    fn field(&self, index: usize) -> Option<Value> {
        self.fields.borrow().get(index).cloned()
    }

    fn set_field(&self, index: usize, value: Value) -> Result<()> {
        let member = match self.class.members().get(index) {
            Some(member) => member,
            None => {
                return fail(RtError::bad_index(index, self.class.members().len()))
            }
        };
        value.check(member)?;
        value.keep_objects();
        let old = std::mem::replace(&mut self.fields.borrow_mut()[index], value);
        old.release_objects();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cmp::Ordering;
    use std::rc::Rc;

    use kiln_types::id::{MethodId, OpId};
    use kiln_types::{BaseType, TypeCode};

    use super::Instance;
    use crate::alloc;
    use crate::class::ClassBuilder;
    use crate::containers::RtString;
    use crate::error::Result;
    use crate::exec::{set_executor, Executor};
    use crate::object::ObjectRef;
    use crate::value::Value;

    #[test]
    fn fields() {
        let class = ClassBuilder::instance("test.Point")
            .member("x", TypeCode::INT)
            .member("label", TypeCode::STRING)
            .member("next", TypeCode::OBJECT)
            .register();
        let p = alloc::allocate(class).unwrap();
        let inst = p.expect::<Instance>().unwrap();

        assert_eq!(inst.get("x").unwrap(), Value::Int(0));
        inst.set("x", 5).unwrap();
        inst.set("label", "hi").unwrap();
        assert_eq!(inst.get("label").unwrap(), Value::Str("hi".into()));
        assert!(inst.set("x", 5i64).is_err());
        assert!(inst.get("nope").is_err());

        let s = RtString::with_text("linked");
        inst.set("next", s.clone()).unwrap();
        assert_eq!(s.ref_count(), 1);
        // self-assignment keeps the object alive
        inst.set("next", s.clone()).unwrap();
        assert_eq!(s.ref_count(), 1);

        p.keep();
        p.release();
        assert!(s.is_deleted());
    }

    #[test]
    fn inline_capacity() {
        let class = ClassBuilder::instance("test.Tagged")
            .string_member("tag", 4)
            .array_member("vals", TypeCode::new(BaseType::Short), 2)
            .register();
        let t = alloc::allocate(class).unwrap();
        let inst = t.expect::<Instance>().unwrap();

        assert!(inst.set("tag", "abc").is_ok());
        assert!(inst.set("tag", "abcd").is_err());
        assert_eq!(inst.get("tag").unwrap(), Value::Str("abc".into()));
        assert!(inst
            .set("vals", Value::Array(vec![Value::Short(1); 3]))
            .is_err());
    }

    struct ByField {
        calls: Cell<u32>,
    }

    impl Executor for ByField {
        fn execute_opcode(&self, _: OpId, _: &[ObjectRef]) -> Result<Value> {
            Ok(Value::Void)
        }

        fn execute_method(&self, obj: &ObjectRef, _: MethodId, args: &[ObjectRef]) -> Result<Value> {
            self.calls.set(self.calls.get() + 1);
            let a = obj.expect::<Instance>()?.get("k")?.as_i64().unwrap_or(0);
            let b = args[0].expect::<Instance>()?.get("k")?.as_i64().unwrap_or(0);
            Ok(Value::Int((a - b) as i32))
        }
    }

    #[test]
    fn user_compare() {
        let class = ClassBuilder::instance("test.Keyed")
            .member("k", TypeCode::INT)
            .method("compare", TypeCode::INT, OpId::new(0))
            .register();
        let exec = Rc::new(ByField { calls: Cell::new(0) });
        let prev = set_executor(Some(exec.clone()));

        let a = alloc::allocate(class).unwrap();
        let b = alloc::allocate(class).unwrap();
        a.expect::<Instance>().unwrap().set("k", 9).unwrap();
        b.expect::<Instance>().unwrap().set("k", 2).unwrap();
        assert_eq!(a.compare(&b).unwrap(), Ordering::Greater);
        assert_eq!(b.compare(&a).unwrap(), Ordering::Less);
        assert_eq!(exec.calls.get(), 2);

        set_executor(prev);
    }
}
