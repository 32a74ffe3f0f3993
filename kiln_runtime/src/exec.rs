use std::cell::RefCell;
use std::rc::Rc;

use kiln_types::id::{MethodId, OpId};

use crate::error::{fail, Result, RtError};
use crate::object::ObjectRef;
use crate::value::Value;

/// The bytecode interpreter, as seen from the runtime.
/// Methods take `&self`: an opcode may call back into the runtime, which may execute again.
pub trait Executor {
    fn execute_opcode(&self, op: OpId, args: &[ObjectRef]) -> Result<Value>;
    fn execute_method(&self, object: &ObjectRef, method: MethodId, args: &[ObjectRef]) -> Result<Value>;
}

thread_local! {
    static EXECUTOR: RefCell<Option<Rc<dyn Executor>>> = RefCell::new(None);
}

/// Installs (or with `None`, removes) this thread's executor, returning the previous one.
pub fn set_executor(executor: Option<Rc<dyn Executor>>) -> Option<Rc<dyn Executor>> {
    EXECUTOR.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), executor))
}

fn current() -> Result<Rc<dyn Executor>> {
    match EXECUTOR.with(|slot| slot.borrow().clone()) {
        Some(exec) => Ok(exec),
        None => fail(RtError::illegal("no executor installed")),
    }
}

pub fn execute_opcode(op: OpId, args: &[ObjectRef]) -> Result<Value> {
    log::trace!("executing opcode {:?}", op);
    current()?.execute_opcode(op, args)
}

pub fn execute_method(object: &ObjectRef, method: MethodId, args: &[ObjectRef]) -> Result<Value> {
    log::trace!("executing method {:?}", method);
    current()?.execute_method(object, method, args)
}

#[cfg(test)]
mod tests {
    use kiln_types::id::OpId;
    use kiln_types::ErrorKind;

    use super::{execute_opcode, set_executor};

    #[test]
    fn missing_executor() {
        set_executor(None);
        let err = execute_opcode(OpId::from_raw(3), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
    }
}
