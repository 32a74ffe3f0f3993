//! Cursors over the built-in containers.
//!
//! Every iterator keeps its parent container for as long as it lives. Index-addressable
//! containers share `IndexIter`; lists and maps have their own cursor types.

mod index;
mod list;
mod map;

pub use self::index::{IndexIter, Indexed};
pub use self::list::{ListCursor, ListIter};
pub use self::map::MapIter;

use crate::error::{fail, Result, RtError};
use crate::object::ObjectRef;
use crate::value::Value;

/// The operations of the `Iterator` interface.
pub trait IterOps {
    fn seek_head(&self);
    fn seek_tail(&self);
    fn seek_next(&self);
    fn seek_prev(&self);

    /// Returns the element under the cursor, then advances.
    fn next(&self) -> Option<Value>;
    /// Steps back, then returns the element under the cursor.
    fn prev(&self) -> Option<Value>;
    fn current(&self) -> Option<Value>;

    fn at_head(&self) -> bool;
    fn at_tail(&self) -> bool;

    /// Deletes the element under the cursor from the container, releasing it.
    /// Returns false if the cursor is not on an element.
    fn remove(&self) -> Result<bool>;
    /// Like `remove`, but the caller takes over the container's count on the element.
    fn unref(&self) -> Result<Option<Value>>;

    fn clone_iter(&self) -> Result<ObjectRef>;

    fn seek(&self, _pos: usize) -> Result<()> {
        fail(RtError::illegal("iterator is not index-addressable"))
    }

    fn tell(&self) -> Result<usize> {
        fail(RtError::illegal("iterator is not index-addressable"))
    }

    /// Scans forward from the cursor for `value`, stopping on it. Past-tail if absent.
    fn find_next(&self, _value: &Value) -> Result<bool> {
        fail(RtError::illegal("iterator does not support find_next"))
    }
}

/// Element equality as used by `find_next`: identity for objects, value otherwise.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => a.same(b),
        (a, b) => a == b,
    }
}
