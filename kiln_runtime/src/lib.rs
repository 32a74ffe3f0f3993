pub mod alloc;
pub mod class;
pub mod containers;
pub mod error;
pub mod exec;
pub mod instance;
pub mod iter;
pub mod object;
pub mod serial;
mod sort;
pub mod value;

pub use class::{ClassBuilder, ClassVocabulary, Interface};
pub use error::{Result, RtError};
pub use iter::IterOps;
pub use object::{Object, ObjectRef};
pub use serial::{Reader, Writer};
pub use value::Value;
