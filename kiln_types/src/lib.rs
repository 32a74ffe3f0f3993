pub mod error;
pub mod id;
pub mod layout;
pub mod member;
pub mod type_code;

pub use error::ErrorKind;
pub use member::{MemberDesc, MemberTable};
pub use type_code::{BaseType, TypeCode, TypeFlags};
