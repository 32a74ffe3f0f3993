use index_vec::define_index_type;

define_index_type! {pub struct ClassId = u32;}
// opcodes are owned by the interpreter; the runtime only passes them back to it
define_index_type! {pub struct OpId = u32;}
define_index_type! {pub struct MethodId = u32;}
// list nodes live in an arena inside their list
define_index_type! {pub struct NodeId = u32;}
