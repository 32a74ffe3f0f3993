//! SoT constants for object layout and the textual graph format

// every object block starts with its refcount, padded out to the first member
pub const OBJECT_HEADER_SIZE: u64 = 8;
// an object reference is a (methods, data) pair
pub const OBJECT_REF_SIZE: u64 = 16;
pub const POINTER_SIZE: u64 = 8;
pub const MAX_MEMBER_ALIGN: u64 = 8;

// reserved field names in the graph format
pub const ID_FIELD: &str = "__id";
pub const KEYS_FIELD: &str = "__keys";
pub const ELEMENTS_FIELD: &str = "elements";
pub const MAP_FIELD: &str = "map";
pub const QUEUE_FIELD: &str = "queue";
pub const TAGS_FIELD: &str = "tags";
pub const RECORD_FIELD: &str = "record";
pub const VALUE_FIELD: &str = "value";

// separates the class name from the ordinal in object ids, e.g. `Array_3`
pub const ID_SEPARATOR: char = '_';

// string formatter growth: first retry size, then doubling up to the hard max
pub const FORMAT_FIRST_OVERFLOW: usize = 256;
pub const FORMAT_HARD_MAX: usize = 1 << 20;

pub const STRING_MIN_CAPACITY: usize = 16;
