use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BaseType {
    Void,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Object,
    Struct,
    Op,
    Method,
}

impl BaseType {
    /// Size in bytes of one element stored inline.
    /// Struct elements are sized by their record vocabulary, so report 0 here.
    pub fn size(self) -> u64 {
        match self {
            BaseType::Void | BaseType::Struct => 0,
            BaseType::Byte | BaseType::UByte | BaseType::String => 1,
            BaseType::Short | BaseType::UShort => 2,
            BaseType::Int | BaseType::UInt | BaseType::Float | BaseType::Op => 4,
            BaseType::Long | BaseType::ULong | BaseType::Double => 8,
            BaseType::Method => layout::POINTER_SIZE,
            BaseType::Object => layout::OBJECT_REF_SIZE,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::Byte
                | BaseType::UByte
                | BaseType::Short
                | BaseType::UShort
                | BaseType::Int
                | BaseType::UInt
                | BaseType::Long
                | BaseType::ULong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BaseType::Float | BaseType::Double)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Void => "void",
            BaseType::Byte => "byte",
            BaseType::UByte => "ubyte",
            BaseType::Short => "short",
            BaseType::UShort => "ushort",
            BaseType::Int => "int",
            BaseType::UInt => "uint",
            BaseType::Long => "long",
            BaseType::ULong => "ulong",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Object => "object",
            BaseType::Struct => "struct",
            BaseType::Op => "op",
            BaseType::Method => "method",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TypeFlags: u8 {
        const POINTER = 1 << 0;
        const ARRAY = 1 << 1;
        const METHOD = 1 << 2;
    }
}

/// Tags a member or a method return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeCode {
    pub base: BaseType,
    pub flags: TypeFlags,
}

impl TypeCode {
    pub const VOID: TypeCode = TypeCode::new(BaseType::Void);
    pub const OBJECT: TypeCode = TypeCode::new(BaseType::Object);
    pub const INT: TypeCode = TypeCode::new(BaseType::Int);
    pub const LONG: TypeCode = TypeCode::new(BaseType::Long);
    pub const DOUBLE: TypeCode = TypeCode::new(BaseType::Double);
    /// Heap string of any length.
    pub const STRING: TypeCode = TypeCode {
        base: BaseType::String,
        flags: TypeFlags::POINTER,
    };

    pub const fn new(base: BaseType) -> Self {
        Self {
            base,
            flags: TypeFlags::empty(),
        }
    }

    pub const fn with_flags(base: BaseType, flags: TypeFlags) -> Self {
        Self { base, flags }
    }

    pub fn array(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags | TypeFlags::ARRAY,
        }
    }

    pub fn pointer(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags | TypeFlags::POINTER,
        }
    }

    pub fn method(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags | TypeFlags::METHOD,
        }
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_pointer(&self) -> bool {
        self.flags.contains(TypeFlags::POINTER)
    }

    pub fn is_method(&self) -> bool {
        self.flags.contains(TypeFlags::METHOD) || self.base == BaseType::Method
    }

    /// A string stored inline in the object, bounded by the member's element count.
    pub fn is_inline_string(&self) -> bool {
        self.base == BaseType::String && !self.is_pointer()
    }

    /// Whether the generic show/read routines marshal this member.
    /// Code slots and raw non-string pointers are never part of the textual form.
    pub fn is_marshaled(&self) -> bool {
        if self.is_method() {
            return false;
        }
        match self.base {
            BaseType::Void | BaseType::Op | BaseType::Method => false,
            BaseType::String | BaseType::Object => true,
            _ => !self.is_pointer(),
        }
    }

    /// Size of a single element as stored in an object block.
    pub fn element_size(&self, record_size: u64) -> u64 {
        if self.is_pointer() && self.base != BaseType::Object {
            return layout::POINTER_SIZE;
        }
        match self.base {
            BaseType::Struct => record_size,
            b => b.size(),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.name())?;
        if self.is_pointer() {
            f.write_str("*")?;
        }
        if self.is_array() {
            f.write_str("[]")?;
        }
        if self.flags.contains(TypeFlags::METHOD) {
            f.write_str("()")?;
        }
        Ok(())
    }
}
