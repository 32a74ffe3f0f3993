use serde::{Deserialize, Serialize};

use crate::layout;
use crate::type_code::{BaseType, TypeCode};

/// One entry of a class's member table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDesc {
    pub name: String,
    pub code: TypeCode,
    /// Byte offset from the start of the object block.
    pub offset: u64,
    /// Element count; inline strings use it as their byte capacity.
    pub count: u32,
    /// Record type name for struct members.
    pub record: Option<String>,
    record_size: u64,
}

impl MemberDesc {
    /// Bytes reserved for this member in the object block.
    pub fn byte_capacity(&self) -> u64 {
        self.code.element_size(self.record_size) * u64::from(self.count.max(1))
    }

    pub fn element_size(&self) -> u64 {
        self.code.element_size(self.record_size)
    }

    /// Maximum number of elements a marshaled value may carry.
    pub fn max_elements(&self) -> usize {
        let elem = self.element_size();
        if elem == 0 {
            return self.count.max(1) as usize;
        }
        (self.byte_capacity() / elem) as usize
    }
}

/// Ordered member table with computed offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTable {
    members: Vec<MemberDesc>,
    // end of the last member, header included
    size: u64,
}

impl MemberTable {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            size: layout::OBJECT_HEADER_SIZE,
        }
    }

    /// Starts a child table: the parent's members come first, at the same offsets.
    pub fn inherit(parent: &MemberTable) -> Self {
        parent.clone()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Total object block size, header included.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn get(&self, index: usize) -> Option<&MemberDesc> {
        self.members.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberDesc> + ExactSizeIterator + '_ {
        self.members.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<(usize, &MemberDesc)> {
        // later members shadow inherited ones with the same name
        self.members
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.name == name)
    }

    pub fn push(&mut self, name: impl Into<String>, code: TypeCode, count: u32) -> &MemberDesc {
        self.push_with_record(name, code, count, None, 0)
    }

    pub fn push_record(
        &mut self, name: impl Into<String>, record: impl Into<String>, record_size: u64, count: u32,
    ) -> &MemberDesc {
        let mut code = TypeCode::new(BaseType::Struct);
        if count > 1 {
            code = code.array();
        }
        self.push_with_record(name, code, count, Some(record.into()), record_size)
    }

    fn push_with_record(
        &mut self, name: impl Into<String>, code: TypeCode, count: u32, record: Option<String>,
        record_size: u64,
    ) -> &MemberDesc {
        let elem = code.element_size(record_size);
        let align = elem.clamp(1, layout::MAX_MEMBER_ALIGN);
        let offset = align_up(self.size, align);

        let desc = MemberDesc {
            name: name.into(),
            code,
            offset,
            count,
            record,
            record_size,
        };
        self.size = offset + desc.byte_capacity();
        let index = self.members.len();
        self.members.push(desc);
        &self.members[index]
    }
}

impl Default for MemberTable {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(n: u64, align: u64) -> u64 {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::MemberTable;
    use crate::layout::OBJECT_HEADER_SIZE;
    use crate::type_code::{BaseType, TypeCode};

    #[test]
    fn offsets() {
        let mut table = MemberTable::new();
        table.push("flag", TypeCode::new(BaseType::Byte), 1);
        table.push("count", TypeCode::INT, 1);
        table.push("name", TypeCode::new(BaseType::String), 13);
        table.push("next", TypeCode::OBJECT, 1);

        let offsets: Vec<_> = table.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![8, 12, 16, 32]);
        assert_eq!(table.size(), 48);
    }

    #[test]
    fn inherit() {
        let mut parent = MemberTable::new();
        parent.push("x", TypeCode::DOUBLE, 1);
        let mut child = MemberTable::inherit(&parent);
        child.push("y", TypeCode::DOUBLE, 1);

        assert_eq!(child.len(), 2);
        assert_eq!(child.lookup("x").unwrap().1.offset, OBJECT_HEADER_SIZE);
        assert_eq!(child.lookup("y").unwrap().0, 1);
        assert!(child.lookup("z").is_none());
    }

    #[test]
    fn capacity() {
        let mut table = MemberTable::new();
        let ints = table.push("vals", TypeCode::INT.array(), 4).clone();
        assert_eq!(ints.byte_capacity(), 16);
        assert_eq!(ints.max_elements(), 4);

        let rec = table.push_record("pts", "Vec2", 16, 3).clone();
        assert!(rec.code.is_array());
        assert_eq!(rec.byte_capacity(), 48);
    }

    #[test]
    fn serde() {
        let mut table = MemberTable::new();
        table.push("a", TypeCode::OBJECT, 1);
        table.push("s", TypeCode::STRING, 1);

        let buf = bincode::serialize(&table).unwrap();
        let back: MemberTable = bincode::deserialize(&buf).unwrap();
        assert_eq!(table, back);
    }
}
