use std::io::{BufReader, Bytes, Read};

use kiln_types::layout::{ID_FIELD, ID_SEPARATOR};
use kiln_types::{BaseType, MemberDesc};
use rustc_hash::FxHashMap;

use crate::alloc;
use crate::class::{self, ClassVocabulary};
use crate::error::{report, ParseError, Result, RtError};
use crate::object::ObjectRef;
use crate::value::{is_sequence, Value};

/// Recursive-descent reader for the text the `Writer` produces.
///
/// Objects are created through their class as their `__id` is read and registered under it,
/// so later quoted links resolve to the same instance. The first error abandons the parse.
pub struct Reader<'a> {
    input: Bytes<BufReader<Box<dyn Read + 'a>>>,
    pushback: Option<u8>,
    line: u32,
    column: u32,
    // position before the last byte read, restored by `unget`
    last_pos: (u32, u32),
    objects: FxHashMap<String, ObjectRef>,
    // creation order, for cleanup once the parse ends
    created: Vec<ObjectRef>,
}

impl<'a> Reader<'a> {
    pub fn new(input: impl Read + 'a) -> Self {
        let input: Box<dyn Read + 'a> = Box::new(input);
        Self {
            input: BufReader::new(input).bytes(),
            pushback: None,
            line: 1,
            column: 0,
            last_pos: (1, 0),
            objects: FxHashMap::default(),
            created: Vec::new(),
        }
    }

    /// Reads one object graph and returns its root, owned by nobody.
    pub fn read(&mut self) -> Result<ObjectRef> {
        let res = self.read_object_value();
        self.objects.clear();
        let created = std::mem::take(&mut self.created);
        for obj in &created {
            obj.disown();
        }
        match res {
            Ok(root) => {
                // objects dropped by an overwritten field belong to nobody; the root is held
                // so an orphan linking back to it cannot take it down
                root.keep();
                let dropped = delete_unowned(&created);
                root.disown();
                log::debug!(
                    "read object graph of {} objects, {} dropped",
                    created.len(),
                    dropped
                );
                Ok(root)
            }
            Err(err) => {
                // nothing escapes a failed parse
                delete_unowned(&created);
                Err(err)
            }
        }
    }

    /// A parse error at the current position, already reported.
    pub fn error(&self, message: impl Into<String>) -> RtError {
        report(RtError::Parse(ParseError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }))
    }

    pub fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let b = match self.pushback.take() {
            Some(b) => Some(b),
            None => match self.input.next() {
                Some(Ok(b)) => Some(b),
                Some(Err(e)) => return Err(report(RtError::from(e))),
                None => None,
            },
        };
        if let Some(b) = b {
            self.last_pos = (self.line, self.column);
            if b == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        Ok(b)
    }

    fn unget(&mut self, b: u8) {
        debug_assert!(self.pushback.is_none(), "reader pushback holds one byte");
        self.pushback = Some(b);
        self.line = self.last_pos.0;
        self.column = self.last_pos.1;
    }

    fn skip_ws(&mut self) -> Result<()> {
        while let Some(b) = self.next_byte()? {
            if !b.is_ascii_whitespace() {
                self.unget(b);
                break;
            }
        }
        Ok(())
    }

    /// The next non-blank byte, left in place.
    fn peek(&mut self) -> Result<Option<u8>> {
        self.skip_ws()?;
        let b = self.next_byte()?;
        if let Some(b) = b {
            self.unget(b);
        }
        Ok(b)
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        self.skip_ws()?;
        match self.next_byte()? {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                want as char, b as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", want as char))),
        }
    }

    /// Consumes `close` if it is next, skipping an optional comma first.
    fn at_close(&mut self, close: u8) -> Result<bool> {
        if self.peek()? == Some(b',') {
            self.next_byte()?;
        }
        match self.peek()? {
            Some(b) if b == close => {
                self.next_byte()?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(self.error(format!("expected '{}', found end of input", close as char))),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut bytes = Vec::new();
        loop {
            match self.next_byte()? {
                Some(b'"') => break,
                Some(b'\\') => match self.next_byte()? {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'r') => bytes.push(b'\r'),
                    Some(b @ (b'\\' | b'"')) => bytes.push(b),
                    Some(b) => return Err(self.error(format!("bad escape \\{}", b as char))),
                    None => return Err(self.error("unterminated string")),
                },
                Some(b) => bytes.push(b),
                None => return Err(self.error("unterminated string")),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn number_token(&mut self) -> Result<String> {
        self.skip_ws()?;
        let mut token = String::new();
        while let Some(b) = self.next_byte()? {
            // digits with an optional leading '-', one '.', and one 'e' with its own '-'
            let accepted = match b {
                b'0'..=b'9' => true,
                b'-' => token.is_empty() || token.ends_with('e'),
                b'.' => !token.contains(['.', 'e']),
                b'e' => !token.is_empty() && !token.contains('e'),
                _ => false,
            };
            if !accepted {
                self.unget(b);
                break;
            }
            token.push(b as char);
        }
        if token.is_empty() {
            return Err(self.error("expected a number"));
        }
        Ok(token)
    }

    /// Reads a value of scalar type `base`, range-checked.
    pub fn read_scalar(&mut self, base: BaseType) -> Result<Value> {
        if base == BaseType::String {
            return self.read_string().map(Value::Str);
        }
        let token = self.number_token()?;
        match Value::parse_scalar(base, &token) {
            Some(v) => Ok(v),
            None => Err(self.error(format!("bad {} value {}", base.name(), token))),
        }
    }

    /// Reads `[ item, ... ]`, handing each item to `item`.
    pub fn read_sequence<F>(&mut self, mut item: F) -> Result<()>
    where
        F: FnMut(&mut Reader<'a>) -> Result<()>,
    {
        self.expect(b'[')?;
        while !self.at_close(b']')? {
            item(self)?;
        }
        Ok(())
    }

    /// Reads `{ "key": value, ... }`, handing each key to `entry` to read its value.
    pub fn read_map_entries<F>(&mut self, mut entry: F) -> Result<()>
    where
        F: FnMut(&mut Reader<'a>, String) -> Result<()>,
    {
        self.expect(b'{')?;
        while !self.at_close(b'}')? {
            let key = self.read_string()?;
            self.expect(b':')?;
            entry(self, key)?;
        }
        Ok(())
    }

    /// An object in value position: `{}` for null, a quoted link, or a full object.
    pub fn read_object_value(&mut self) -> Result<ObjectRef> {
        match self.peek()? {
            Some(b'"') => {
                let link = self.read_string()?;
                match self.objects.get(&link) {
                    Some(obj) => Ok(obj.clone()),
                    None => Err(self.error(format!("unresolved link {}", link))),
                }
            }
            Some(b'{') => self.read_object(),
            Some(b) => Err(self.error(format!("expected an object, found '{}'", b as char))),
            None => Err(self.error("expected an object, found end of input")),
        }
    }

    fn read_object(&mut self) -> Result<ObjectRef> {
        self.expect(b'{')?;
        if self.at_close(b'}')? {
            return Ok(ObjectRef::null());
        }
        let key = self.read_string()?;
        if key != ID_FIELD {
            return Err(self.error(format!("expected {} first, found {}", ID_FIELD, key)));
        }
        self.expect(b':')?;
        let id = self.read_string()?;
        let class = self.resolve_id(&id)?;
        if self.objects.contains_key(&id) {
            return Err(self.error(format!("duplicate object id {}", id)));
        }

        let obj = alloc::create(class)?;
        // held until the parse ends so a replaced slot cannot delete it under us
        obj.keep();
        self.created.push(obj.clone());
        log::debug!("registered {} at line {}", id, self.line);
        self.objects.insert(id, obj.clone());

        while !self.at_close(b'}')? {
            let field = self.read_string()?;
            self.expect(b':')?;
            self.read_field(&obj, class, &field)?;
        }
        Ok(obj)
    }

    fn resolve_id(&self, id: &str) -> Result<&'static ClassVocabulary> {
        let (name, ordinal) = match id.rsplit_once(ID_SEPARATOR) {
            Some(parts) => parts,
            None => return Err(self.error(format!("bad object id {}", id))),
        };
        if ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.error(format!("bad object id {}", id)));
        }
        match class::lookup_class(name) {
            Some(class) => Ok(class),
            None => Err(self.error(format!("unknown class {}", name))),
        }
    }

    fn read_field(&mut self, obj: &ObjectRef, class: &'static ClassVocabulary, field: &str) -> Result<()> {
        if let Some((index, member)) = class.members().lookup(field) {
            if !member.code.is_marshaled() {
                return Err(self.error(format!("member {} is not readable", field)));
            }
            let value = self.read_member_value(member)?;
            return obj.body()?.set_field(index, value);
        }
        if let Some(custom) = class.custom_reader() {
            if custom(self, obj, field)? {
                return Ok(());
            }
        }
        Err(self.error(format!("unknown field {} in {}", field, class.name())))
    }

    fn read_member_value(&mut self, member: &MemberDesc) -> Result<Value> {
        if !is_sequence(member) {
            return self.read_element(member);
        }
        let max = member.max_elements();
        let mut vals = Vec::new();
        self.read_sequence(|r| {
            if vals.len() == max {
                return Err(r.error(format!("data would overrun object end in {}", member.name)));
            }
            vals.push(r.read_element(member)?);
            Ok(())
        })?;
        Ok(Value::Array(vals))
    }

    fn read_element(&mut self, member: &MemberDesc) -> Result<Value> {
        match member.code.base {
            BaseType::Object => self.read_object_value().map(Value::Object),
            BaseType::Struct => {
                let record = member.record.as_deref().and_then(class::lookup_class);
                match record {
                    Some(record) => self.read_record(record).map(Value::Record),
                    None => Err(self.error(format!(
                        "unknown struct {}",
                        member.record.as_deref().unwrap_or("?")
                    ))),
                }
            }
            BaseType::String => {
                let s = self.read_string()?;
                if member.code.is_inline_string()
                    && !is_sequence(member)
                    && s.len() + 1 > member.count as usize
                {
                    return Err(self.error(format!(
                        "string would overrun object end in {}",
                        member.name
                    )));
                }
                Ok(Value::Str(s))
            }
            base => self.read_scalar(base),
        }
    }

    /// Reads `{ "field": value, ... }` shaped by `record`. Missing fields stay zero.
    pub fn read_record(&mut self, record: &ClassVocabulary) -> Result<Vec<Value>> {
        let mut fields: Vec<Value> = record.members().iter().map(Value::zero).collect();
        self.expect(b'{')?;
        while !self.at_close(b'}')? {
            let name = self.read_string()?;
            self.expect(b':')?;
            match record.members().lookup(&name) {
                Some((index, member)) => fields[index] = self.read_member_value(member)?,
                None => {
                    return Err(self.error(format!("unknown field {} in record {}", name, record.name())))
                }
            }
        }
        Ok(fields)
    }
}

/// Deletes every object left without an owner. Returns how many went.
fn delete_unowned(objects: &[ObjectRef]) -> usize {
    let mut deleted = 0;
    for obj in objects {
        if !obj.is_deleted() && obj.ref_count() == 0 {
            obj.keep();
            obj.release();
            deleted += 1;
        }
    }
    deleted
}
