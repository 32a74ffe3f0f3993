use std::io::Write;

use kiln_types::layout::{ID_FIELD, ID_SEPARATOR};
use kiln_types::MemberDesc;
use rustc_hash::FxHashMap;

use crate::class::{self, ClassVocabulary};
use crate::error::{fail, report, Result, RtError};
use crate::object::ObjectRef;
use crate::value::{is_sequence, Value};

const INDENT: &str = "  ";

/// Depth-first emitter of object graphs.
///
/// Every object is written in full the first time it is reached and as a quoted link to its
/// `__id` after that, so shared references and cycles survive a round trip.
pub struct Writer<'a> {
    out: &'a mut dyn Write,
    // first-item flag of each open `{`/`[`
    scopes: Vec<bool>,
    after_key: bool,
    shown: FxHashMap<usize, String>,
    next_ordinal: u64,
}

impl<'a> Writer<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            scopes: Vec::new(),
            after_key: false,
            shown: FxHashMap::default(),
            next_ordinal: 1,
        }
    }

    /// Writes the graph reachable from `root`, followed by a newline.
    pub fn write(&mut self, root: &ObjectRef) -> Result<()> {
        self.write_object(root)?;
        self.raw("\n")?;
        self.out.flush().map_err(|e| report(e.into()))?;
        log::debug!("wrote object graph of {} objects", self.shown.len());
        Ok(())
    }

    /// Records `obj` as emitted. Returns true if it already was.
    pub fn add_object(&mut self, obj: &ObjectRef) -> Result<bool> {
        if self.shown.contains_key(&obj.addr()) {
            return Ok(true);
        }
        let class = obj.body()?.class();
        let id = format!("{}{}{}", class.name(), ID_SEPARATOR, self.next_ordinal);
        self.next_ordinal += 1;
        self.shown.insert(obj.addr(), id);
        Ok(false)
    }

    /// The `__id` given to `obj`, if it has been emitted.
    pub fn link(&self, obj: &ObjectRef) -> Option<&str> {
        self.shown.get(&obj.addr()).map(String::as_str)
    }

    fn raw(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| report(e.into()))
    }

    fn newline(&mut self) -> Result<()> {
        self.raw("\n")?;
        for _ in 0..self.scopes.len() {
            self.raw(INDENT)?;
        }
        Ok(())
    }

    // separator and indentation ahead of a value; nothing right after a field name
    fn item(&mut self) -> Result<()> {
        if self.after_key {
            self.after_key = false;
            return Ok(());
        }
        let first = match self.scopes.last_mut() {
            Some(first) => std::mem::replace(first, false),
            None => return Ok(()),
        };
        if !first {
            self.raw(",")?;
        }
        self.newline()
    }

    fn quoted(&mut self, text: &str) -> Result<()> {
        let mut escaped = String::with_capacity(text.len() + 2);
        escaped.push('"');
        for c in text.chars() {
            match c {
                '\n' => escaped.push_str("\\n"),
                '\t' => escaped.push_str("\\t"),
                '\r' => escaped.push_str("\\r"),
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                c => escaped.push(c),
            }
        }
        escaped.push('"');
        self.raw(&escaped)
    }

    /// Starts a field of the enclosing object. The next value written is its value.
    pub fn field(&mut self, name: &str) -> Result<()> {
        if self.after_key {
            return fail(RtError::illegal(format!("field {} has no value before it", name)));
        }
        self.item()?;
        self.quoted(name)?;
        self.raw(": ")?;
        self.after_key = true;
        Ok(())
    }

    pub fn begin_object(&mut self) -> Result<()> {
        self.item()?;
        self.raw("{")?;
        self.scopes.push(true);
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.close("}")
    }

    pub fn begin_array(&mut self) -> Result<()> {
        self.item()?;
        self.raw("[")?;
        self.scopes.push(true);
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.close("]")
    }

    fn close(&mut self, bracket: &str) -> Result<()> {
        let empty = match self.scopes.pop() {
            Some(first) => first,
            None => return fail(RtError::illegal("unbalanced close in writer")),
        };
        if !empty {
            self.newline()?;
        }
        self.raw(bracket)
    }

    /// Writes `obj`: `{}` for null, a quoted link for a repeat, otherwise the full object.
    pub fn write_object(&mut self, obj: &ObjectRef) -> Result<()> {
        if obj.is_null() {
            self.begin_object()?;
            return self.end_object();
        }
        if self.add_object(obj)? {
            let link = self.link(obj).unwrap_or_default().to_owned();
            self.item()?;
            return self.quoted(&link);
        }
        let id = self.link(obj).unwrap_or_default().to_owned();
        let body = obj.body()?;
        let class = body.class();

        self.begin_object()?;
        self.field(ID_FIELD)?;
        self.write_value(&Value::Str(id))?;
        for (i, member) in class.members().iter().enumerate() {
            if !member.code.is_marshaled() {
                continue;
            }
            let value = match body.field(i) {
                Some(value) => value,
                None => continue,
            };
            self.field(&member.name)?;
            self.write_member_value(member, &value)?;
        }
        body.show_inner(self)?;
        self.end_object()
    }

    /// Writes a scalar, string, object or untyped array value.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        let text = match value {
            Value::Object(obj) => return self.write_object(obj),
            Value::Str(s) => {
                self.item()?;
                return self.quoted(s);
            }
            Value::Array(vals) => {
                self.begin_array()?;
                for v in vals {
                    self.write_value(v)?;
                }
                return self.end_array();
            }
            Value::Byte(n) => n.to_string(),
            Value::UByte(n) => n.to_string(),
            Value::Short(n) => n.to_string(),
            Value::UShort(n) => n.to_string(),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            Value::Long(n) => n.to_string(),
            Value::ULong(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Double(f) if f.is_finite() => f.to_string(),
            Value::Float(_) | Value::Double(_) => {
                return fail(RtError::bad_param(format!("cannot write {:?}", value)))
            }
            Value::Void | Value::Record(_) => {
                return fail(RtError::bad_param(format!("cannot write untyped {:?}", value)))
            }
        };
        self.item()?;
        self.raw(&text)
    }

    /// Writes one record as an object of its fields, without an `__id`.
    pub fn write_record(&mut self, record: &ClassVocabulary, fields: &[Value]) -> Result<()> {
        self.begin_object()?;
        for (member, value) in record.members().iter().zip(fields) {
            if !member.code.is_marshaled() {
                continue;
            }
            self.field(&member.name)?;
            self.write_member_value(member, value)?;
        }
        self.end_object()
    }

    fn write_member_value(&mut self, member: &MemberDesc, value: &Value) -> Result<()> {
        match value {
            Value::Array(vals) if is_sequence(member) => {
                self.begin_array()?;
                for v in vals {
                    self.write_element(member, v)?;
                }
                self.end_array()
            }
            v => self.write_element(member, v),
        }
    }

    fn write_element(&mut self, member: &MemberDesc, value: &Value) -> Result<()> {
        match value {
            Value::Record(fields) => {
                match member.record.as_deref().and_then(class::lookup_class) {
                    Some(record) => self.write_record(record, fields),
                    None => fail(RtError::bad_param(format!(
                        "unknown record type for member {}",
                        member.name
                    ))),
                }
            }
            v => self.write_value(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::containers::{Array, Pair, RtString};
    use crate::object::ObjectRef;

    fn render(obj: &ObjectRef) -> String {
        let mut out = Vec::new();
        Writer::new(&mut out).write(obj).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn nested_and_linked() {
        let a = Array::create();
        let array = a.expect::<Array>().unwrap();
        let s = RtString::with_text("hi \"there\"\n");
        array.push(&s);
        array.push(&s);
        array.push(&ObjectRef::null());

        let expected = concat!(
            "{\n",
            "  \"__id\": \"Array_1\",\n",
            "  \"elements\": [\n",
            "    {\n",
            "      \"__id\": \"String_2\",\n",
            "      \"value\": \"hi \\\"there\\\"\\n\"\n",
            "    },\n",
            "    \"String_2\",\n",
            "    {}\n",
            "  ]\n",
            "}\n",
        );
        assert_eq!(render(&a), expected);
    }

    #[test]
    fn empty_containers() {
        let p = Pair::create();
        let out = render(&p);
        assert!(out.contains("\"a\": {},"));
        assert!(out.contains("\"b\": {}\n"));
        assert_eq!(render(&Array::create()), "{\n  \"__id\": \"Array_1\",\n  \"elements\": []\n}\n");
    }

    #[test]
    fn cycle_terminates() {
        let a = Array::create();
        a.keep();
        a.expect::<Array>().unwrap().push(&a);
        let out = render(&a);
        assert!(out.contains("\"Array_1\"\n"));
        // break the cycle so the array can go
        a.expect::<Array>().unwrap().clear();
        a.release();
        assert!(a.is_deleted());
    }
}
