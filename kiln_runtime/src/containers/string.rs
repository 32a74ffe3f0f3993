use std::cell::{Cell, Ref, RefCell};
use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::hash::Hasher;

use kiln_types::layout::{FORMAT_FIRST_OVERFLOW, FORMAT_HARD_MAX, STRING_MIN_CAPACITY, VALUE_FIELD};
use kiln_types::TypeCode;
use once_cell::sync::Lazy;
use rustc_hash::FxHasher;

use crate::class::{ClassBuilder, ClassVocabulary, OBJECT_CLASS};
use crate::containers::Array;
use crate::error::{fail, Result, RtError};
use crate::object::{Object, ObjectRef};
use crate::value::Value;

pub static STRING_CLASS: Lazy<ClassVocabulary> = Lazy::new(|| {
    ClassBuilder::new("String")
        .parent(&OBJECT_CLASS)
        .member(VALUE_FIELD, TypeCode::STRING)
        .construct(construct)
        .build()
});

fn construct(_: &'static ClassVocabulary) -> Box<dyn Object> {
    Box::new(RtString::default())
}

#[derive(Debug, Default)]
struct Buf {
    bytes: Vec<u8>,
    // capacity we have promised ourselves; grows geometrically
    max_len: usize,
}

impl Buf {
    fn reserve(&mut self, needed: usize) {
        if needed <= self.max_len {
            return;
        }
        let new_max = needed
            .max(self.max_len.saturating_mul(2))
            .max(STRING_MIN_CAPACITY);
        self.bytes.reserve_exact(new_max - self.bytes.len());
        self.max_len = new_max;
    }
}

/// Growable byte string with a cached hash.
#[derive(Debug, Default)]
pub struct RtString {
    buf: RefCell<Buf>,
    hash: Cell<Option<u32>>,
}

impl RtString {
    pub fn create() -> ObjectRef {
        ObjectRef::wrap(Box::new(RtString::default()))
    }

    pub fn with_text(text: &str) -> ObjectRef {
        let s = RtString::default();
        s.set(text);
        ObjectRef::wrap(Box::new(s))
    }

    fn edit<R>(&self, f: impl FnOnce(&mut Buf) -> R) -> R {
        self.hash.set(None);
        f(&mut self.buf.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.buf.borrow().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_len(&self) -> usize {
        self.buf.borrow().max_len
    }

    pub fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.buf.borrow(), |b| b.bytes.as_slice())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn set(&self, text: &str) {
        self.set_bytes(text.as_bytes())
    }

    pub fn set_bytes(&self, bytes: &[u8]) {
        self.edit(|b| {
            b.bytes.clear();
            b.reserve(bytes.len());
            b.bytes.extend_from_slice(bytes);
        })
    }

    /// Takes the contents of another String object.
    pub fn copy(&self, other: &RtString) {
        if std::ptr::eq(self, other) {
            return;
        }
        let bytes = other.bytes().to_vec();
        self.set_bytes(&bytes);
    }

    pub fn append(&self, text: &str) {
        self.append_bytes(text.as_bytes())
    }

    pub fn append_bytes(&self, bytes: &[u8]) {
        self.edit(|b| {
            b.reserve(b.bytes.len() + bytes.len());
            b.bytes.extend_from_slice(bytes);
        })
    }

    pub fn append_byte(&self, byte: u8) {
        self.append_bytes(&[byte])
    }

    pub fn prepend(&self, text: &str) {
        self.prepend_bytes(text.as_bytes())
    }

    pub fn prepend_bytes(&self, bytes: &[u8]) {
        self.edit(|b| {
            b.reserve(b.bytes.len() + bytes.len());
            b.bytes.splice(0..0, bytes.iter().copied());
        })
    }

    /// Keeps the first `n` bytes.
    pub fn keep_left(&self, n: usize) {
        self.edit(|b| b.bytes.truncate(n))
    }

    /// Keeps the last `n` bytes.
    pub fn keep_right(&self, n: usize) {
        self.edit(|b| {
            let len = b.bytes.len();
            if n < len {
                b.bytes.drain(..len - n);
            }
        })
    }

    /// Keeps `n` bytes from `start`; both are clamped to the string.
    pub fn keep_middle(&self, start: usize, n: usize) {
        self.edit(|b| {
            let len = b.bytes.len();
            let start = start.min(len);
            let end = start.saturating_add(n).min(len);
            b.bytes.truncate(end);
            b.bytes.drain(..start);
        })
    }

    pub fn left_bytes(&self, n: usize) -> Ref<'_, [u8]> {
        Ref::map(self.bytes(), |b| &b[..n.min(b.len())])
    }

    pub fn right_bytes(&self, n: usize) -> Ref<'_, [u8]> {
        Ref::map(self.bytes(), |b| &b[b.len() - n.min(b.len())..])
    }

    pub fn middle_bytes(&self, start: usize, n: usize) -> Ref<'_, [u8]> {
        Ref::map(self.bytes(), |b| {
            let start = start.min(b.len());
            let end = start.saturating_add(n).min(b.len());
            &b[start..end]
        })
    }

    pub fn equals(&self, text: &str) -> bool {
        *self.bytes() == *text.as_bytes()
    }

    pub fn starts_with(&self, text: &str) -> bool {
        self.bytes().starts_with(text.as_bytes())
    }

    pub fn ends_with(&self, text: &str) -> bool {
        self.bytes().ends_with(text.as_bytes())
    }

    pub fn contains(&self, text: &str) -> bool {
        let needle = text.as_bytes();
        if needle.is_empty() {
            return true;
        }
        self.bytes().windows(needle.len()).any(|w| w == needle)
    }

    /// Splits on `delim` into a new Array of Strings.
    pub fn split(&self, delim: &str) -> Result<ObjectRef> {
        if delim.is_empty() {
            return fail(RtError::bad_param("empty split delimiter"));
        }
        let bytes = self.bytes().to_vec();
        let delim = delim.as_bytes();
        let out = Array::create();
        let array = out.expect::<Array>()?;

        let mut start = 0;
        let mut i = 0;
        while i + delim.len() <= bytes.len() {
            if &bytes[i..i + delim.len()] == delim {
                array.push(&bytes_object(&bytes[start..i]));
                i += delim.len();
                start = i;
            } else {
                i += 1;
            }
        }
        array.push(&bytes_object(&bytes[start..]));
        Ok(out)
    }

    /// Appends every String of `array`, separated by `delim`.
    pub fn join(&self, delim: &str, array: &ObjectRef) -> Result<()> {
        let mut joined = Vec::new();
        for (i, e) in array.expect::<Array>()?.elements().iter().enumerate() {
            if i > 0 {
                joined.extend_from_slice(delim.as_bytes());
            }
            joined.extend_from_slice(&e.expect::<RtString>()?.bytes());
        }
        self.append_bytes(&joined);
        Ok(())
    }

    /// Appends formatted text. Gives up, leaving the string as it was, if the output
    /// would not fit the formatter's hard maximum.
    pub fn append_formatted(&self, args: fmt::Arguments<'_>) -> bool {
        let mut limit = {
            let b = self.buf.borrow();
            b.max_len - b.bytes.len()
        };
        let mut scratch = String::new();
        loop {
            scratch.clear();
            let mut out = Bounded {
                buf: &mut scratch,
                limit,
            };
            if out.write_fmt(args).is_ok() {
                self.append(&scratch);
                return true;
            }
            limit = if limit < FORMAT_FIRST_OVERFLOW {
                FORMAT_FIRST_OVERFLOW
            } else {
                limit * 2
            };
            if limit > FORMAT_HARD_MAX {
                log::debug!("formatted text exceeds {} bytes, dropped", FORMAT_HARD_MAX);
                return false;
            }
        }
    }

    /// Replaces the contents with formatted text.
    pub fn format(&self, args: fmt::Arguments<'_>) -> bool {
        let probe = RtString::default();
        if !probe.append_formatted(args) {
            return false;
        }
        self.copy(&probe);
        true
    }

    pub fn hash(&self) -> u32 {
        if let Some(h) = self.hash.get() {
            return h;
        }
        let mut hasher = FxHasher::default();
        hasher.write(&self.bytes());
        let full = hasher.finish();
        let h = (full ^ (full >> 32)) as u32;
        self.hash.set(Some(h));
        h
    }

    pub fn clear(&self) {
        self.edit(|b| b.bytes.clear())
    }

    pub fn duplicate(&self) -> ObjectRef {
        let s = RtString::default();
        s.copy(self);
        ObjectRef::wrap(Box::new(s))
    }
}

fn bytes_object(bytes: &[u8]) -> ObjectRef {
    let s = RtString::default();
    s.set_bytes(bytes);
    ObjectRef::wrap(Box::new(s))
}

struct Bounded<'a> {
    buf: &'a mut String,
    limit: usize,
}

impl fmt::Write for Bounded<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.len() + s.len() > self.limit {
            return Err(fmt::Error);
        }
        self.buf.push_str(s);
        Ok(())
    }
}

impl Object for RtString {
    fn class(&self) -> &'static ClassVocabulary {
        &STRING_CLASS
    }

    /// Byte-wise against other Strings; anything else falls back to address order.
    fn compare(&self, this: &ObjectRef, other: &ObjectRef) -> Result<Ordering> {
        match other.downcast::<RtString>() {
            Some(o) => Ok((*self.bytes()).cmp(&*o.bytes())),
            None => Ok(this.addr().cmp(&other.addr())),
        }
    }

    fn field(&self, index: usize) -> Option<Value> {
        match index {
            0 => Some(Value::Str(self.to_string_lossy())),
            _ => None,
        }
    }

    fn set_field(&self, index: usize, value: Value) -> Result<()> {
        match (index, value) {
            (0, Value::Str(s)) => {
                self.set(&s);
                Ok(())
            }
            (_, v) => fail(RtError::bad_param(format!(
                "String has no member {} taking {:?}",
                index, v
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::RtString;
    use crate::containers::Array;
    use kiln_types::layout::FORMAT_HARD_MAX;

    fn text(s: &RtString) -> String {
        s.to_string_lossy()
    }

    #[test]
    fn edits() {
        let o = RtString::with_text("middle");
        let s = o.expect::<RtString>().unwrap();
        s.prepend("<");
        s.append(">");
        s.append_byte(b'!');
        assert_eq!(text(s), "<middle>!");

        s.keep_left(7);
        assert_eq!(text(s), "<middle");
        s.keep_right(6);
        assert_eq!(text(s), "middle");
        s.keep_middle(1, 3);
        assert_eq!(text(s), "idd");
        s.keep_middle(10, 3);
        assert!(s.is_empty());
    }

    #[test]
    fn views() {
        let o = RtString::with_text("abcdef");
        let s = o.expect::<RtString>().unwrap();
        assert_eq!(&*s.left_bytes(2), b"ab");
        assert_eq!(&*s.right_bytes(10), b"abcdef");
        assert_eq!(&*s.middle_bytes(2, 2), b"cd");
        assert!(s.starts_with("abc"));
        assert!(s.ends_with("ef"));
        assert!(s.contains("cde"));
        assert!(!s.contains("x"));
        assert!(s.equals("abcdef"));
    }

    #[test]
    fn growth() {
        let o = RtString::create();
        let s = o.expect::<RtString>().unwrap();
        s.append("a");
        assert_eq!(s.max_len(), 16);
        s.append(&"b".repeat(16));
        assert_eq!(s.max_len(), 32);
        assert_eq!(s.len(), 17);
    }

    #[test]
    fn hash_invalidated() {
        let o = RtString::with_text("abc");
        let s = o.expect::<RtString>().unwrap();
        let h1 = s.hash();
        assert_eq!(s.hash(), h1);
        s.append("d");
        let other = RtString::with_text("abcd");
        assert_eq!(s.hash(), other.expect::<RtString>().unwrap().hash());
    }

    #[test]
    fn split_join() {
        let o = RtString::with_text("a,,b,c");
        let s = o.expect::<RtString>().unwrap();
        let parts = s.split(",").unwrap();
        let array = parts.expect::<Array>().unwrap();
        assert_eq!(array.count(), 4);
        assert!(s.split("").is_err());

        let joined = RtString::create();
        let j = joined.expect::<RtString>().unwrap();
        j.join("+", &parts).unwrap();
        assert_eq!(text(j), "a++b+c");
    }

    #[test]
    fn formatting() {
        let o = RtString::with_text("n=");
        let s = o.expect::<RtString>().unwrap();
        assert!(s.append_formatted(format_args!("{}/{:.2}", 42, 0.25)));
        assert_eq!(text(s), "n=42/0.25");

        let long = "x".repeat(1000);
        assert!(s.format(format_args!("{}", long)));
        assert_eq!(s.len(), 1000);

        let huge = "y".repeat(FORMAT_HARD_MAX + 1);
        assert!(!s.append_formatted(format_args!("{}", huge)));
        assert_eq!(s.len(), 1000);
    }

    #[test]
    fn compare_bytes() {
        let a = RtString::with_text("apple");
        let b = RtString::with_text("banana");
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);
        let a2 = RtString::with_text("apple");
        assert_eq!(a.compare(&a2).unwrap(), Ordering::Equal);
    }
}
