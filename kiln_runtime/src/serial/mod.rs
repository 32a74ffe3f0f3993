//! Textual form of object graphs.
//!
//! Objects are JSON-like `{ }` blocks whose first field is `"__id": "Class_N"`. A repeated
//! object is written as its quoted id, and a null object as `{}`.

mod reader;
mod writer;

pub use self::reader::Reader;
pub use self::writer::Writer;

use crate::error::Result;
use crate::object::ObjectRef;

/// Writes the graph reachable from `root` into a string.
pub fn to_text(root: &ObjectRef) -> Result<String> {
    let mut out = Vec::new();
    Writer::new(&mut out).write(root)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Reads one graph from `text`.
pub fn from_text(text: &str) -> Result<ObjectRef> {
    Reader::new(text.as_bytes()).read()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use kiln_types::{ErrorKind, TypeCode};

    use super::{from_text, to_text};
    use crate::alloc;
    use crate::class::{register_class, ClassBuilder};
    use crate::containers::{
        Array, Bag, DoubleArray, LongDoubleMap, Map, Pair, RtString, StringMap, StructArray,
        STRING_CLASS,
    };
    use crate::error::{set_reporter, RecordingReporter, RtError};
    use crate::instance::Instance;
    use crate::value::Value;

    fn text_of(obj: &crate::object::ObjectRef) -> String {
        obj.expect::<RtString>().unwrap().to_string_lossy()
    }

    #[test]
    fn instance_members() {
        let class = ClassBuilder::instance("SerialPoint")
            .member("x", TypeCode::INT)
            .member("scale", TypeCode::DOUBLE)
            .string_member("tag", 8)
            .array_member("ids", TypeCode::LONG, 3)
            .member("next", TypeCode::OBJECT)
            .register();
        let p = crate::alloc::create(class).unwrap();
        let point = p.expect::<Instance>().unwrap();
        point.set("x", -7).unwrap();
        point.set("scale", 0.5).unwrap();
        point.set("tag", "abc").unwrap();
        point
            .set("ids", Value::Array(vec![Value::Long(1), Value::Long(2)]))
            .unwrap();
        point.set("next", p.clone()).unwrap();

        let text = to_text(&p).unwrap();
        let back = from_text(&text).unwrap();
        let copy = back.expect::<Instance>().unwrap();
        assert_eq!(copy.get("x").unwrap(), Value::Int(-7));
        assert_eq!(copy.get("scale").unwrap(), Value::Double(0.5));
        assert_eq!(copy.get("tag").unwrap(), Value::Str("abc".into()));
        assert_eq!(
            copy.get("ids").unwrap(),
            Value::Array(vec![Value::Long(1), Value::Long(2)])
        );
        // self-reference comes back as the same instance
        assert!(copy.get("next").unwrap().as_object().unwrap().same(&back));
        assert_eq!(back.ref_count(), 1);
    }

    #[test]
    fn containers_round_trip() {
        let bag = Bag::create();
        let b = bag.expect::<Bag>().unwrap();
        let s = RtString::with_text("shared");
        b.push(10, &s);
        b.push(-3, &s);

        let sm = StringMap::create();
        sm.expect::<StringMap>().unwrap().set("k \"q\"".into(), bag.clone()).unwrap();

        let back = from_text(&to_text(&sm).unwrap()).unwrap();
        let map = back.expect::<StringMap>().unwrap();
        let bag2 = map.grab(&"k \"q\"".to_owned()).unwrap().unwrap();
        let entries = bag2.expect::<Bag>().unwrap().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag, 10);
        assert_eq!(entries[1].tag, -3);
        assert!(entries[0].value.same(&entries[1].value));
        assert_eq!(text_of(&entries[0].value), "shared");
    }

    #[test]
    fn object_keys_and_scalars() {
        let m = Map::create();
        let map = m.expect::<Map>().unwrap();
        let v = RtString::with_text("v");
        map.set(RtString::with_text("b"), v.clone()).unwrap();
        map.set(RtString::with_text("a"), v.clone()).unwrap();

        let back = from_text(&to_text(&m).unwrap()).unwrap();
        let copy = back.expect::<Map>().unwrap();
        let keys: Vec<String> = copy.keys().iter().map(text_of).collect();
        assert_eq!(keys, vec!["a", "b"]);
        let pairs = copy.pairs();
        assert!(pairs[0].1.same(&pairs[1].1));

        let d = LongDoubleMap::create();
        d.expect::<LongDoubleMap>().unwrap().set(-5, 2.25).unwrap();
        let back = from_text(&to_text(&d).unwrap()).unwrap();
        assert_eq!(back.expect::<LongDoubleMap>().unwrap().pairs(), vec![(-5, 2.25)]);
    }

    #[test]
    fn struct_array() {
        let record = register_class(
            ClassBuilder::new("SerialRecord")
                .member("n", TypeCode::INT)
                .string_member("name", 6)
                .build(),
        );
        let a = StructArray::create();
        let array = a.expect::<StructArray>().unwrap();
        array.set_type(record).unwrap();
        array
            .push(vec![Value::Int(4), Value::Str("four".into())])
            .unwrap();

        let text = to_text(&a).unwrap();
        assert!(text.contains("\"record\": \"SerialRecord\""));
        let back = from_text(&text).unwrap();
        let copy = back.expect::<StructArray>().unwrap();
        assert_eq!(copy.record_type().map(|r| r.name()), Some("SerialRecord"));
        assert_eq!(copy.get(0).unwrap(), vec![Value::Int(4), Value::Str("four".into())]);
    }

    #[test]
    fn commas_optional() {
        let back = from_text(
            r#"{ "__id": "Array_7" "elements": [ { "__id": "String_1" "value": "x" } "String_1" ] }"#,
        )
        .unwrap();
        let array = back.expect::<Array>().unwrap();
        assert_eq!(array.count(), 2);
        assert!(array.get(0).unwrap().same(&array.get(1).unwrap()));
    }

    #[test]
    fn errors_carry_position() {
        let rec = RecordingReporter::new();
        let prev = set_reporter(Rc::new(rec.clone()));

        let err = from_text("{\n  \"__id\": \"Array_1\",\n  \"elements\": [ \"Nope_3\" ]\n}").unwrap_err();
        match err {
            RtError::Parse(e) => {
                assert_eq!(e.line, 3);
                assert!(e.message.contains("unresolved link Nope_3"));
            }
            e => panic!("unexpected {:?}", e),
        }
        assert!(from_text(r#"{ "value": "x" }"#).is_err());
        assert!(from_text(r#"{ "__id": "NoSuchClass_1" }"#).is_err());
        assert!(from_text(r#"{ "__id": "Array_1", "bogus": 1 }"#).is_err());
        assert!(from_text(r#"{ "__id": "ArrayIterator_1" }"#).is_err());
        assert!(from_text(r#"{ "__id": "String_1", "value": "a\qb" }"#).is_err());
        assert!(from_text(r#"{ "__id": "IntArray_1", "elements": [ 1E2 ] }"#).is_err());
        let ok = from_text(r#"{ "__id": "DoubleArray_1", "elements": [ -1.5e-2 ] }"#).unwrap();
        assert_eq!(ok.expect::<DoubleArray>().unwrap().elements(), vec![-0.015]);
        assert_eq!(rec.kinds()[0], ErrorKind::Parse);

        set_reporter(prev);
    }

    #[test]
    fn overrun_is_an_error() {
        ClassBuilder::instance("SerialSmall")
            .array_member("v", TypeCode::INT, 2)
            .string_member("s", 3)
            .register();
        assert!(from_text(r#"{ "__id": "SerialSmall_1", "v": [1, 2] }"#).is_ok());
        assert!(from_text(r#"{ "__id": "SerialSmall_1", "v": [1, 2, 3] }"#).is_err());
        assert!(from_text(r#"{ "__id": "SerialSmall_1", "s": "abc" }"#).is_err());
        assert!(from_text(r#"{ "__id": "SerialSmall_1", "v": [300000000000] }"#).is_err());
    }

    #[test]
    fn overwritten_objects_are_deleted() {
        let before = alloc::class_stats(&STRING_CLASS);
        let back = from_text(
            r#"{ "__id": "Pair_1",
                 "a": { "__id": "String_2", "value": "x" },
                 "a": { "__id": "String_3", "value": "y" } }"#,
        )
        .unwrap();
        let mid = alloc::class_stats(&STRING_CLASS);
        assert_eq!(mid.allocated, before.allocated + 2);
        assert_eq!(mid.deleted, before.deleted + 1);
        assert_eq!(text_of(&back.expect::<Pair>().unwrap().get_a()), "y");

        back.keep();
        back.release();
        assert_eq!(alloc::class_stats(&STRING_CLASS).live(), before.live());

        // the dropped object links back to the root, which must survive
        let back = from_text(
            r#"{ "__id": "Pair_1", "a": { "__id": "Pair_2", "a": "Pair_1" }, "a": {} }"#,
        )
        .unwrap();
        assert!(!back.is_deleted());
        assert_eq!(back.ref_count(), 0);
        assert!(back.expect::<Pair>().unwrap().get_a().is_null());
    }
}
