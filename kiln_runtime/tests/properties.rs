//! Whole-runtime properties: reference counting, container bounds, the iterator protocol,
//! map uniqueness, sorting and graph round trips.

use std::collections::BTreeMap;

use kiln_runtime::alloc;
use kiln_runtime::containers::{
    Array, Bag, IntMap, List, LongArray, Pair, RtString, STRING_CLASS,
};
use kiln_runtime::serial::{from_text, to_text};
use kiln_runtime::{ObjectRef, Value};
use kiln_types::ErrorKind;

fn string(text: &str) -> ObjectRef {
    RtString::with_text(text)
}

fn text(obj: &ObjectRef) -> String {
    obj.expect::<RtString>().unwrap().to_string_lossy()
}

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

// =============================================================================
// Reference counting
// =============================================================================

#[test]
fn push_pop_delete_scenario() {
    let a = Array::create();
    a.keep();
    let array = a.expect::<Array>().unwrap();
    let (x, y, z) = (string("x"), string("y"), string("z"));
    for o in [&x, &y, &z] {
        assert_eq!(o.ref_count(), 0);
        array.push(o);
    }
    for o in [&x, &y, &z] {
        assert_eq!(o.ref_count(), 1);
    }
    assert_eq!(array.count(), 3);

    let popped = array.pop().unwrap();
    assert!(popped.same(&z));
    assert_eq!(z.ref_count(), 0);
    assert!(!z.is_deleted());
    assert_eq!(array.count(), 2);

    a.release();
    assert!(a.is_deleted());
    assert_eq!(x.ref_count(), 0);
    assert_eq!(y.ref_count(), 0);
    assert!(x.is_deleted() && y.is_deleted());
    assert!(!z.is_deleted());
}

#[test]
fn deleted_exactly_when_balanced() {
    let mut rng = Lcg(7);
    for _ in 0..50 {
        let before = alloc::class_stats(&STRING_CLASS);
        let s = string("counted");
        let mut count = 0u32;
        let mut kept = 0u32;
        // random walk of keeps and releases that never goes below one until the end
        for _ in 0..40 {
            if count > 1 && rng.next(2) == 0 {
                s.release();
                count -= 1;
            } else {
                s.keep();
                count += 1;
                kept += 1;
            }
            assert!(!s.is_deleted());
            assert_eq!(s.ref_count(), count);
        }
        while count > 0 {
            assert!(!s.is_deleted());
            s.release();
            count -= 1;
        }
        assert!(kept > 0);
        assert!(s.is_deleted());
        let after = alloc::class_stats(&STRING_CLASS);
        assert_eq!(after.deleted, before.deleted + 1);
    }
}

// =============================================================================
// Bounds
// =============================================================================

#[test]
fn array_bounds_leave_state_alone() {
    let a = Array::create();
    let array = a.expect::<Array>().unwrap();
    let items = [string("a"), string("b"), string("c")];
    for s in &items {
        array.push(s);
    }
    let n = array.count();
    let extra = string("extra");

    for i in 0..n + 3 {
        let before = array.elements();
        let in_range = i < n;
        assert_eq!(array.get(i).is_ok(), in_range);
        assert_eq!(array.slot(i).is_ok(), in_range);
        assert_eq!(array.swap(i, 0).is_ok(), in_range);
        if !in_range {
            assert_eq!(array.set(i, &extra).unwrap_err().kind(), ErrorKind::BadIndex);
            assert!(array.remove(i).is_err());
            assert_eq!(array.insert(i, &extra).is_ok(), i == n);
            if i == n {
                array.remove(n).unwrap();
            }
            assert_eq!(array.elements(), before);
        } else {
            array.swap(i, 0).unwrap();
        }
    }
    assert_eq!(extra.ref_count(), 0);
    assert!(extra.is_deleted());
}

// =============================================================================
// Iterator protocol
// =============================================================================

fn forward(container: &ObjectRef) -> Vec<Value> {
    let it = container.head_iter().unwrap();
    let ops = it.iter_ops().unwrap();
    let mut out = Vec::new();
    while let Some(v) = ops.next() {
        out.push(v);
    }
    out
}

fn backward(container: &ObjectRef) -> Vec<Value> {
    let it = container.head_iter().unwrap();
    let ops = it.iter_ops().unwrap();
    ops.seek_tail();
    let mut out = Vec::new();
    while let Some(v) = ops.prev() {
        out.push(v);
    }
    out.reverse();
    out
}

fn check_protocol(container: &ObjectRef, expected: usize) {
    let fwd = forward(container);
    assert_eq!(fwd.len(), expected);
    assert_eq!(backward(container), fwd);

    let it = container.head_iter().unwrap();
    let ops = it.iter_ops().unwrap();
    let first = ops.current();
    assert_eq!(ops.current(), first);
    assert_eq!(ops.next(), first);
}

#[test]
fn iterator_protocol_everywhere() {
    let items = [string("p"), string("q"), string("r")];

    let array = Array::with_elements(&items);
    check_protocol(&array, 3);

    let list = List::create();
    for s in &items {
        list.expect::<List>().unwrap().add_tail(s);
    }
    check_protocol(&list, 3);

    let bag = Bag::create();
    for (i, s) in items.iter().enumerate() {
        bag.expect::<Bag>().unwrap().push(i as i64 * 10, s);
    }
    check_protocol(&bag, 3);

    let pair = Pair::create();
    pair.expect::<Pair>().unwrap().set_b(&items[0]);
    check_protocol(&pair, 2);

    let map = IntMap::create();
    for (i, s) in items.iter().enumerate() {
        map.expect::<IntMap>().unwrap().set(3 - i as i32, s.clone()).unwrap();
    }
    check_protocol(&map, 3);
    assert_eq!(forward(&map)[0], Value::Object(items[2].clone()));

    let longs = LongArray::with_elements(&[5, -1, 9]);
    check_protocol(&longs, 3);
}

#[test]
fn list_iterator_remove_advances() {
    let l = List::create();
    let list = l.expect::<List>().unwrap();
    let items = [string("1"), string("2"), string("3")];
    for s in &items {
        list.add_tail(s);
    }
    let it = l.head_iter().unwrap();
    let ops = it.iter_ops().unwrap();
    ops.seek_next();
    assert!(ops.remove().unwrap());
    assert!(items[1].is_deleted());
    assert_eq!(ops.current(), Some(Value::Object(items[2].clone())));
    let names: Vec<String> = list.values().iter().map(text).collect();
    assert_eq!(names, vec!["1", "3"]);
}

// =============================================================================
// Maps
// =============================================================================

#[test]
fn map_holds_distinct_live_keys() {
    let mut rng = Lcg(42);
    let m = IntMap::create();
    let map = m.expect::<IntMap>().unwrap();
    let values = [string("v0"), string("v1"), string("v2")];
    let mut model: BTreeMap<i32, usize> = BTreeMap::new();

    for _ in 0..300 {
        let key = rng.next(20) as i32 - 10;
        let pick = rng.next(4) as usize;
        if pick == 3 {
            map.set(key, ObjectRef::null()).unwrap();
            model.remove(&key);
        } else {
            map.set(key, values[pick].clone()).unwrap();
            model.insert(key, pick);
        }
        assert_eq!(map.count(), model.len());
    }

    assert_eq!(map.keys(), model.keys().copied().collect::<Vec<_>>());
    for (key, pick) in &model {
        assert!(map.grab(key).unwrap().unwrap().same(&values[*pick]));
    }
    for (i, v) in values.iter().enumerate() {
        let holders = model.values().filter(|p| **p == i).count() as u32;
        assert_eq!(v.ref_count(), holders);
    }
}

// =============================================================================
// Sorting
// =============================================================================

fn sorted_check(texts: &[&str]) {
    let a = Array::create();
    let array = a.expect::<Array>().unwrap();
    for t in texts {
        array.push(&string(t));
    }
    let mut before: Vec<usize> = array.elements().iter().map(|e| e.addr()).collect();
    array.sort().unwrap();
    let after = array.elements();

    for pair in after.windows(2) {
        assert_ne!(pair[0].compare(&pair[1]).unwrap(), std::cmp::Ordering::Greater);
    }
    let mut ids: Vec<usize> = after.iter().map(|e| e.addr()).collect();
    before.sort_unstable();
    ids.sort_unstable();
    assert_eq!(ids, before);
}

#[test]
fn quicksort_permutes_into_order() {
    sorted_check(&[]);
    sorted_check(&["only"]);
    sorted_check(&["b", "a", "b", "a", "b"]);
    sorted_check(&["same", "same", "same"]);

    let mut rng = Lcg(3);
    let words: Vec<String> = (0..200).map(|_| format!("w{}", rng.next(50))).collect();
    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
    sorted_check(&refs);

    let ascending: Vec<String> = (0..500).map(|i| format!("{:04}", i)).collect();
    let refs: Vec<&str> = ascending.iter().map(String::as_str).collect();
    sorted_check(&refs);
}

// =============================================================================
// Graph round trips
// =============================================================================

#[test]
fn strings_survive_round_trip() {
    for s in ["", "plain", "with spaces and 123", "{braces} [brackets], commas: yes", "__id"] {
        let p = Pair::create();
        p.expect::<Pair>().unwrap().set_a(&string(s));
        let back = from_text(&to_text(&p).unwrap()).unwrap();
        assert_eq!(text(&back.expect::<Pair>().unwrap().get_a()), s);
    }
}

#[test]
fn shared_object_read_back_once() {
    let shared = string("A");
    let array = Array::with_elements(&[shared.clone()]);
    let list = List::create();
    list.expect::<List>().unwrap().add_tail(&shared);
    let root = Pair::create();
    let pair = root.expect::<Pair>().unwrap();
    pair.set_a(&array);
    pair.set_b(&list);

    let text_form = to_text(&root).unwrap();
    assert_eq!(text_form.matches("\"value\": \"A\"").count(), 1);

    let before = alloc::class_stats(&STRING_CLASS);
    let back = from_text(&text_form).unwrap();
    assert_eq!(alloc::class_stats(&STRING_CLASS).allocated, before.allocated + 1);

    let back_pair = back.expect::<Pair>().unwrap();
    let from_array = back_pair.get_a().expect::<Array>().unwrap().get(0).unwrap();
    let from_list = back_pair.get_b().expect::<List>().unwrap().head().unwrap();
    assert!(from_array.same(&from_list));
    assert!(!from_array.same(&shared));
    assert_eq!(from_array.ref_count(), 2);
    assert_eq!(back.ref_count(), 0);
}
