//! Shared test helpers for the TYBR codec
//!
//! The centerpiece is [`graph_eq`], a cycle-aware structural equivalence
//! over value graphs: it walks both graphs in lockstep and treats an
//! already-visited pair of heap nodes as equal, so cyclic and shared
//! structure compares without diverging.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashSet;
use std::rc::Rc;

use tybr_codec::value::{ObjectValue, PropertyKey, PropertySlot, Value};

/// Pointers of both sides of a heap comparison
type Pair = (usize, usize);

fn rc_addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

fn number_eq(a: f64, b: f64) -> bool {
    // NaN payload bits are not preserved; every NaN compares equal.
    // Everything else compares by bit pattern, which keeps -0.0 distinct.
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

fn key_eq(a: &PropertyKey, b: &PropertyKey) -> bool {
    match (a, b) {
        (PropertyKey::String(x), PropertyKey::String(y)) => x == y,
        (PropertyKey::Symbol(x), PropertyKey::Symbol(y)) => x == y,
        _ => false,
    }
}

fn object_eq(a: &ObjectValue, b: &ObjectValue, seen: &mut HashSet<Pair>) -> bool {
    if a.prototype != b.prototype || a.properties.len() != b.properties.len() {
        return false;
    }
    // Plain bodies are key-sorted on the wire, so property order is not
    // significant; match up properties by key instead.
    a.properties.iter().all(|(key, prop)| {
        b.properties
            .iter()
            .find(|(other_key, _)| key_eq(key, other_key))
            .is_some_and(|(_, other_prop)| {
                prop.enumerable == other_prop.enumerable
                    && prop.writable == other_prop.writable
                    && prop.configurable == other_prop.configurable
                    && slot_eq(&prop.slot, &other_prop.slot, seen)
            })
    })
}

fn slot_eq(a: &PropertySlot, b: &PropertySlot, seen: &mut HashSet<Pair>) -> bool {
    match (a, b) {
        (PropertySlot::Data(x), PropertySlot::Data(y)) => values_eq(x, y, seen),
        (
            PropertySlot::Accessor {
                getter: ga,
                setter: sa,
            },
            PropertySlot::Accessor {
                getter: gb,
                setter: sb,
            },
        ) => option_eq(ga.as_ref(), gb.as_ref(), seen) && option_eq(sa.as_ref(), sb.as_ref(), seen),
        _ => false,
    }
}

fn option_eq(a: Option<&Value>, b: Option<&Value>, seen: &mut HashSet<Pair>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => values_eq(x, y, seen),
        _ => false,
    }
}

fn values_eq(a: &Value, b: &Value, seen: &mut HashSet<Pair>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => number_eq(*x, *y),
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if !seen.insert((rc_addr(x), rc_addr(y))) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.elements.len() == y.elements.len()
                && x.elements
                    .iter()
                    .zip(y.elements.iter())
                    .all(|(ea, eb)| option_eq(ea.as_ref(), eb.as_ref(), seen))
        }
        (Value::Object(x), Value::Object(y)) => {
            if !seen.insert((rc_addr(x), rc_addr(y))) {
                return true;
            }
            object_eq(&x.borrow(), &y.borrow(), seen)
        }
        (Value::Map(x), Value::Map(y)) => {
            if !seen.insert((rc_addr(x), rc_addr(y))) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.entries.len() == y.entries.len()
                && x.entries.iter().zip(y.entries.iter()).all(|((ka, va), (kb, vb))| {
                    values_eq(ka, kb, seen) && values_eq(va, vb, seen)
                })
        }
        (Value::Set(x), Value::Set(y)) => {
            if !seen.insert((rc_addr(x), rc_addr(y))) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.entries.len() == y.entries.len()
                && x.entries
                    .iter()
                    .zip(y.entries.iter())
                    .all(|(ea, eb)| values_eq(ea, eb, seen))
        }
        (Value::Date(x), Value::Date(y)) => number_eq(x.epoch_ms, y.epoch_ms),
        (Value::RegExp(x), Value::RegExp(y)) => x == y,
        (Value::Error(x), Value::Error(y)) => {
            if !seen.insert((rc_addr(x), rc_addr(y))) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.kind == y.kind
                && x.message == y.message
                && x.stack == y.stack
                && x.errors.len() == y.errors.len()
                && x.errors
                    .iter()
                    .zip(y.errors.iter())
                    .all(|(ea, eb)| values_eq(ea, eb, seen))
        }
        (Value::Buffer(x), Value::Buffer(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.shared == y.shared && x.bytes == y.bytes
        }
        (Value::View(x), Value::View(y)) => {
            // Views compare by shape and visible bytes; the stores behind
            // them may differ in total size.
            x.kind == y.kind
                && x.byte_offset == y.byte_offset
                && x.length == y.length
                && view_bytes(x) == view_bytes(y)
        }
        (Value::Blob(_), Value::Blob(_)) | (Value::File(_), Value::File(_)) => true,
        _ => false,
    }
}

fn view_bytes(v: &tybr_codec::value::ViewValue) -> Vec<u8> {
    let store = v.buffer.borrow();
    let end = (v.byte_offset + v.byte_length()).min(store.bytes.len());
    store.bytes[v.byte_offset.min(end)..end].to_vec()
}

/// Cycle-aware structural equivalence of two value graphs
pub fn graph_eq(a: &Value, b: &Value) -> bool {
    let mut seen = HashSet::new();
    values_eq(a, b, &mut seen)
}

/// Assert that two graphs are structurally equivalent
pub fn assert_graph_eq(a: &Value, b: &Value) {
    assert!(graph_eq(a, b), "value graphs are not equivalent");
}

/// Shorthand builder for a number value
pub fn num(x: f64) -> Value {
    Value::Number(x)
}

/// Shorthand builder for a string value
pub fn s(text: &str) -> Value {
    Value::string(text)
}

/// Shorthand builder for a dense array
pub fn arr(elements: Vec<Value>) -> Value {
    Value::array(elements)
}

/// Shorthand builder for a plain object from key/value pairs
pub fn obj(entries: &[(&str, Value)]) -> Value {
    let mut object = ObjectValue::default();
    for (key, value) in entries {
        object.set(key, value.clone());
    }
    Value::object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_order_is_not_significant() {
        let a = obj(&[("x", num(1.0)), ("y", num(2.0))]);
        let b = obj(&[("y", num(2.0)), ("x", num(1.0))]);
        assert_graph_eq(&a, &b);
    }

    #[test]
    fn cycles_compare_without_diverging() {
        let make = || {
            let v = obj(&[]);
            if let Value::Object(rc) = &v {
                rc.borrow_mut().set("me", v.clone());
            }
            v
        };
        assert_graph_eq(&make(), &make());
    }

    #[test]
    fn negative_zero_is_distinct_from_zero() {
        assert!(!graph_eq(&num(0.0), &num(-0.0)));
        assert!(graph_eq(&num(f64::NAN), &num(f64::NAN)));
    }

    #[test]
    fn unequal_graphs_are_rejected() {
        assert!(!graph_eq(&num(1.0), &num(2.0)));
        assert!(!graph_eq(&arr(vec![num(1.0)]), &arr(vec![])));
        assert!(!graph_eq(&s("a"), &Value::Null));
    }
}
