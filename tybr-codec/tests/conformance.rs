//! Byte-level conformance tests for the wire format
//!
//! These pin the header framing, tag placement, alignment padding, and the
//! reference wiring against literal byte expectations.

use std::rc::Rc;

use tybr_codec::value::{ObjectValue, Value, ViewKind};
use tybr_codec::{Codec, CodecOpts, Tag};
use tybr_test_utils::{arr, assert_graph_eq, num, obj, s};

const HEADER: [u8; 5] = [0x35, 0x52, 0x42, 0x54, 0x05];

fn encode(value: &Value) -> Vec<u8> {
    Codec::default().serialize(value).expect("serialize")
}

fn roundtrip(value: &Value) -> Value {
    let codec = Codec::default();
    let bytes = codec.serialize(value).expect("serialize");
    codec.deserialize(&bytes).expect("deserialize")
}

#[test]
fn s1_null_is_header_plus_one_tag_byte() {
    let bytes = encode(&Value::Null);
    assert_eq!(bytes[..5], HEADER);
    assert_eq!(bytes[5], 0x00);
    assert_eq!(bytes.len(), 6);
}

#[test]
fn s2_i16_payload_lands_on_an_even_offset() {
    let bytes = encode(&num(1000.0));
    assert_eq!(bytes[..5], HEADER);
    assert_eq!(bytes[5], Tag::I16 as u8);
    // Offset 6 is even already: no pad bytes
    assert_eq!(bytes[6..8], 1000i16.to_le_bytes());
    assert_eq!(bytes.len(), 8);
}

#[test]
fn s3_plain_object_keys_sort_ascending() {
    let bytes = encode(&obj(&[("b", num(1.0)), ("a", num(2.0))]));
    let expected = [
        Tag::ObjectLiteral as u8,
        2, // property count
        Tag::StrAsciiTiny as u8,
        1,
        b'a',
        Tag::I8 as u8,
        2,
        Tag::StrAsciiTiny as u8,
        1,
        b'b',
        Tag::I8 as u8,
        1,
    ];
    assert_eq!(&bytes[5..], &expected);
}

#[test]
fn s4_self_cycle_round_trips_with_identity() {
    let root = obj(&[]);
    if let Value::Object(rc) = &root {
        rc.borrow_mut().set("self", root.clone());
    }

    let bytes = encode(&root);
    // The back-edge is a CIRCULAR_REF to id 0
    assert_eq!(&bytes[bytes.len() - 2..], &[Tag::CircularRef as u8, 0]);

    let decoded = Codec::default().deserialize(&bytes).expect("deserialize");
    let inner = match &decoded {
        Value::Object(rc) => rc.borrow().get("self").expect("self property"),
        other => panic!("expected object, got {:?}", std::mem::discriminant(other)),
    };
    assert_eq!(decoded.heap_id(), inner.heap_id());
}

#[test]
fn s5_aliased_views_share_one_backing_store() {
    let store = match Value::buffer(vec![7u8; 32]) {
        Value::Buffer(rc) => rc,
        _ => unreachable!(),
    };
    let first = Value::view(ViewKind::U8, &store, 0, 16);
    let second = Value::view(ViewKind::U8, &store, 16, 16);
    let root = arr(vec![first, second]);

    let bytes = encode(&root);
    // Second view: tag, share flag 1, buffer id 0
    let needle = [Tag::TypedU8 as u8, 1, 0];
    assert!(bytes
        .windows(needle.len())
        .any(|window| window == needle.as_slice()));

    let decoded = roundtrip(&root);
    let views = match &decoded {
        Value::Array(rc) => rc.borrow().elements.clone(),
        _ => panic!("expected array"),
    };
    let (a, b) = match (&views[0], &views[1]) {
        (Some(Value::View(a)), Some(Value::View(b))) => (Rc::clone(a), Rc::clone(b)),
        _ => panic!("expected two views"),
    };
    assert!(Rc::ptr_eq(&a.buffer, &b.buffer));
    assert_eq!(a.buffer.borrow().bytes.len(), 32);
    assert_eq!(b.byte_offset, 16);
}

#[test]
fn s6_sixteen_small_integers_pack_as_i8() {
    let root = arr((1..=16).map(|i| num(i as f64)).collect());
    let bytes = encode(&root);
    assert_eq!(bytes[5], Tag::ArrayPackedI8 as u8);
    assert_eq!(bytes[6], 16); // length varint
    assert_eq!(&bytes[7..23], (1..=16u8).collect::<Vec<_>>().as_slice());
    // Post-header payload within 18 bytes
    assert!(bytes.len() - 5 <= 18);
}

#[test]
fn f64_payloads_are_eight_aligned() {
    let bytes = encode(&num(std::f64::consts::PI));
    assert_eq!(bytes[5], Tag::F64 as u8);
    assert_eq!(&bytes[6..8], &[0, 0]); // pad up to offset 8
    assert_eq!(bytes[8..16], std::f64::consts::PI.to_le_bytes());
}

#[test]
fn packed_f64_blocks_are_eight_aligned() {
    let root = arr((0..16).map(|_| num(std::f64::consts::PI)).collect());
    let bytes = encode(&root);
    assert_eq!(bytes[5], Tag::ArrayPackedF64 as u8);
    assert_eq!(bytes[6], 16);
    // Element block starts at the next multiple of 8
    assert_eq!(bytes[8..16], std::f64::consts::PI.to_le_bytes());
    assert_eq!(bytes.len(), 8 + 16 * 8);
}

#[test]
fn key_determinism_for_plain_objects() {
    let left = encode(&obj(&[("alpha", num(1.0)), ("beta", num(2.0))]));
    let right = encode(&obj(&[("beta", num(2.0)), ("alpha", num(1.0))]));
    assert_eq!(left, right);
}

#[test]
fn shared_substructure_round_trips_to_one_node() {
    let shared = arr(vec![num(1.0), num(2.0)]);
    let root = arr(vec![shared.clone(), shared]);

    let decoded = roundtrip(&root);
    let elements = match &decoded {
        Value::Array(rc) => rc.borrow().elements.clone(),
        _ => panic!("expected array"),
    };
    let a = elements[0].as_ref().expect("first");
    let b = elements[1].as_ref().expect("second");
    assert_eq!(a.heap_id(), b.heap_id());
}

#[test]
fn decode_is_idempotent_across_calls() {
    let codec = Codec::default();
    let root = obj(&[("list", arr(vec![num(1.0), s("entry")]))]);
    let bytes = codec.serialize(&root).expect("serialize");

    let first = codec.deserialize(&bytes).expect("first");
    let second = codec.deserialize(&bytes).expect("second");
    assert_graph_eq(&first, &second);
    assert_ne!(first.heap_id(), second.heap_id());
}

#[test]
fn packing_scenarios_from_the_analyzer() {
    let ints = arr((1..=16).map(|i| num(i as f64)).collect());
    assert_eq!(encode(&ints)[5], Tag::ArrayPackedI8 as u8);

    let mut halves: Vec<Value> = (1..=16).map(|i| num(i as f64)).collect();
    halves[0] = num(0.5);
    assert_eq!(encode(&arr(halves))[5], Tag::ArrayPackedF32 as u8);

    let mut pies: Vec<Value> = (1..=16).map(|i| num(i as f64)).collect();
    pies[0] = num(std::f64::consts::PI);
    assert_eq!(encode(&arr(pies))[5], Tag::ArrayPackedF64 as u8);
}

#[test]
fn every_configuration_decodes_with_one_decoder() {
    let shared = arr(vec![num(1.0)]);
    let root = arr(vec![shared.clone(), shared, s("shared-string-content"), s("shared-string-content")]);

    for dedup in [true, false] {
        for share in [true, false] {
            for packed in [true, false] {
                for circular in [true, false] {
                    let opts = CodecOpts {
                        deduplication: dedup,
                        share_array_buffers: share,
                        packed_arrays: packed,
                        detect_circular: circular,
                        ..CodecOpts::default()
                    };
                    let bytes = Codec::new(opts).serialize(&root).expect("serialize");
                    let decoded = Codec::default().deserialize(&bytes).expect("deserialize");
                    assert_graph_eq(&root, &decoded);
                }
            }
        }
    }
}

#[test]
fn constructor_objects_keep_their_name() {
    let mut shaped = ObjectValue::default();
    shaped.prototype = tybr_codec::value::Prototype::Constructor("Point".into());
    shaped.set("x", num(3.0));
    let decoded = roundtrip(&Value::object(shaped));
    match decoded {
        Value::Object(rc) => {
            let obj = rc.borrow();
            assert_eq!(
                obj.prototype,
                tybr_codec::value::Prototype::Constructor("Point".into())
            );
            assert!(obj.get("x").is_some());
        }
        _ => panic!("expected object"),
    }
}
