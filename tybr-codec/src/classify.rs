//! The type-classification front end
//!
//! Maps a runtime value to the narrowest wire tag. Pure inspection; the
//! writer driver consults the reference tracker separately before asking
//! for a tag.

use num_bigint::{BigUint, Sign};
use tybr_format::constants::{STR_SHORT_LIMIT, STR_TINY_LIMIT};
use tybr_format::Tag;

use crate::analyze::{analyze_numeric, PackedClass};
use crate::value::{
    ArrayValue, ErrorKind, ObjectValue, PropertySlot, Prototype, SymbolValue, Value, ViewKind,
};
use crate::CodecOpts;

fn exact_f32(x: f64) -> bool {
    (x as f32) as f64 == x
}

/// Tag for an IEEE 754 number, by bit inspection
pub fn classify_number(x: f64) -> Tag {
    if x.is_nan() {
        Tag::Nan
    } else if x == f64::INFINITY {
        Tag::PosInfinity
    } else if x == f64::NEG_INFINITY {
        Tag::NegInfinity
    } else if x == 0.0 && x.is_sign_negative() {
        Tag::NegZero
    } else if x.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&x) {
        if (i8::MIN as f64..=i8::MAX as f64).contains(&x) {
            Tag::I8
        } else if (i16::MIN as f64..=i16::MAX as f64).contains(&x) {
            Tag::I16
        } else {
            Tag::I32
        }
    } else if x.fract() == 0.0 && x > i32::MAX as f64 && x <= u32::MAX as f64 {
        Tag::U32
    } else if exact_f32(x) {
        Tag::F32
    } else {
        Tag::F64
    }
}

/// True when the magnitude fits the signed-64 wire slot for `sign`
pub fn bigint_fits_small(sign: Sign, magnitude: &BigUint) -> bool {
    match sign {
        // i64::MIN's magnitude is one past i64::MAX's
        Sign::Minus => magnitude.bits() <= 63 || *magnitude == BigUint::from(1u8) << 63u32,
        _ => magnitude.bits() <= 63,
    }
}

/// Tag for a string: ASCII vs UTF-8, width by byte length
pub fn classify_string(s: &str) -> Tag {
    if s.is_empty() {
        return Tag::StrEmpty;
    }
    let len = s.len();
    if s.is_ascii() {
        if len < STR_TINY_LIMIT {
            Tag::StrAsciiTiny
        } else if len < STR_SHORT_LIMIT {
            Tag::StrAsciiShort
        } else {
            Tag::StrAsciiLong
        }
    } else if len < STR_TINY_LIMIT {
        Tag::StrUtf8Tiny
    } else if len < STR_SHORT_LIMIT {
        Tag::StrUtf8Short
    } else {
        Tag::StrUtf8Long
    }
}

fn classify_array(arr: &ArrayValue, opts: &CodecOpts) -> Tag {
    if arr.is_empty() {
        return Tag::ArrayEmpty;
    }
    let len = arr.len();
    let filled = arr.filled_count();
    if filled < len || filled < (3 * len).div_ceil(4) {
        return Tag::ArraySparse;
    }
    if opts.packed_arrays {
        match analyze_numeric(&arr.elements) {
            PackedClass::Dense => Tag::ArrayDense,
            PackedClass::I8 => Tag::ArrayPackedI8,
            PackedClass::I16 => Tag::ArrayPackedI16,
            PackedClass::I32 => Tag::ArrayPackedI32,
            PackedClass::F32 => Tag::ArrayPackedF32,
            PackedClass::F64 => Tag::ArrayPackedF64,
        }
    } else {
        Tag::ArrayDense
    }
}

fn classify_plain_object(obj: &ObjectValue, opts: &CodecOpts) -> Tag {
    if opts.preserve_descriptors
        && obj.properties.iter().any(|(_, p)| !p.is_default_data())
    {
        return Tag::ObjectWithDescriptors;
    }
    let has_methods = obj.properties.iter().any(|(_, p)| match &p.slot {
        PropertySlot::Data(v) => v.is_callable(),
        PropertySlot::Accessor { .. } => false,
    });
    if has_methods {
        Tag::ObjectWithMethods
    } else if obj.properties.is_empty() {
        Tag::ObjectEmpty
    } else if obj.prototype == Prototype::Default {
        Tag::ObjectLiteral
    } else {
        Tag::ObjectConstructor
    }
}

/// Tag for a typed-array / data-view kind
pub fn view_tag(kind: ViewKind) -> Tag {
    match kind {
        ViewKind::U8 => Tag::TypedU8,
        ViewKind::I8 => Tag::TypedI8,
        ViewKind::U8Clamped => Tag::TypedU8Clamped,
        ViewKind::U16 => Tag::TypedU16,
        ViewKind::I16 => Tag::TypedI16,
        ViewKind::U32 => Tag::TypedU32,
        ViewKind::I32 => Tag::TypedI32,
        ViewKind::F32 => Tag::TypedF32,
        ViewKind::F64 => Tag::TypedF64,
        ViewKind::I64 => Tag::TypedI64,
        ViewKind::U64 => Tag::TypedU64,
        ViewKind::DataView => Tag::DataView,
    }
}

/// Tag for an error kind
pub fn error_tag(kind: &ErrorKind) -> Tag {
    match kind {
        ErrorKind::Error => Tag::Error,
        ErrorKind::Eval => Tag::EvalError,
        ErrorKind::Range => Tag::RangeError,
        ErrorKind::Reference => Tag::ReferenceError,
        ErrorKind::Syntax => Tag::SyntaxError,
        ErrorKind::Type => Tag::TypeError,
        ErrorKind::Uri => Tag::UriError,
        ErrorKind::Aggregate => Tag::AggregateError,
        ErrorKind::Custom(_) => Tag::CustomError,
    }
}

/// Map a runtime value to its wire tag
pub fn classify(value: &Value, opts: &CodecOpts) -> Tag {
    match value {
        Value::Undefined => Tag::Undefined,
        Value::Null => Tag::Null,
        Value::Bool(false) => Tag::False,
        Value::Bool(true) => Tag::True,
        Value::Number(x) => classify_number(*x),
        Value::BigInt(b) => {
            let sign = b.sign();
            let small = bigint_fits_small(sign, b.magnitude());
            match (sign, small) {
                (Sign::Minus, true) => Tag::BigIntNegSmall,
                (Sign::Minus, false) => Tag::BigIntNegLarge,
                (_, true) => Tag::BigIntPosSmall,
                (_, false) => Tag::BigIntPosLarge,
            }
        }
        Value::String(s) => classify_string(s),
        Value::Symbol(sym) => match sym.as_ref() {
            SymbolValue::Described(_) => Tag::Symbol,
            SymbolValue::Global(_) => Tag::SymbolGlobal,
            SymbolValue::WellKnown(_) => Tag::SymbolWellKnown,
            SymbolValue::Anonymous => Tag::SymbolNoDesc,
        },
        // Callables are not serialized outside the method-object path
        Value::Function(_) => Tag::Undefined,
        Value::Array(rc) => classify_array(&rc.borrow(), opts),
        Value::Object(rc) => classify_plain_object(&rc.borrow(), opts),
        Value::Map(_) => Tag::Map,
        Value::Set(_) => Tag::Set,
        Value::Date(d) => {
            if d.is_valid() {
                Tag::Date
            } else {
                Tag::DateInvalid
            }
        }
        Value::RegExp(_) => Tag::Regex,
        Value::Error(rc) => error_tag(&rc.borrow().kind),
        Value::Buffer(rc) => {
            if rc.borrow().shared {
                Tag::SharedArrayBuffer
            } else {
                Tag::ArrayBuffer
            }
        }
        Value::View(v) => view_tag(v.kind),
        Value::Blob(_) => Tag::Blob,
        Value::File(_) => Tag::File,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Property;
    use std::rc::Rc;

    fn opts() -> CodecOpts {
        CodecOpts::default()
    }

    #[test]
    fn numbers_pick_the_narrowest_slot() {
        assert_eq!(classify_number(0.0), Tag::I8);
        assert_eq!(classify_number(-128.0), Tag::I8);
        assert_eq!(classify_number(1000.0), Tag::I16);
        assert_eq!(classify_number(100_000.0), Tag::I32);
        assert_eq!(classify_number(3_000_000_000.0), Tag::U32);
        assert_eq!(classify_number(0.5), Tag::F32);
        assert_eq!(classify_number(std::f64::consts::PI), Tag::F64);
    }

    #[test]
    fn special_bit_patterns_get_dedicated_tags() {
        assert_eq!(classify_number(f64::NAN), Tag::Nan);
        assert_eq!(classify_number(f64::INFINITY), Tag::PosInfinity);
        assert_eq!(classify_number(f64::NEG_INFINITY), Tag::NegInfinity);
        assert_eq!(classify_number(-0.0), Tag::NegZero);
        // Positive zero is an ordinary small integer
        assert_eq!(classify_number(0.0), Tag::I8);
    }

    #[test]
    fn string_width_uses_byte_length() {
        assert_eq!(classify_string(""), Tag::StrEmpty);
        assert_eq!(classify_string("hello"), Tag::StrAsciiTiny);
        assert_eq!(classify_string(&"x".repeat(16)), Tag::StrAsciiShort);
        assert_eq!(classify_string(&"x".repeat(256)), Tag::StrAsciiLong);
        // Eleven chars, thirteen bytes
        assert_eq!(classify_string("héllo wörld"), Tag::StrUtf8Tiny);
        assert_eq!(classify_string(&"é".repeat(8)), Tag::StrUtf8Short);
    }

    #[test]
    fn holes_make_an_array_sparse() {
        let v = Value::array_with_holes(vec![Some(Value::Number(1.0)), None]);
        assert_eq!(classify(&v, &opts()), Tag::ArraySparse);
    }

    #[test]
    fn packing_respects_the_option() {
        let v = Value::array((0..16).map(|i| Value::Number(i as f64)).collect());
        assert_eq!(classify(&v, &opts()), Tag::ArrayPackedI8);
        let mut no_pack = opts();
        no_pack.packed_arrays = false;
        assert_eq!(classify(&v, &no_pack), Tag::ArrayDense);
    }

    #[test]
    fn object_shape_inspection() {
        let mut obj = ObjectValue::default();
        assert_eq!(
            classify(&Value::object(obj.clone()), &opts()),
            Tag::ObjectEmpty
        );

        obj.set("a", Value::Number(1.0));
        assert_eq!(
            classify(&Value::object(obj.clone()), &opts()),
            Tag::ObjectLiteral
        );

        let mut ctor = obj.clone();
        ctor.prototype = Prototype::Constructor("Point".into());
        assert_eq!(
            classify(&Value::object(ctor), &opts()),
            Tag::ObjectConstructor
        );

        let mut with_method = obj.clone();
        with_method.set(
            "f",
            Value::Function(Rc::new(crate::value::FunctionValue {
                name: "f".into(),
                source: None,
            })),
        );
        assert_eq!(
            classify(&Value::object(with_method), &opts()),
            Tag::ObjectWithMethods
        );

        let mut with_flags = obj.clone();
        let mut prop = Property::data(Value::Null);
        prop.writable = false;
        with_flags
            .properties
            .push((crate::value::PropertyKey::String(Rc::from("ro")), prop));
        assert_eq!(
            classify(&Value::object(with_flags.clone()), &opts()),
            Tag::ObjectWithDescriptors
        );

        let mut no_desc = opts();
        no_desc.preserve_descriptors = false;
        assert_eq!(
            classify(&Value::object(with_flags), &no_desc),
            Tag::ObjectLiteral
        );
    }

    #[test]
    fn callables_classify_as_undefined() {
        let f = Value::Function(Rc::new(crate::value::FunctionValue {
            name: "f".into(),
            source: None,
        }));
        assert_eq!(classify(&f, &opts()), Tag::Undefined);
    }

    #[test]
    fn bigint_small_boundary() {
        use num_bigint::BigInt;
        let i64_max = BigInt::from(i64::MAX);
        let i64_min = BigInt::from(i64::MIN);
        assert_eq!(classify(&Value::BigInt(i64_max.clone()), &opts()), Tag::BigIntPosSmall);
        assert_eq!(
            classify(&Value::BigInt(i64_max + 1), &opts()),
            Tag::BigIntPosLarge
        );
        assert_eq!(classify(&Value::BigInt(i64_min.clone()), &opts()), Tag::BigIntNegSmall);
        assert_eq!(
            classify(&Value::BigInt(i64_min - 1), &opts()),
            Tag::BigIntNegLarge
        );
        assert_eq!(
            classify(&Value::BigInt(BigInt::from(0)), &opts()),
            Tag::BigIntPosSmall
        );
    }
}
