//! The reader driver
//!
//! Dispatches on wire tags, reconstructs values through the bounds-checked
//! reader, and maintains mirror reference tables. Container shells are
//! registered before their contents are decoded so that back-references
//! inside the contents resolve to the container itself; that is what
//! realises cycles with the same object identity.

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::{BigInt, BigUint, Sign};
use tybr_format::constants::{MAGIC, STR_TABLE_MIN_LEN, VERSION, WELL_KNOWN_SYMBOLS};
use tybr_format::{ByteReader, Result, Tag, TybrError};

use crate::value::{
    ArrayValue, BufferValue, ErrorKind, ErrorValue, FunctionValue, MapValue, ObjectValue,
    Property, PropertyKey, PropertySlot, Prototype, SetValue, SymbolValue, Value, ViewKind,
    ViewValue,
};

/// One-shot graph decoder
pub struct Decoder<'a> {
    reader: ByteReader<'a>,
    objects: Vec<Value>,
    strings: Vec<Rc<str>>,
    buffers: Vec<Rc<RefCell<BufferValue>>>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `bytes` with fresh mirror tables
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes),
            objects: Vec::new(),
            strings: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// Validate the header and reconstruct the root value
    pub fn deserialize(mut self) -> Result<Value> {
        let magic = self.reader.read_u32_le().map_err(|_| TybrError::InvalidMagic)?;
        if magic != MAGIC {
            return Err(TybrError::InvalidMagic);
        }
        let version = self.reader.read_u8()?;
        if version != VERSION {
            return Err(TybrError::UnsupportedFormat(version));
        }
        self.read_value()
    }

    fn read_tag(&mut self) -> Result<Tag> {
        Tag::from_u8(self.reader.read_u8()?)
    }

    fn read_value(&mut self) -> Result<Value> {
        let tag = self.read_tag()?;
        self.read_value_with_tag(tag)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(self.reader.read_varint()? as usize)
    }

    /// Decode a value that must be a string
    fn read_str(&mut self) -> Result<Rc<str>> {
        match self.read_value()? {
            Value::String(s) => Ok(s),
            _ => Err(TybrError::InvalidPayload("expected a string value".into())),
        }
    }

    fn read_value_with_tag(&mut self, tag: Tag) -> Result<Value> {
        match tag {
            Tag::Null => Ok(Value::Null),
            Tag::Undefined => Ok(Value::Undefined),
            Tag::False => Ok(Value::Bool(false)),
            Tag::True => Ok(Value::Bool(true)),

            Tag::I8 => Ok(Value::Number(self.reader.read_u8()? as i8 as f64)),
            Tag::I16 => Ok(Value::Number(self.reader.read_i16_le()? as f64)),
            Tag::I32 => Ok(Value::Number(self.reader.read_i32_le()? as f64)),
            Tag::U32 => Ok(Value::Number(self.reader.read_u32_le()? as f64)),
            Tag::F32 => Ok(Value::Number(self.reader.read_f32_le()? as f64)),
            Tag::F64 => Ok(Value::Number(self.reader.read_f64_le()?)),
            Tag::Nan => Ok(Value::Number(f64::NAN)),
            Tag::PosInfinity => Ok(Value::Number(f64::INFINITY)),
            Tag::NegInfinity => Ok(Value::Number(f64::NEG_INFINITY)),
            Tag::NegZero => Ok(Value::Number(-0.0)),
            Tag::Varint => Ok(Value::Number(self.reader.read_varint()? as f64)),

            Tag::BigIntPosSmall | Tag::BigIntNegSmall => {
                let magnitude = self.reader.read_i64_le()? as u64;
                let mut big = BigInt::from(magnitude);
                if tag == Tag::BigIntNegSmall {
                    big = -big;
                }
                Ok(Value::BigInt(big))
            }
            Tag::BigIntPosLarge | Tag::BigIntNegLarge => {
                let len = self.read_len()?;
                let bytes = self.reader.read_bytes(len)?;
                let magnitude = BigUint::from_bytes_be(bytes);
                let sign = if tag == Tag::BigIntNegLarge {
                    Sign::Minus
                } else {
                    Sign::Plus
                };
                Ok(Value::BigInt(BigInt::from_biguint(sign, magnitude)))
            }

            Tag::StrEmpty
            | Tag::StrAsciiTiny
            | Tag::StrAsciiShort
            | Tag::StrAsciiLong
            | Tag::StrUtf8Tiny
            | Tag::StrUtf8Short
            | Tag::StrUtf8Long => self.read_string(tag),
            Tag::StrRef => {
                let id = self.reader.read_varint()?;
                let s = self.strings.get(id as usize).cloned().ok_or(
                    TybrError::InvalidReference {
                        id,
                        size: self.strings.len(),
                    },
                )?;
                Ok(Value::String(s))
            }

            Tag::ArrayEmpty
            | Tag::ArrayDense
            | Tag::ArraySparse
            | Tag::ArrayPackedI8
            | Tag::ArrayPackedI16
            | Tag::ArrayPackedI32
            | Tag::ArrayPackedF32
            | Tag::ArrayPackedF64 => self.read_array(tag),

            Tag::ObjectEmpty
            | Tag::ObjectPlain
            | Tag::ObjectLiteral
            | Tag::ObjectConstructor
            | Tag::ObjectWithDescriptors
            | Tag::ObjectWithMethods => self.read_object(tag),

            Tag::Map => self.read_map(),
            Tag::Set => self.read_set(),

            Tag::Date => {
                let ms = self.reader.read_f64_le()?;
                Ok(self.register(Value::date(ms)))
            }
            Tag::DateInvalid => Ok(self.register(Value::date(f64::NAN))),

            Tag::Error
            | Tag::EvalError
            | Tag::RangeError
            | Tag::ReferenceError
            | Tag::SyntaxError
            | Tag::TypeError
            | Tag::UriError
            | Tag::AggregateError
            | Tag::CustomError => self.read_error(tag),

            Tag::Regex => {
                let source = self.read_str()?;
                let flags = self.read_str()?;
                Ok(self.register(Value::regexp(&source, &flags)))
            }

            Tag::ArrayBuffer | Tag::SharedArrayBuffer => {
                let len = self.read_len()?;
                let bytes = self.reader.read_bytes(len)?.to_vec();
                let store = Rc::new(RefCell::new(BufferValue {
                    bytes,
                    shared: tag == Tag::SharedArrayBuffer,
                }));
                self.buffers.push(Rc::clone(&store));
                Ok(Value::Buffer(store))
            }
            Tag::BufferRef => {
                let id = self.reader.read_varint()?;
                let store = self.buffers.get(id as usize).cloned().ok_or(
                    TybrError::InvalidReference {
                        id,
                        size: self.buffers.len(),
                    },
                )?;
                Ok(Value::Buffer(store))
            }

            Tag::TypedU8
            | Tag::TypedI8
            | Tag::TypedU8Clamped
            | Tag::TypedU16
            | Tag::TypedI16
            | Tag::TypedU32
            | Tag::TypedI32
            | Tag::TypedF32
            | Tag::TypedF64
            | Tag::TypedI64
            | Tag::TypedU64
            | Tag::DataView => self.read_view(tag),

            Tag::Blob => {
                self.reader.read_varint()?;
                self.reader.read_varint()?;
                Ok(self.register(Value::Blob(Rc::new(crate::value::BlobValue))))
            }
            Tag::File => {
                self.reader.read_varint()?;
                self.reader.read_varint()?;
                Ok(self.register(Value::File(Rc::new(crate::value::FileValue))))
            }

            // Both reference forms resolve through the object table; the
            // circular form may legitimately land on an in-construction
            // shell, and a plain reference to a shell is accepted the
            // same way.
            Tag::Reference | Tag::CircularRef => {
                let id = self.reader.read_varint()?;
                self.objects
                    .get(id as usize)
                    .cloned()
                    .ok_or(TybrError::InvalidReference {
                        id,
                        size: self.objects.len(),
                    })
            }

            Tag::Symbol => {
                let description = self.read_str()?;
                Ok(Value::Symbol(Rc::new(SymbolValue::Described(
                    description.to_string(),
                ))))
            }
            Tag::SymbolGlobal => {
                let key = self.read_str()?;
                Ok(Value::Symbol(Rc::new(SymbolValue::Global(key.to_string()))))
            }
            Tag::SymbolWellKnown => {
                let index = self.reader.read_u8()? as usize;
                if index >= WELL_KNOWN_SYMBOLS.len() {
                    return Err(TybrError::InvalidPayload(format!(
                        "well-known symbol index {} out of range",
                        index
                    )));
                }
                Ok(Value::Symbol(Rc::new(SymbolValue::WellKnown(index))))
            }
            Tag::SymbolNoDesc => Ok(Value::Symbol(Rc::new(SymbolValue::Anonymous))),

            Tag::FunctionPlaceholder => Ok(Value::Function(Rc::new(FunctionValue {
                name: String::new(),
                source: None,
            }))),
        }
    }

    /// Append a freshly constructed heap leaf to the object table
    fn register(&mut self, value: Value) -> Value {
        self.objects.push(value.clone());
        value
    }

    fn read_string(&mut self, tag: Tag) -> Result<Value> {
        let len = match tag {
            Tag::StrEmpty => 0,
            Tag::StrAsciiTiny | Tag::StrAsciiShort | Tag::StrUtf8Tiny | Tag::StrUtf8Short => {
                self.reader.read_u8()? as usize
            }
            _ => self.read_len()?,
        };
        if len == 0 {
            return Ok(Value::String(Rc::from("")));
        }
        let bytes = self.reader.read_bytes(len)?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| TybrError::InvalidPayload("string payload is not valid UTF-8".into()))?;
        let s: Rc<str> = Rc::from(text);
        if s.len() > STR_TABLE_MIN_LEN {
            self.strings.push(Rc::clone(&s));
        }
        Ok(Value::String(s))
    }

    fn read_array(&mut self, tag: Tag) -> Result<Value> {
        let shell = Rc::new(RefCell::new(ArrayValue::default()));
        self.objects.push(Value::Array(Rc::clone(&shell)));

        match tag {
            Tag::ArrayEmpty => {}
            Tag::ArrayDense => {
                let len = self.read_len()?;
                for _ in 0..len {
                    let element = self.read_value()?;
                    shell.borrow_mut().elements.push(Some(element));
                }
            }
            Tag::ArraySparse => {
                let len = self.read_len()?;
                let filled = self.read_len()?;
                shell.borrow_mut().elements = vec![None; len];
                for _ in 0..filled {
                    let index = self.read_len()?;
                    if index >= len {
                        return Err(TybrError::InvalidPayload(format!(
                            "sparse index {} out of range {}",
                            index, len
                        )));
                    }
                    let element = self.read_value()?;
                    shell.borrow_mut().elements[index] = Some(element);
                }
            }
            _ => {
                let len = self.read_len()?;
                let mut elements = Vec::with_capacity(len.min(1 << 16));
                for _ in 0..len {
                    let x = match tag {
                        Tag::ArrayPackedI8 => self.reader.read_u8()? as i8 as f64,
                        Tag::ArrayPackedI16 => self.reader.read_i16_le()? as f64,
                        Tag::ArrayPackedI32 => self.reader.read_i32_le()? as f64,
                        Tag::ArrayPackedF32 => self.reader.read_f32_le()? as f64,
                        _ => self.reader.read_f64_le()?,
                    };
                    elements.push(Some(Value::Number(x)));
                }
                shell.borrow_mut().elements = elements;
            }
        }
        Ok(Value::Array(shell))
    }

    fn read_object(&mut self, tag: Tag) -> Result<Value> {
        let shell = Rc::new(RefCell::new(ObjectValue::default()));
        self.objects.push(Value::Object(Rc::clone(&shell)));

        match tag {
            Tag::ObjectEmpty => {}
            Tag::ObjectPlain | Tag::ObjectLiteral => self.read_plain_body(&shell)?,
            Tag::ObjectConstructor => {
                let name = self.read_str()?;
                shell.borrow_mut().prototype = Prototype::Constructor(name.to_string());
                self.read_plain_body(&shell)?;
            }
            Tag::ObjectWithMethods => {
                let count = self.read_len()?;
                for _ in 0..count {
                    let key = self.read_str()?;
                    let callable = self.reader.read_u8()?;
                    let value = if callable != 0 {
                        self.read_method(&key)?
                    } else {
                        self.read_value()?
                    };
                    shell
                        .borrow_mut()
                        .properties
                        .push((PropertyKey::String(key), Property::data(value)));
                }
            }
            Tag::ObjectWithDescriptors => {
                let count = self.read_len()?;
                for _ in 0..count {
                    let key = match self.read_value()? {
                        Value::String(s) => PropertyKey::String(s),
                        Value::Symbol(sym) => PropertyKey::Symbol(sym),
                        _ => {
                            return Err(TybrError::InvalidPayload(
                                "descriptor key must be a string or symbol".into(),
                            ))
                        }
                    };
                    let prop = self.read_descriptor()?;
                    shell.borrow_mut().properties.push((key, prop));
                }
            }
            _ => {
                return Err(TybrError::InvalidPayload(
                    "object body dispatch on a non-object tag".into(),
                ))
            }
        }
        Ok(Value::Object(shell))
    }

    fn read_plain_body(&mut self, shell: &Rc<RefCell<ObjectValue>>) -> Result<()> {
        let count = self.read_len()?;
        for _ in 0..count {
            let key = self.read_str()?;
            let value = self.read_value()?;
            shell
                .borrow_mut()
                .properties
                .push((PropertyKey::String(key), Property::data(value)));
        }
        Ok(())
    }

    /// A method entry is either the one-byte placeholder marker or a
    /// captured source string followed by the function name.
    fn read_method(&mut self, key: &str) -> Result<Value> {
        let marker = self.reader.read_u8()?;
        if marker == Tag::FunctionPlaceholder as u8 {
            return Ok(Value::Function(Rc::new(FunctionValue {
                name: key.to_string(),
                source: None,
            })));
        }
        let source_tag = Tag::from_u8(marker)?;
        let source = match self.read_value_with_tag(source_tag)? {
            Value::String(s) => s,
            _ => {
                return Err(TybrError::InvalidPayload(
                    "method source must be a string value".into(),
                ))
            }
        };
        let name = self.read_str()?;
        Ok(Value::Function(Rc::new(FunctionValue {
            name: name.to_string(),
            source: Some(source.to_string()),
        })))
    }

    fn read_descriptor(&mut self) -> Result<Property> {
        let flags = self.reader.read_u8()?;
        let enumerable = flags & 1 != 0;
        let writable = flags & (1 << 1) != 0;
        let configurable = flags & (1 << 2) != 0;
        let has_getter = flags & (1 << 3) != 0;
        let has_setter = flags & (1 << 4) != 0;

        let slot = if has_getter || has_setter {
            let getter = if has_getter {
                Some(self.read_value()?)
            } else {
                None
            };
            let setter = if has_setter {
                Some(self.read_value()?)
            } else {
                None
            };
            PropertySlot::Accessor { getter, setter }
        } else {
            PropertySlot::Data(self.read_value()?)
        };

        Ok(Property {
            slot,
            enumerable,
            writable,
            configurable,
        })
    }

    fn read_map(&mut self) -> Result<Value> {
        let shell = Rc::new(RefCell::new(MapValue::default()));
        self.objects.push(Value::Map(Rc::clone(&shell)));
        let count = self.read_len()?;
        for _ in 0..count {
            let key = self.read_value()?;
            let value = self.read_value()?;
            shell.borrow_mut().entries.push((key, value));
        }
        Ok(Value::Map(shell))
    }

    fn read_set(&mut self) -> Result<Value> {
        let shell = Rc::new(RefCell::new(SetValue::default()));
        self.objects.push(Value::Set(Rc::clone(&shell)));
        let count = self.read_len()?;
        for _ in 0..count {
            let value = self.read_value()?;
            shell.borrow_mut().entries.push(value);
        }
        Ok(Value::Set(shell))
    }

    fn read_error(&mut self, tag: Tag) -> Result<Value> {
        let kind = match tag {
            Tag::Error => ErrorKind::Error,
            Tag::EvalError => ErrorKind::Eval,
            Tag::RangeError => ErrorKind::Range,
            Tag::ReferenceError => ErrorKind::Reference,
            Tag::SyntaxError => ErrorKind::Syntax,
            Tag::TypeError => ErrorKind::Type,
            Tag::UriError => ErrorKind::Uri,
            Tag::AggregateError => ErrorKind::Aggregate,
            _ => ErrorKind::Custom(String::new()),
        };
        // Shell first: aggregate children may back-reference the error
        let shell = Rc::new(RefCell::new(ErrorValue {
            kind,
            message: String::new(),
            stack: String::new(),
            errors: Vec::new(),
        }));
        self.objects.push(Value::Error(Rc::clone(&shell)));

        if tag == Tag::CustomError {
            let name = self.read_str()?;
            shell.borrow_mut().kind = ErrorKind::Custom(name.to_string());
        }
        let message = self.read_str()?;
        let stack = self.read_str()?;
        {
            let mut err = shell.borrow_mut();
            err.message = message.to_string();
            err.stack = stack.to_string();
        }
        if tag == Tag::AggregateError {
            let count = self.read_len()?;
            for _ in 0..count {
                let inner = self.read_value()?;
                shell.borrow_mut().errors.push(inner);
            }
        }
        Ok(Value::Error(shell))
    }

    fn view_kind(tag: Tag) -> ViewKind {
        match tag {
            Tag::TypedU8 => ViewKind::U8,
            Tag::TypedI8 => ViewKind::I8,
            Tag::TypedU8Clamped => ViewKind::U8Clamped,
            Tag::TypedU16 => ViewKind::U16,
            Tag::TypedI16 => ViewKind::I16,
            Tag::TypedU32 => ViewKind::U32,
            Tag::TypedI32 => ViewKind::I32,
            Tag::TypedF32 => ViewKind::F32,
            Tag::TypedF64 => ViewKind::F64,
            Tag::TypedI64 => ViewKind::I64,
            Tag::TypedU64 => ViewKind::U64,
            _ => ViewKind::DataView,
        }
    }

    fn read_view(&mut self, tag: Tag) -> Result<Value> {
        let kind = Self::view_kind(tag);
        let share_flag = self.reader.read_u8()?;

        let view = match share_flag {
            1 => {
                let id = self.reader.read_varint()?;
                let byte_offset = self.read_len()?;
                let length = self.read_len()?;
                let store = self.buffers.get(id as usize).cloned().ok_or(
                    TybrError::InvalidReference {
                        id,
                        size: self.buffers.len(),
                    },
                )?;
                let end = Self::view_end(kind, byte_offset, length)?;
                // A shared view may span past the bytes decoded so far;
                // the store grows zero-filled to cover it.
                {
                    let mut store = store.borrow_mut();
                    if store.bytes.len() < end {
                        store.bytes.resize(end, 0);
                    }
                }
                ViewValue {
                    kind,
                    buffer: store,
                    byte_offset,
                    length,
                }
            }
            0 => {
                let byte_offset = self.read_len()?;
                let length = self.read_len()?;
                let end = Self::view_end(kind, byte_offset, length)?;
                self.reader.align(kind.element_size().min(8));
                let payload = self.reader.read_bytes(end - byte_offset)?;

                let mut bytes = vec![0u8; end];
                bytes[byte_offset..].copy_from_slice(payload);
                let store = Rc::new(RefCell::new(BufferValue {
                    bytes,
                    shared: false,
                }));
                self.buffers.push(Rc::clone(&store));
                ViewValue {
                    kind,
                    buffer: store,
                    byte_offset,
                    length,
                }
            }
            other => {
                return Err(TybrError::InvalidPayload(format!(
                    "view share flag must be 0 or 1, got {}",
                    other
                )))
            }
        };

        Ok(self.register(Value::View(Rc::new(view))))
    }

    fn view_end(kind: ViewKind, byte_offset: usize, length: usize) -> Result<usize> {
        length
            .checked_mul(kind.element_size())
            .and_then(|span| byte_offset.checked_add(span))
            .ok_or_else(|| TybrError::InvalidPayload("view span overflows".into()))
    }
}

/// Convenience wrapper: deserialize a blob
pub fn deserialize(bytes: &[u8]) -> Result<Value> {
    Decoder::new(bytes).deserialize()
}
