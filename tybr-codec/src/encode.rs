//! The writer driver
//!
//! Walks the value graph, consults the classifier and the reference
//! tracker, and emits tagged records into the aligned write buffer. Each
//! [`Encoder::serialize`] call is one atomic transaction over fresh state.

use std::collections::HashSet;
use std::rc::Rc;

use tybr_format::constants::{MAGIC, STR_TABLE_MIN_LEN, VERSION};
use tybr_format::{Result, Tag, TybrError, WriteBuffer};

use crate::classify::{classify, classify_string, error_tag, view_tag};
use crate::refs::{find_cycles, RefTracker};
use crate::value::{
    ArrayValue, BufferValue, ErrorKind, ErrorValue, ObjectValue, Property, PropertyKey,
    PropertySlot, Prototype, Value, ViewValue,
};
use crate::CodecOpts;

/// One-shot graph encoder
pub struct Encoder<'o> {
    opts: &'o CodecOpts,
    buf: WriteBuffer,
    refs: RefTracker,
    cycles: HashSet<usize>,
}

impl<'o> Encoder<'o> {
    /// Create an encoder with fresh buffer and tables
    pub fn new(opts: &'o CodecOpts) -> Self {
        Self {
            opts,
            buf: WriteBuffer::with_capacity(opts.initial_capacity),
            refs: RefTracker::new(),
            cycles: HashSet::new(),
        }
    }

    /// Serialize `root` into an owned byte sequence
    pub fn serialize(mut self, root: &Value) -> Result<Vec<u8>> {
        self.buf.write_u32_le(MAGIC);
        self.buf.write_u8(VERSION);
        if self.opts.detect_circular {
            self.cycles = find_cycles(root);
        }
        self.write_value(root)?;
        Ok(self.buf.into_bytes())
    }

    fn write_tag(&mut self, tag: Tag) {
        self.buf.write_u8(tag as u8);
    }

    fn write_len(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| {
            TybrError::UnsupportedValue(format!("length {} exceeds the 32-bit wire domain", n))
        })?;
        self.buf.write_varint(n);
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        if let Some(ptr) = value.heap_id() {
            if self.cycles.contains(&ptr) {
                // A cyclic node keeps its first id for the whole walk; any
                // re-encounter becomes a back-reference to it.
                if let Some(id) = self.refs.object_id(ptr) {
                    self.write_tag(Tag::CircularRef);
                    self.buf.write_varint(id);
                    return Ok(());
                }
            } else if let Some(id) = self.refs.object_id(ptr) {
                if self.opts.deduplication {
                    self.write_tag(Tag::Reference);
                    self.buf.write_varint(id);
                    return Ok(());
                }
            }
            self.refs.track_object(ptr);
            return self.write_heap(value);
        }

        if let Value::String(s) = value {
            return self.write_str(s);
        }

        if let Value::Buffer(rc) = value {
            let ptr = Rc::as_ptr(rc) as *const () as usize;
            if let Some(id) = self.refs.buffer_id(ptr) {
                if self.opts.share_array_buffers {
                    self.write_tag(Tag::BufferRef);
                    self.buf.write_varint(id);
                    return Ok(());
                }
            }
            self.refs.track_buffer(ptr);
            return self.write_buffer(&rc.borrow());
        }

        self.write_leaf(value)
    }

    /// Emit a full string value, maintaining the string table
    fn write_str(&mut self, s: &str) -> Result<()> {
        if s.len() > STR_TABLE_MIN_LEN {
            if let Some(id) = self.refs.string_id(s) {
                if self.opts.deduplication {
                    self.write_tag(Tag::StrRef);
                    self.buf.write_varint(id);
                    return Ok(());
                }
            }
            self.refs.track_string(s);
        }

        let tag = classify_string(s);
        self.write_tag(tag);
        match tag {
            Tag::StrEmpty => {}
            Tag::StrAsciiTiny | Tag::StrAsciiShort | Tag::StrUtf8Tiny | Tag::StrUtf8Short => {
                self.buf.write_u8(s.len() as u8);
                self.buf.write_bytes(s.as_bytes());
            }
            _ => {
                self.write_len(s.len())?;
                self.buf.write_bytes(s.as_bytes());
            }
        }
        Ok(())
    }

    fn write_leaf(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Undefined | Value::Function(_) => {
                self.write_tag(Tag::Undefined);
            }
            Value::Null => self.write_tag(Tag::Null),
            Value::Bool(false) => self.write_tag(Tag::False),
            Value::Bool(true) => self.write_tag(Tag::True),
            Value::Number(x) => self.write_number(*x),
            Value::BigInt(b) => {
                let tag = classify(value, self.opts);
                self.write_tag(tag);
                match tag {
                    Tag::BigIntPosSmall | Tag::BigIntNegSmall => {
                        let digits = b.magnitude().to_u64_digits();
                        let magnitude = digits.first().copied().unwrap_or(0);
                        self.buf.write_i64_le(magnitude as i64);
                    }
                    _ => {
                        let bytes = b.magnitude().to_bytes_be();
                        self.write_len(bytes.len())?;
                        self.buf.write_bytes(&bytes);
                    }
                }
            }
            Value::Symbol(sym) => {
                use crate::value::SymbolValue::*;
                match sym.as_ref() {
                    Described(d) => {
                        self.write_tag(Tag::Symbol);
                        self.write_str(d)?;
                    }
                    Global(key) => {
                        self.write_tag(Tag::SymbolGlobal);
                        self.write_str(key)?;
                    }
                    WellKnown(idx) => {
                        let idx = u8::try_from(*idx).map_err(|_| {
                            TybrError::UnsupportedValue("well-known symbol index".into())
                        })?;
                        self.write_tag(Tag::SymbolWellKnown);
                        self.buf.write_u8(idx);
                    }
                    Anonymous => self.write_tag(Tag::SymbolNoDesc),
                }
            }
            _ => {
                return Err(TybrError::UnsupportedValue(
                    "heap value reached the leaf emitter".into(),
                ))
            }
        }
        Ok(())
    }

    fn write_number(&mut self, x: f64) {
        let tag = crate::classify::classify_number(x);
        self.write_tag(tag);
        match tag {
            Tag::I8 => self.buf.write_u8(x as i8 as u8),
            Tag::I16 => self.buf.write_i16_le(x as i16),
            Tag::I32 => self.buf.write_i32_le(x as i32),
            Tag::U32 => self.buf.write_u32_le(x as u32),
            Tag::F32 => self.buf.write_f32_le(x as f32),
            Tag::F64 => self.buf.write_f64_le(x),
            // NaN, infinities, and negative zero carry no payload
            _ => {}
        }
    }

    fn write_buffer(&mut self, buf: &BufferValue) -> Result<()> {
        self.write_tag(if buf.shared {
            Tag::SharedArrayBuffer
        } else {
            Tag::ArrayBuffer
        });
        self.write_len(buf.bytes.len())?;
        self.buf.write_bytes(&buf.bytes);
        Ok(())
    }

    fn write_heap(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Array(rc) => {
                let tag = classify(value, self.opts);
                let arr = rc.borrow();
                self.write_array(tag, &arr)
            }
            Value::Object(rc) => {
                let tag = classify(value, self.opts);
                let obj = rc.borrow();
                self.write_object(tag, &obj)
            }
            Value::Map(rc) => {
                self.write_tag(Tag::Map);
                let map = rc.borrow();
                self.write_len(map.entries.len())?;
                for (k, v) in &map.entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                Ok(())
            }
            Value::Set(rc) => {
                self.write_tag(Tag::Set);
                let set = rc.borrow();
                self.write_len(set.entries.len())?;
                for v in &set.entries {
                    self.write_value(v)?;
                }
                Ok(())
            }
            Value::Date(d) => {
                if d.is_valid() {
                    self.write_tag(Tag::Date);
                    self.buf.write_f64_le(d.epoch_ms);
                } else {
                    self.write_tag(Tag::DateInvalid);
                }
                Ok(())
            }
            Value::RegExp(r) => {
                self.write_tag(Tag::Regex);
                self.write_str(&r.source)?;
                self.write_str(&r.flags)
            }
            Value::Error(rc) => {
                let err = rc.borrow();
                self.write_error(&err)
            }
            Value::View(v) => self.write_view(v),
            Value::Blob(_) => {
                self.write_tag(Tag::Blob);
                self.buf.write_varint(0);
                self.buf.write_varint(0);
                Ok(())
            }
            Value::File(_) => {
                self.write_tag(Tag::File);
                self.buf.write_varint(0);
                self.buf.write_varint(0);
                Ok(())
            }
            _ => Err(TybrError::UnsupportedValue(
                "leaf value reached the heap emitter".into(),
            )),
        }
    }

    fn write_array(&mut self, tag: Tag, arr: &ArrayValue) -> Result<()> {
        self.write_tag(tag);
        match tag {
            Tag::ArrayEmpty => Ok(()),
            Tag::ArrayDense => {
                self.write_len(arr.len())?;
                for element in &arr.elements {
                    match element {
                        Some(v) => self.write_value(v)?,
                        None => self.write_tag(Tag::Undefined),
                    }
                }
                Ok(())
            }
            Tag::ArraySparse => {
                self.write_len(arr.len())?;
                self.write_len(arr.filled_count())?;
                for (index, element) in arr.elements.iter().enumerate() {
                    if let Some(v) = element {
                        self.write_len(index)?;
                        self.write_value(v)?;
                    }
                }
                Ok(())
            }
            _ => self.write_packed(tag, arr),
        }
    }

    fn write_packed(&mut self, tag: Tag, arr: &ArrayValue) -> Result<()> {
        self.write_len(arr.len())?;
        for element in &arr.elements {
            let x = match element {
                Some(Value::Number(x)) => *x,
                // The analyzer only recommends packing for all-numeric
                // arrays, so this is unreachable on classifier output.
                _ => {
                    return Err(TybrError::UnsupportedValue(
                        "packed array with non-numeric element".into(),
                    ))
                }
            };
            match tag {
                Tag::ArrayPackedI8 => self.buf.write_u8(x as i8 as u8),
                Tag::ArrayPackedI16 => self.buf.write_i16_le(x as i16),
                Tag::ArrayPackedI32 => self.buf.write_i32_le(x as i32),
                Tag::ArrayPackedF32 => self.buf.write_f32_le(x as f32),
                _ => self.buf.write_f64_le(x),
            }
        }
        Ok(())
    }

    fn write_object(&mut self, tag: Tag, obj: &ObjectValue) -> Result<()> {
        self.write_tag(tag);
        match tag {
            Tag::ObjectEmpty => Ok(()),
            Tag::ObjectLiteral => self.write_plain_body(obj),
            Tag::ObjectConstructor => {
                let name = match &obj.prototype {
                    Prototype::Constructor(name) => name.clone(),
                    Prototype::Default => "Object".to_string(),
                };
                self.write_str(&name)?;
                self.write_plain_body(obj)
            }
            Tag::ObjectWithMethods => self.write_method_body(obj),
            Tag::ObjectWithDescriptors => self.write_descriptor_body(obj),
            other => Err(TybrError::UnsupportedValue(format!(
                "object body for tag {:#04x}",
                other as u8
            ))),
        }
    }

    /// Own string-keyed data properties, callables filtered, keys sorted
    fn sorted_string_entries<'v>(obj: &'v ObjectValue) -> Vec<(&'v str, &'v Value)> {
        let mut entries: Vec<(&str, &Value)> = obj
            .properties
            .iter()
            .filter_map(|(key, prop)| {
                let key = key.as_str()?;
                match &prop.slot {
                    PropertySlot::Data(v) if !v.is_callable() => Some((key, v)),
                    // Accessor values are inaccessible without running
                    // host code; the key is omitted from the output.
                    _ => None,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    fn write_plain_body(&mut self, obj: &ObjectValue) -> Result<()> {
        let entries = Self::sorted_string_entries(obj);
        self.write_len(entries.len())?;
        for (key, value) in entries {
            self.write_str(key)?;
            self.write_value(value)?;
        }
        Ok(())
    }

    fn write_method_body(&mut self, obj: &ObjectValue) -> Result<()> {
        let mut entries: Vec<(&str, &Value)> = obj
            .properties
            .iter()
            .filter_map(|(key, prop)| {
                let key = key.as_str()?;
                match &prop.slot {
                    PropertySlot::Data(v) => Some((key, v)),
                    PropertySlot::Accessor { .. } => None,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        self.write_len(entries.len())?;
        for (key, value) in entries {
            self.write_str(key)?;
            if let Value::Function(f) = value {
                self.buf.write_u8(1);
                if self.opts.serialize_functions {
                    self.write_str(f.source.as_deref().unwrap_or_default())?;
                    self.write_str(&f.name)?;
                } else {
                    self.buf.write_u8(Tag::FunctionPlaceholder as u8);
                }
            } else {
                self.buf.write_u8(0);
                self.write_value(value)?;
            }
        }
        Ok(())
    }

    fn write_descriptor_body(&mut self, obj: &ObjectValue) -> Result<()> {
        // Descriptor bodies keep enumeration order and include symbol keys
        self.write_len(obj.properties.len())?;
        for (key, prop) in &obj.properties {
            match key {
                PropertyKey::String(s) => self.write_str(s)?,
                PropertyKey::Symbol(sym) => self.write_value(&Value::Symbol(Rc::clone(sym)))?,
            }
            self.write_descriptor(prop)?;
        }
        Ok(())
    }

    fn write_descriptor(&mut self, prop: &Property) -> Result<()> {
        let (getter, setter) = match &prop.slot {
            PropertySlot::Accessor { getter, setter } => (getter.as_ref(), setter.as_ref()),
            PropertySlot::Data(_) => (None, None),
        };
        let mut flags = 0u8;
        if prop.enumerable {
            flags |= 1;
        }
        if prop.writable {
            flags |= 1 << 1;
        }
        if prop.configurable {
            flags |= 1 << 2;
        }
        if getter.is_some() {
            flags |= 1 << 3;
        }
        if setter.is_some() {
            flags |= 1 << 4;
        }
        self.buf.write_u8(flags);

        if getter.is_none() && setter.is_none() {
            match &prop.slot {
                PropertySlot::Data(v) => self.write_value(v),
                // An accessor with neither side degenerates to absent
                PropertySlot::Accessor { .. } => self.write_value(&Value::Undefined),
            }
        } else {
            if let Some(g) = getter {
                self.write_value(g)?;
            }
            if let Some(s) = setter {
                self.write_value(s)?;
            }
            Ok(())
        }
    }

    fn write_error(&mut self, err: &ErrorValue) -> Result<()> {
        let tag = error_tag(&err.kind);
        self.write_tag(tag);
        if let ErrorKind::Custom(name) = &err.kind {
            self.write_str(name)?;
        }
        self.write_str(&err.message)?;
        self.write_str(&err.stack)?;
        if tag == Tag::AggregateError {
            self.write_len(err.errors.len())?;
            for inner in &err.errors {
                self.write_value(inner)?;
            }
        }
        Ok(())
    }

    fn write_view(&mut self, view: &ViewValue) -> Result<()> {
        self.write_tag(view_tag(view.kind));

        let ptr = Rc::as_ptr(&view.buffer) as *const () as usize;
        let shared_id = if self.opts.share_array_buffers {
            self.refs.buffer_id(ptr)
        } else {
            None
        };

        if let Some(id) = shared_id {
            self.buf.write_u8(1);
            self.buf.write_varint(id);
            self.write_len(view.byte_offset)?;
            self.write_len(view.length)?;
            return Ok(());
        }

        self.refs.track_buffer(ptr);
        self.buf.write_u8(0);
        self.write_len(view.byte_offset)?;
        self.write_len(view.length)?;

        let store = view.buffer.borrow();
        let end = view
            .byte_offset
            .checked_add(view.byte_length())
            .filter(|&end| end <= store.bytes.len())
            .ok_or_else(|| {
                TybrError::UnsupportedValue("view range exceeds its backing store".into())
            })?;
        self.buf.align(view.kind.element_size().min(8));
        self.buf.write_bytes(&store.bytes[view.byte_offset..end]);
        Ok(())
    }
}

/// Convenience wrapper: serialize with the given options
pub fn serialize(value: &Value, opts: &CodecOpts) -> Result<Vec<u8>> {
    Encoder::new(opts).serialize(value)
}
