//! TYBR Codec - Encoder/decoder engines for the value-graph wire format
//!
//! This crate provides the codec engine over `tybr-format`'s primitives:
//!
//! - The dynamic host value model
//! - The type-classification front end
//! - The numeric-array analyzer
//! - Reference tracking (dedup + cycle pre-scan)
//! - The writer and reader drivers
//!
//! The codec is single-threaded and synchronous. [`Codec`] holds only
//! configuration: every call builds a fresh encoder or decoder, so calls
//! never share buffers or reference tables.
//!
//! ```
//! use tybr_codec::{Codec, Value};
//!
//! let codec = Codec::default();
//! let bytes = codec.serialize(&Value::array(vec![Value::Number(1.0)]))?;
//! let back = codec.deserialize(&bytes)?;
//! assert!(matches!(back, Value::Array(_)));
//! # Ok::<(), tybr_codec::TybrError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod analyze;
pub mod classify;
pub mod decode;
pub mod encode;
pub mod refs;
pub mod value;

// Re-export commonly used types
pub use decode::Decoder;
pub use encode::Encoder;
pub use tybr_format::{Result, Tag, TybrError};
pub use value::{
    ArrayValue, BufferValue, ErrorKind, ErrorValue, FunctionValue, MapValue, ObjectValue,
    Property, PropertyKey, PropertySlot, Prototype, RegExpValue, SetValue, SymbolValue, Value,
    ViewKind, ViewValue,
};

/// Codec configuration, set at construction
#[derive(Debug, Clone)]
pub struct CodecOpts {
    /// Emit `REFERENCE` / `STRING_REF` for repeated heap objects and
    /// strings
    pub deduplication: bool,
    /// Emit `BUFFER_REF` for views that alias an already-emitted store
    pub share_array_buffers: bool,
    /// Run the numeric-array analyzer and emit packed encodings
    pub packed_arrays: bool,
    /// Pre-scan for cycles; without it a cyclic graph overflows the stack
    pub detect_circular: bool,
    /// Capture function source text in method-object bodies
    pub serialize_functions: bool,
    /// Emit full property descriptors when flags or accessors are present
    pub preserve_descriptors: bool,
    /// Initial output buffer capacity hint in bytes
    pub initial_capacity: usize,
}

impl Default for CodecOpts {
    fn default() -> Self {
        Self {
            deduplication: true,
            share_array_buffers: true,
            packed_arrays: true,
            detect_circular: true,
            serialize_functions: false,
            preserve_descriptors: true,
            initial_capacity: 65536,
        }
    }
}

/// The codec instance: configuration plus the two one-shot operations.
///
/// Disabling any option only weakens the encoder; the decoder accepts the
/// output of any configuration.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    opts: CodecOpts,
}

impl Codec {
    /// Create a codec with the given options
    pub fn new(opts: CodecOpts) -> Self {
        Self { opts }
    }

    /// The configuration this codec encodes with
    pub fn opts(&self) -> &CodecOpts {
        &self.opts
    }

    /// Serialize a value graph into an owned byte sequence
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        Encoder::new(&self.opts).serialize(value)
    }

    /// Reconstruct a value graph from bytes
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        Decoder::new(bytes).deserialize()
    }
}
