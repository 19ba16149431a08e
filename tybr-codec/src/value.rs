//! The dynamic host value graph
//!
//! Values are a tagged union. Heap variants are `Rc`-backed so that shared
//! substructure and cycles are expressible; reference identity for the
//! codec's tables is `Rc` pointer identity. Containers that the decoder
//! fills after allocation (arrays, objects, maps, sets, errors, buffers)
//! sit behind `RefCell`.

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigInt;

/// A value from the dynamically-typed host domain
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / undefined
    Undefined,
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// IEEE 754 double
    Number(f64),
    /// Arbitrary-precision integer
    BigInt(BigInt),
    /// Immutable string
    String(Rc<str>),
    /// Symbolic identifier
    Symbol(Rc<SymbolValue>),
    /// Callable; serialized only through the method-object path
    Function(Rc<FunctionValue>),
    /// Array with possible holes
    Array(Rc<RefCell<ArrayValue>>),
    /// Keyed object
    Object(Rc<RefCell<ObjectValue>>),
    /// Insertion-ordered key/value map
    Map(Rc<RefCell<MapValue>>),
    /// Insertion-ordered set
    Set(Rc<RefCell<SetValue>>),
    /// Date as epoch milliseconds (NaN = invalid)
    Date(Rc<DateValue>),
    /// Regular expression
    RegExp(Rc<RegExpValue>),
    /// Error with optional aggregate children
    Error(Rc<RefCell<ErrorValue>>),
    /// Contiguous byte store
    Buffer(Rc<RefCell<BufferValue>>),
    /// Typed array or data view over a byte store
    View(Rc<ViewValue>),
    /// Opaque blob slot
    Blob(Rc<BlobValue>),
    /// Opaque file slot
    File(Rc<FileValue>),
}

/// Symbolic identifier subtypes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolValue {
    /// Symbol with a description (possibly empty)
    Described(String),
    /// Globally registered symbol, keyed by its registry string
    Global(String),
    /// Well-known symbol, as an index into
    /// [`tybr_format::constants::WELL_KNOWN_SYMBOLS`]
    WellKnown(usize),
    /// Symbol without a description
    Anonymous,
}

/// Callable value: a name plus optional captured source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionValue {
    /// Function name
    pub name: String,
    /// Source text, present when function capture was enabled
    pub source: Option<String>,
}

/// Array storage; `None` entries are holes
#[derive(Debug, Clone, Default)]
pub struct ArrayValue {
    /// Elements in index order
    pub elements: Vec<Option<Value>>,
}

impl ArrayValue {
    /// Total length including holes
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when there are no elements at all
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of non-hole elements
    pub fn filled_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_some()).count()
    }
}

/// Property key: string or symbol
#[derive(Debug, Clone)]
pub enum PropertyKey {
    /// String key
    String(Rc<str>),
    /// Symbol key
    Symbol(Rc<SymbolValue>),
}

impl PropertyKey {
    /// The key's string form, when it is a string key
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }
}

/// The value slot of a property
#[derive(Debug, Clone)]
pub enum PropertySlot {
    /// Ordinary data property
    Data(Value),
    /// Accessor property
    Accessor {
        /// Getter, if present
        getter: Option<Value>,
        /// Setter, if present
        setter: Option<Value>,
    },
}

/// A property with its descriptor flags
#[derive(Debug, Clone)]
pub struct Property {
    /// Data or accessor slot
    pub slot: PropertySlot,
    /// Enumerable flag
    pub enumerable: bool,
    /// Writable flag
    pub writable: bool,
    /// Configurable flag
    pub configurable: bool,
}

impl Property {
    /// A data property with all-default flags
    pub fn data(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data(value),
            enumerable: true,
            writable: true,
            configurable: true,
        }
    }

    /// True for a data property whose flags are all default
    pub fn is_default_data(&self) -> bool {
        matches!(self.slot, PropertySlot::Data(_))
            && self.enumerable
            && self.writable
            && self.configurable
    }
}

/// Object prototype shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prototype {
    /// The default object prototype
    Default,
    /// A named constructor's prototype
    Constructor(String),
}

/// Keyed object with insertion-ordered properties
#[derive(Debug, Clone)]
pub struct ObjectValue {
    /// Own properties in enumeration order
    pub properties: Vec<(PropertyKey, Property)>,
    /// Prototype shape
    pub prototype: Prototype,
}

impl Default for ObjectValue {
    fn default() -> Self {
        Self {
            properties: Vec::new(),
            prototype: Prototype::Default,
        }
    }
}

impl ObjectValue {
    /// Insert a default data property under a string key
    pub fn set(&mut self, key: &str, value: Value) {
        self.properties
            .push((PropertyKey::String(Rc::from(key)), Property::data(value)));
    }

    /// Look up a string-keyed data property's value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties.iter().find_map(|(k, p)| {
            if k.as_str() == Some(key) {
                match &p.slot {
                    PropertySlot::Data(v) => Some(v.clone()),
                    PropertySlot::Accessor { .. } => None,
                }
            } else {
                None
            }
        })
    }
}

/// Insertion-ordered key/value pairs
#[derive(Debug, Clone, Default)]
pub struct MapValue {
    /// Entries in insertion order
    pub entries: Vec<(Value, Value)>,
}

/// Insertion-ordered values
#[derive(Debug, Clone, Default)]
pub struct SetValue {
    /// Entries in insertion order
    pub entries: Vec<Value>,
}

/// Date as epoch milliseconds
#[derive(Debug, Clone, Copy)]
pub struct DateValue {
    /// Milliseconds since the epoch; NaN marks an invalid date
    pub epoch_ms: f64,
}

impl DateValue {
    /// True when the time value is finite
    pub fn is_valid(&self) -> bool {
        self.epoch_ms.is_finite()
    }
}

/// Regular expression source and flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExpValue {
    /// Pattern source
    pub source: String,
    /// Flag characters
    pub flags: String,
}

/// Error constructor kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Base error
    Error,
    /// Eval error
    Eval,
    /// Range error
    Range,
    /// Reference error
    Reference,
    /// Syntax error
    Syntax,
    /// Type error
    Type,
    /// URI error
    Uri,
    /// Aggregate error carrying child values
    Aggregate,
    /// Custom error constructor, by name
    Custom(String),
}

/// Error value
#[derive(Debug, Clone)]
pub struct ErrorValue {
    /// Constructor kind
    pub kind: ErrorKind,
    /// Message
    pub message: String,
    /// Captured stack text
    pub stack: String,
    /// Aggregate children (empty for non-aggregate kinds)
    pub errors: Vec<Value>,
}

/// Contiguous byte store backing buffers and views
#[derive(Debug, Clone)]
pub struct BufferValue {
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// True for shared stores
    pub shared: bool,
}

/// Typed-array element kinds plus the data view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// u8 elements
    U8,
    /// i8 elements
    I8,
    /// Clamped u8 elements
    U8Clamped,
    /// u16 elements
    U16,
    /// i16 elements
    I16,
    /// u32 elements
    U32,
    /// i32 elements
    I32,
    /// f32 elements
    F32,
    /// f64 elements
    F64,
    /// Big-integer i64 elements
    I64,
    /// Big-integer u64 elements
    U64,
    /// Byte-granular data view
    DataView,
}

impl ViewKind {
    /// Element width in bytes
    pub fn element_size(self) -> usize {
        match self {
            ViewKind::U8 | ViewKind::I8 | ViewKind::U8Clamped | ViewKind::DataView => 1,
            ViewKind::U16 | ViewKind::I16 => 2,
            ViewKind::U32 | ViewKind::I32 | ViewKind::F32 => 4,
            ViewKind::F64 | ViewKind::I64 | ViewKind::U64 => 8,
        }
    }
}

/// A view over a byte store. `length` counts elements (bytes for the
/// data view).
#[derive(Debug, Clone)]
pub struct ViewValue {
    /// Element kind
    pub kind: ViewKind,
    /// Backing store
    pub buffer: Rc<RefCell<BufferValue>>,
    /// Offset into the store, in bytes
    pub byte_offset: usize,
    /// Length in elements
    pub length: usize,
}

impl ViewValue {
    /// The view's span in bytes
    pub fn byte_length(&self) -> usize {
        self.length * self.kind.element_size()
    }
}

/// Opaque blob slot; content semantics are host-specific
#[derive(Debug, Clone, Default)]
pub struct BlobValue;

/// Opaque file slot; content semantics are host-specific
#[derive(Debug, Clone, Default)]
pub struct FileValue;

impl Value {
    /// Build a string value
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Build a dense array from elements
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayValue {
            elements: elements.into_iter().map(Some).collect(),
        })))
    }

    /// Build an array that may contain holes
    pub fn array_with_holes(elements: Vec<Option<Value>>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayValue { elements })))
    }

    /// Build an object value
    pub fn object(obj: ObjectValue) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Build a map from entries
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(MapValue { entries })))
    }

    /// Build a set from entries
    pub fn set(entries: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(SetValue { entries })))
    }

    /// Build a date from epoch milliseconds
    pub fn date(epoch_ms: f64) -> Self {
        Value::Date(Rc::new(DateValue { epoch_ms }))
    }

    /// Build a regular expression
    pub fn regexp(source: &str, flags: &str) -> Self {
        Value::RegExp(Rc::new(RegExpValue {
            source: source.to_string(),
            flags: flags.to_string(),
        }))
    }

    /// Build an error without aggregate children
    pub fn error(kind: ErrorKind, message: &str) -> Self {
        Value::Error(Rc::new(RefCell::new(ErrorValue {
            kind,
            message: message.to_string(),
            stack: String::new(),
            errors: Vec::new(),
        })))
    }

    /// Build an owned byte buffer
    pub fn buffer(bytes: Vec<u8>) -> Self {
        Value::Buffer(Rc::new(RefCell::new(BufferValue {
            bytes,
            shared: false,
        })))
    }

    /// Build a shared byte buffer
    pub fn shared_buffer(bytes: Vec<u8>) -> Self {
        Value::Buffer(Rc::new(RefCell::new(BufferValue {
            bytes,
            shared: true,
        })))
    }

    /// Build a view over an existing byte store
    pub fn view(
        kind: ViewKind,
        buffer: &Rc<RefCell<BufferValue>>,
        byte_offset: usize,
        length: usize,
    ) -> Self {
        Value::View(Rc::new(ViewValue {
            kind,
            buffer: Rc::clone(buffer),
            byte_offset,
            length,
        }))
    }

    /// True for callables
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Identity of the value's heap allocation for the object table.
    ///
    /// Byte stores are excluded: they are tracked in the separate buffer
    /// table. Strings, symbols, big integers, and callables have no object
    /// identity on the wire.
    pub fn heap_id(&self) -> Option<usize> {
        match self {
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Object(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Map(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Set(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Date(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::RegExp(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Error(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::View(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::Blob(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            Value::File(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_id_tracks_shared_allocations() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = a.clone();
        assert_eq!(a.heap_id(), b.heap_id());

        let c = Value::array(vec![Value::Number(1.0)]);
        assert_ne!(a.heap_id(), c.heap_id());
    }

    #[test]
    fn buffers_have_no_object_identity() {
        assert!(Value::buffer(vec![1, 2, 3]).heap_id().is_none());
        assert!(Value::string("abc").heap_id().is_none());
        assert!(Value::Number(1.0).heap_id().is_none());
    }

    #[test]
    fn array_filled_count_skips_holes() {
        let arr = ArrayValue {
            elements: vec![Some(Value::Null), None, Some(Value::Bool(true))],
        };
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.filled_count(), 2);
    }

    #[test]
    fn view_byte_length_scales_with_element_size() {
        let buf = Rc::new(RefCell::new(BufferValue {
            bytes: vec![0; 32],
            shared: false,
        }));
        let v = ViewValue {
            kind: ViewKind::F64,
            buffer: buf,
            byte_offset: 0,
            length: 4,
        };
        assert_eq!(v.byte_length(), 32);
    }
}
