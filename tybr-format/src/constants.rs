//! Constants and magic numbers for the TYBR wire format

/// Header magic, written as a little-endian u32 ("5RBT" on the wire)
pub const MAGIC: u32 = 0x5442_5235;

/// Wire format version byte
pub const VERSION: u8 = 0x05;

/// Header length in bytes: 4-byte magic + 1 version byte
pub const HEADER_LEN: usize = 5;

/// Buffer capacities are rounded up to a multiple of this quantum
pub const CAPACITY_QUANTUM: usize = 128;

/// Maximum encoded length of a varint (u32 domain)
pub const VARINT_MAX_BYTES: usize = 5;

/// Strings shorter than this many bytes use the TINY encodings
pub const STR_TINY_LIMIT: usize = 16;

/// Strings shorter than this many bytes use the SHORT encodings
pub const STR_SHORT_LIMIT: usize = 256;

/// Strings longer than this many bytes participate in the string table
pub const STR_TABLE_MIN_LEN: usize = 3;

/// Multi-byte writes align to their operand width, capped at this
pub const MAX_ALIGN: usize = 8;

/// The fixed well-known symbol set; the WELLKNOWN wire payload is a
/// one-byte index into this table.
pub const WELL_KNOWN_SYMBOLS: &[&str] = &[
    "asyncIterator",
    "hasInstance",
    "isConcatSpreadable",
    "iterator",
    "match",
    "matchAll",
    "replace",
    "search",
    "species",
    "split",
    "toPrimitive",
    "toStringTag",
    "unscopables",
];
