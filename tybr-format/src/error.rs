//! Error types for the TYBR wire format

use thiserror::Error;

/// TYBR error types
#[derive(Debug, Error)]
pub enum TybrError {
    /// A read requested more bytes than remain in the input
    #[error("buffer underflow: needed {needed} bytes, {remaining} remain")]
    BufferUnderflow {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },
    /// The header does not start with the TYBR magic
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The header version byte is not the supported version
    #[error("unsupported format version: {0:#04x}")]
    UnsupportedFormat(u8),
    /// A tag byte falls outside the wire taxonomy
    #[error("unknown wire tag: {0:#04x}")]
    UnknownTag(u8),
    /// A reference id does not resolve in the corresponding table
    #[error("invalid reference id {id} (table size {size})")]
    InvalidReference {
        /// The id carried on the wire
        id: u32,
        /// Size of the table at the moment of lookup
        size: usize,
    },
    /// An encoder-side input is outside the representable domain
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    /// A payload is structurally malformed
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TybrError>;
