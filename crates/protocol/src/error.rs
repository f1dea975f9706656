//! Codec error types.

/// Errors produced while encoding or decoding SMP frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame too short: need {expected} bytes, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("header length {header} does not match body length {body}")]
    LengthMismatch { header: usize, body: usize },

    #[error("body too large for header length field: {0} bytes")]
    BodyTooLarge(usize),

    #[error("invalid operation code: {0}")]
    InvalidOperation(u8),

    #[error("invalid CBOR: {0}")]
    Cbor(String),

    #[error("body is not a CBOR map")]
    NotAMap,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has unexpected type, expected {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}
