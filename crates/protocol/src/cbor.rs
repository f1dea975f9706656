//! The slice of CBOR that SMP transfer commands need.
//!
//! Requests are written with [`MapWriter`] as indefinite-length maps
//! (`0xBF ... 0xFF`) whose keys and values use the shortest definite-length
//! encoding. The sizing helpers ([`uint_len`], [`text_len`], [`bytes_len`])
//! describe exactly what the writer emits, so chunk sizes computed from them
//! are byte-exact.
//!
//! Encoding goes through `ciborium-ll`; responses are decoded through
//! `ciborium` into a [`CborMap`].

use std::io;

use ciborium::Value;
use ciborium_ll::{Encoder, Header, simple};

use crate::error::CodecError;

/// Opens an indefinite-length map.
pub const MAP_INDEFINITE: u8 = 0xBF;
/// Closes an indefinite-length container.
pub const BREAK: u8 = 0xFF;

/// Bytes spent on the open and close tokens of an indefinite map.
pub const MAP_OVERHEAD: usize = 2;

/// Encoded length of an unsigned integer (or of a length prefix).
pub fn uint_len(value: u64) -> usize {
    if value < 24 {
        1
    } else if value < 0x100 {
        2
    } else if value < 0x1_0000 {
        3
    } else if value < 0x1_0000_0000 {
        5
    } else {
        9
    }
}

/// Encoded length of a text string.
pub fn text_len(value: &str) -> usize {
    uint_len(value.len() as u64) + value.len()
}

/// Encoded length of a byte string holding `len` bytes.
pub fn bytes_len(len: usize) -> usize {
    uint_len(len as u64) + len
}

/// A value that can be written into a request map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CborValue {
    Unsigned(u64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Map(Vec<(String, CborValue)>),
}

impl CborValue {
    /// Number of bytes [`MapWriter`] spends on this value.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Unsigned(v) => uint_len(*v),
            Self::Bool(_) => 1,
            Self::Text(s) => text_len(s),
            Self::Bytes(b) => bytes_len(b.len()),
            Self::Map(entries) => MAP_OVERHEAD + fields_len(entries),
        }
    }
}

/// Encoded length of one `key: value` entry.
pub fn field_len(key: &str, value: &CborValue) -> usize {
    text_len(key) + value.encoded_len()
}

/// Encoded length of a list of entries, without the map tokens.
pub fn fields_len<K: AsRef<str>>(fields: &[(K, CborValue)]) -> usize {
    fields
        .iter()
        .map(|(key, value)| field_len(key.as_ref(), value))
        .sum()
}

type Enc<'a> = Encoder<&'a mut Vec<u8>>;

fn write_value(enc: &mut Enc<'_>, value: &CborValue) -> io::Result<()> {
    match value {
        CborValue::Unsigned(v) => enc.push(Header::Positive(*v)),
        CborValue::Bool(b) => enc.push(Header::Simple(if *b { simple::TRUE } else { simple::FALSE })),
        CborValue::Text(s) => enc.text(s, None),
        CborValue::Bytes(b) => enc.bytes(b, None),
        CborValue::Map(entries) => {
            enc.push(Header::Map(None))?;
            for (key, value) in entries {
                enc.text(key, None)?;
                write_value(enc, value)?;
            }
            enc.push(Header::Break)
        }
    }
}

/// Writes an indefinite-length CBOR map.
#[derive(Debug)]
pub struct MapWriter {
    buf: Vec<u8>,
}

impl Default for MapWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MapWriter {
    /// Starts an empty map.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Starts an empty map with room for `capacity` bytes of entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity + MAP_OVERHEAD);
        buf.push(MAP_INDEFINITE);
        Self { buf }
    }

    fn entry<F>(&mut self, key: &str, value: F) -> &mut Self
    where
        F: FnOnce(&mut Enc<'_>) -> io::Result<()>,
    {
        let mut enc = Encoder::from(&mut self.buf);
        // Appending to a Vec never fails.
        let _ = enc.text(key, None).and_then(|()| value(&mut enc));
        self
    }

    pub fn uint(&mut self, key: &str, value: u64) -> &mut Self {
        self.entry(key, |enc| enc.push(Header::Positive(value)))
    }

    pub fn bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.entry(key, |enc| write_value(enc, &CborValue::Bool(value)))
    }

    pub fn text(&mut self, key: &str, value: &str) -> &mut Self {
        self.entry(key, |enc| enc.text(value, None))
    }

    pub fn bytes(&mut self, key: &str, value: &[u8]) -> &mut Self {
        self.entry(key, |enc| enc.bytes(value, None))
    }

    pub fn value(&mut self, key: &str, value: &CborValue) -> &mut Self {
        self.entry(key, |enc| write_value(enc, value))
    }

    /// Appends every entry of `fields`.
    pub fn fields<K: AsRef<str>>(&mut self, fields: &[(K, CborValue)]) -> &mut Self {
        for (key, value) in fields {
            self.value(key.as_ref(), value);
        }
        self
    }

    /// Closes the map and returns the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(BREAK);
        self.buf
    }
}

/// A decoded CBOR map with typed accessors for text keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CborMap {
    entries: Vec<(Value, Value)>,
}

impl CborMap {
    /// Decodes a map. An empty body decodes to an empty map.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            ciborium::de::from_reader(bytes).map_err(|e| CodecError::Cbor(format!("{e:?}")))?;
        Self::from_value(value)
    }

    /// Wraps an already decoded value.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Map(entries) => Ok(Self { entries }),
            _ => Err(CodecError::NotAMap),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
            .map(|(_, v)| v)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| matches!(k, Value::Text(t) if t == key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map(Some)
                .map_err(|_| type_error(key, "unsigned integer")),
            Some(_) => Err(type_error(key, "unsigned integer")),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(type_error(key, "bool")),
        }
    }

    pub fn text(&self, key: &str) -> Result<Option<&str>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Text(t)) => Ok(Some(t.as_str())),
            Some(_) => Err(type_error(key, "text string")),
        }
    }

    pub fn bytes(&self, key: &str) -> Result<Option<&[u8]>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bytes(b)) => Ok(Some(b.as_slice())),
            Some(_) => Err(type_error(key, "byte string")),
        }
    }

    pub fn map(&self, key: &str) -> Result<Option<CborMap>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Map(entries)) => Ok(Some(Self {
                entries: entries.clone(),
            })),
            Some(_) => Err(type_error(key, "map")),
        }
    }

    /// Like [`u64`](Self::u64) but fails when the field is absent.
    pub fn require_u64(&self, key: &'static str) -> Result<u64, CodecError> {
        self.u64(key)?.ok_or(CodecError::MissingField(key))
    }

    /// Like [`bytes`](Self::bytes) but fails when the field is absent.
    pub fn require_bytes(&self, key: &'static str) -> Result<&[u8], CodecError> {
        self.bytes(key)?.ok_or(CodecError::MissingField(key))
    }

    /// Like [`text`](Self::text) but fails when the field is absent.
    pub fn require_text(&self, key: &'static str) -> Result<&str, CodecError> {
        self.text(key)?.ok_or(CodecError::MissingField(key))
    }
}

fn type_error(key: &str, expected: &'static str) -> CodecError {
    CodecError::FieldType {
        field: key.to_string(),
        expected,
    }
}
