use std::fmt;

use crate::cbor::CborMap;
use crate::constants::field;
use crate::error::CodecError;

/// Result code carried by an SMP response.
///
/// Legacy responses report a single `"rc"` value. SMP v2 responses may
/// instead carry `"err": { "group": u16, "rc": u64 }`, which is surfaced as
/// [`ResponseCode::Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Ok,
    Unknown,
    NoMemory,
    InValue,
    Timeout,
    NoEntry,
    BadState,
    TooLarge,
    NotSupported,
    Corrupt,
    Busy,
    AccessDenied,
    UnsupportedTooOld,
    UnsupportedTooNew,
    /// A legacy code outside the known table.
    Other(u64),
    /// A group-scoped SMP v2 error.
    Group { group: u16, rc: u64 },
}

impl ResponseCode {
    /// Maps a legacy `"rc"` value.
    pub fn from_raw(rc: u64) -> Self {
        match rc {
            0 => Self::Ok,
            1 => Self::Unknown,
            2 => Self::NoMemory,
            3 => Self::InValue,
            4 => Self::Timeout,
            5 => Self::NoEntry,
            6 => Self::BadState,
            7 => Self::TooLarge,
            8 => Self::NotSupported,
            9 => Self::Corrupt,
            10 => Self::Busy,
            11 => Self::AccessDenied,
            12 => Self::UnsupportedTooOld,
            13 => Self::UnsupportedTooNew,
            other => Self::Other(other),
        }
    }

    /// Returns the numeric code as sent on the wire.
    pub fn raw(self) -> u64 {
        match self {
            Self::Ok => 0,
            Self::Unknown => 1,
            Self::NoMemory => 2,
            Self::InValue => 3,
            Self::Timeout => 4,
            Self::NoEntry => 5,
            Self::BadState => 6,
            Self::TooLarge => 7,
            Self::NotSupported => 8,
            Self::Corrupt => 9,
            Self::Busy => 10,
            Self::AccessDenied => 11,
            Self::UnsupportedTooOld => 12,
            Self::UnsupportedTooNew => 13,
            Self::Other(rc) | Self::Group { rc, .. } => rc,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Extracts the code from a decoded response body.
    ///
    /// A group error with a non-zero `rc` takes precedence over `"rc"`. A
    /// body with neither field is a success.
    pub fn from_body(body: &CborMap) -> Result<Self, CodecError> {
        if let Some(err) = body.map(field::ERR)? {
            let group = err.require_u64(field::GROUP)?;
            let rc = err.require_u64(field::RC)?;
            if rc != 0 {
                let group = u16::try_from(group).map_err(|_| CodecError::FieldType {
                    field: field::GROUP.to_string(),
                    expected: "u16",
                })?;
                return Ok(Self::Group { group, rc });
            }
        }
        Ok(body.u64(field::RC)?.map_or(Self::Ok, Self::from_raw))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Unknown => write!(f, "unknown error"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::InValue => write!(f, "invalid value"),
            Self::Timeout => write!(f, "device timeout"),
            Self::NoEntry => write!(f, "no such entry"),
            Self::BadState => write!(f, "bad state"),
            Self::TooLarge => write!(f, "too large"),
            Self::NotSupported => write!(f, "not supported"),
            Self::Corrupt => write!(f, "corrupt"),
            Self::Busy => write!(f, "busy"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::UnsupportedTooOld => write!(f, "protocol version too old"),
            Self::UnsupportedTooNew => write!(f, "protocol version too new"),
            Self::Other(rc) => write!(f, "rc {rc}"),
            Self::Group { group, rc } => write!(f, "group {group} error {rc}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::{CborValue, MapWriter};

    #[test]
    fn raw_roundtrip_for_known_codes() {
        for rc in 0..=13 {
            assert_eq!(ResponseCode::from_raw(rc).raw(), rc);
        }
        assert_eq!(ResponseCode::from_raw(99), ResponseCode::Other(99));
        assert_eq!(ResponseCode::from_raw(5), ResponseCode::NoEntry);
    }

    #[test]
    fn body_without_rc_is_ok() {
        let body = CborMap::decode(&MapWriter::new().finish()).unwrap();
        assert_eq!(ResponseCode::from_body(&body).unwrap(), ResponseCode::Ok);
    }

    #[test]
    fn legacy_rc() {
        let mut w = MapWriter::new();
        w.uint("rc", 6);
        let body = CborMap::decode(&w.finish()).unwrap();
        assert_eq!(
            ResponseCode::from_body(&body).unwrap(),
            ResponseCode::BadState
        );
    }

    #[test]
    fn group_error_wins() {
        let mut w = MapWriter::new();
        w.value(
            "err",
            &CborValue::Map(vec![
                ("group".into(), CborValue::Unsigned(8)),
                ("rc".into(), CborValue::Unsigned(3)),
            ]),
        );
        let body = CborMap::decode(&w.finish()).unwrap();
        let code = ResponseCode::from_body(&body).unwrap();
        assert_eq!(code, ResponseCode::Group { group: 8, rc: 3 });
        assert!(!code.is_ok());
        assert_eq!(code.to_string(), "group 8 error 3");
    }

    #[test]
    fn group_error_with_zero_rc_is_ok() {
        let mut w = MapWriter::new();
        w.value(
            "err",
            &CborValue::Map(vec![
                ("group".into(), CborValue::Unsigned(1)),
                ("rc".into(), CborValue::Unsigned(0)),
            ]),
        );
        let body = CborMap::decode(&w.finish()).unwrap();
        assert!(ResponseCode::from_body(&body).unwrap().is_ok());
    }
}
