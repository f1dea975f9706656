//! SMP (mcumgr) wire types.
//!
//! Every SMP message is an 8-byte [`McuMgrHeader`] routed by
//! `(group, command, operation)` plus a CBOR map body. This crate holds the
//! header codec, the response-code table, the slice of CBOR needed by the
//! transfer commands and the frame codec for the standard and CoAP-wrapped
//! schemes.

pub mod cbor;
pub mod constants;
pub mod error;
pub mod header;
pub mod message;
pub mod response;

pub use cbor::{CborMap, CborValue, MapWriter};
pub use constants::{Operation, Scheme};
pub use error::CodecError;
pub use header::McuMgrHeader;
pub use message::{McuMgrRequest, McuMgrResponse, decode_frame, encode_frame};
pub use response::ResponseCode;
