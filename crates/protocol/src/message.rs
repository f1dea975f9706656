//! SMP request/response messages and the frame codec for both schemes.

use crate::cbor::{self, CborMap, MAP_INDEFINITE};
use crate::constants::{COAP_HEADER_KEY, HEADER_LEN, Operation, SMP_VERSION, Scheme};
use crate::error::CodecError;
use crate::header::McuMgrHeader;
use crate::response::ResponseCode;

/// An outgoing request, before a sequence number is assigned.
///
/// `body` is an encoded CBOR map, normally produced by
/// [`MapWriter`](crate::MapWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McuMgrRequest {
    pub op: Operation,
    pub group: u16,
    pub command: u8,
    pub body: Vec<u8>,
}

impl McuMgrRequest {
    pub fn read(group: u16, command: u8, body: Vec<u8>) -> Self {
        Self {
            op: Operation::Read,
            group,
            command,
            body,
        }
    }

    pub fn write(group: u16, command: u8, body: Vec<u8>) -> Self {
        Self {
            op: Operation::Write,
            group,
            command,
            body,
        }
    }

    /// Builds the header for this request under sequence number `seq`.
    pub fn header(&self, seq: u8) -> Result<McuMgrHeader, CodecError> {
        let len =
            u16::try_from(self.body.len()).map_err(|_| CodecError::BodyTooLarge(self.body.len()))?;
        Ok(McuMgrHeader {
            version: SMP_VERSION,
            op: self.op,
            flags: 0,
            len,
            group: self.group,
            seq,
            command: self.command,
        })
    }

    /// Encodes the full frame as it goes on the wire.
    pub fn encode(&self, scheme: Scheme, seq: u8) -> Result<Vec<u8>, CodecError> {
        let header = self.header(seq)?;
        encode_frame(scheme, &header, &self.body)
    }

    /// Size of the encoded frame, without encoding it.
    pub fn encoded_len(&self, scheme: Scheme) -> usize {
        scheme.header_overhead() + self.body.len()
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct McuMgrResponse {
    pub header: McuMgrHeader,
    pub body: CborMap,
}

impl McuMgrResponse {
    pub fn decode(scheme: Scheme, bytes: &[u8]) -> Result<Self, CodecError> {
        let (header, body) = decode_frame(scheme, bytes)?;
        Ok(Self { header, body })
    }

    /// The response code carried by the body.
    pub fn code(&self) -> Result<ResponseCode, CodecError> {
        ResponseCode::from_body(&self.body)
    }
}

/// Frames `body` (an encoded CBOR map) under `header`.
///
/// The standard scheme prepends the binary header. The CoAP-wrapped scheme
/// splices an `"_h"` byte-string entry at the front of the map; `body` must
/// then be an indefinite-length map or empty.
pub fn encode_frame(
    scheme: Scheme,
    header: &McuMgrHeader,
    body: &[u8],
) -> Result<Vec<u8>, CodecError> {
    match scheme {
        Scheme::Standard => {
            let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
            frame.extend_from_slice(&header.encode());
            frame.extend_from_slice(body);
            Ok(frame)
        }
        Scheme::CoapWrapped => {
            let entries = match body.split_first() {
                None => &[cbor::BREAK][..],
                Some((&MAP_INDEFINITE, rest)) => rest,
                Some(_) => {
                    return Err(CodecError::Cbor(
                        "CoAP body must be an indefinite-length map".into(),
                    ));
                }
            };
            let mut wrapper = cbor::MapWriter::with_capacity(scheme.header_overhead());
            wrapper.bytes(COAP_HEADER_KEY, &header.encode());
            let mut frame = wrapper.finish();
            // Reopen the map: drop the writer's break and append the body's entries.
            frame.pop();
            frame.extend_from_slice(entries);
            Ok(frame)
        }
    }
}

/// Splits a frame into its header and decoded CBOR body.
pub fn decode_frame(scheme: Scheme, bytes: &[u8]) -> Result<(McuMgrHeader, CborMap), CodecError> {
    match scheme {
        Scheme::Standard => {
            let header = McuMgrHeader::decode(bytes)?;
            let body = &bytes[HEADER_LEN..];
            if body.len() != header.len as usize {
                return Err(CodecError::LengthMismatch {
                    header: header.len as usize,
                    body: body.len(),
                });
            }
            Ok((header, CborMap::decode(body)?))
        }
        Scheme::CoapWrapped => {
            let mut body = CborMap::decode(bytes)?;
            let raw = match body.remove(COAP_HEADER_KEY) {
                Some(ciborium::Value::Bytes(raw)) => raw,
                Some(_) => {
                    return Err(CodecError::FieldType {
                        field: COAP_HEADER_KEY.to_string(),
                        expected: "byte string",
                    });
                }
                None => return Err(CodecError::MissingField(COAP_HEADER_KEY)),
            };
            Ok((McuMgrHeader::decode(&raw)?, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::MapWriter;
    use crate::constants::group;

    fn upload_body() -> Vec<u8> {
        let mut w = MapWriter::new();
        w.uint("off", 0).uint("len", 10).bytes("data", &[7; 10]);
        w.finish()
    }

    #[test]
    fn standard_frame_layout() {
        let req = McuMgrRequest::write(group::FS, 0, upload_body());
        let frame = req.encode(Scheme::Standard, 3).unwrap();

        assert_eq!(frame.len(), req.encoded_len(Scheme::Standard));
        let header = McuMgrHeader::decode(&frame).unwrap();
        assert_eq!(header.op, Operation::Write);
        assert_eq!(header.group, group::FS);
        assert_eq!(header.seq, 3);
        assert_eq!(header.len as usize, req.body.len());
        assert_eq!(&frame[HEADER_LEN..], &req.body[..]);
    }

    #[test]
    fn standard_decode() {
        let req = McuMgrRequest::write(group::IMAGE, 1, upload_body());
        let frame = req.encode(Scheme::Standard, 9).unwrap();
        let (header, body) = decode_frame(Scheme::Standard, &frame).unwrap();
        assert_eq!(header.seq, 9);
        assert_eq!(body.u64("len").unwrap(), Some(10));
    }

    #[test]
    fn standard_length_mismatch() {
        let req = McuMgrRequest::write(group::IMAGE, 1, upload_body());
        let mut frame = req.encode(Scheme::Standard, 0).unwrap();
        frame.pop();
        assert!(matches!(
            decode_frame(Scheme::Standard, &frame),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn coap_frame_nests_header() {
        let req = McuMgrRequest::write(group::IMAGE, 1, upload_body());
        let frame = req.encode(Scheme::CoapWrapped, 4).unwrap();

        assert_eq!(frame.len(), req.encoded_len(Scheme::CoapWrapped));
        assert_eq!(frame[0], 0xBF);
        assert_eq!(&frame[1..4], &[0x62, b'_', b'h']);

        let (header, body) = decode_frame(Scheme::CoapWrapped, &frame).unwrap();
        assert_eq!(header.seq, 4);
        assert_eq!(header.group, group::IMAGE);
        assert!(!body.contains(COAP_HEADER_KEY));
        assert_eq!(body.u64("off").unwrap(), Some(0));
        assert_eq!(body.bytes("data").unwrap().map(<[u8]>::len), Some(10));
    }

    #[test]
    fn coap_empty_body() {
        let req = McuMgrRequest::read(group::IMAGE, 0, Vec::new());
        let frame = req.encode(Scheme::CoapWrapped, 0).unwrap();
        let (_, body) = decode_frame(Scheme::CoapWrapped, &frame).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn coap_missing_header() {
        let body = upload_body();
        assert_eq!(
            decode_frame(Scheme::CoapWrapped, &body),
            Err(CodecError::MissingField("_h"))
        );
    }

    #[test]
    fn oversized_body_rejected() {
        let req = McuMgrRequest::write(group::FS, 0, vec![0; 70_000]);
        assert_eq!(req.header(0), Err(CodecError::BodyTooLarge(70_000)));
    }

    #[test]
    fn response_code_from_frame() {
        let mut w = MapWriter::new();
        w.uint("rc", 5);
        let req_header = McuMgrRequest::read(group::FS, 0, Vec::new())
            .header(1)
            .unwrap();
        let body = w.finish();
        let frame =
            encode_frame(Scheme::Standard, &req_header.response(body.len() as u16), &body).unwrap();
        let resp = McuMgrResponse::decode(Scheme::Standard, &frame).unwrap();
        assert_eq!(resp.header.op, Operation::ReadResponse);
        assert_eq!(resp.code().unwrap(), ResponseCode::NoEntry);
    }
}
